//! Register definitions and register-set algebra.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Sub, SubAssign};

/// Register class (general purpose, floating point, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterClass {
    /// General purpose register (eax, ax, al, ...)
    General,
    /// Stack pointer (esp, sp)
    StackPointer,
    /// Frame pointer (ebp, bp)
    FramePointer,
    /// Segment register (cs, ds, etc.) - x86 specific
    Segment,
    /// Flags / status register (eflags)
    Flags,
    /// Other special registers
    Other,
}

/// A register as published by an architecture.
///
/// Registers that alias the same physical storage (`eax`, `ax`, `al`, `ah`)
/// share a `domain`. Their bit ranges inside that domain decide
/// sub-register containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegisterDef {
    /// Architecture-specific register index.
    pub index: usize,
    /// Canonical lowercase name.
    pub name: &'static str,
    /// The class of register.
    pub class: RegisterClass,
    /// Physical register this definition aliases.
    pub domain: usize,
    /// Offset of the lowest bit inside the domain.
    pub bit_offset: u32,
    /// Size of the register in bits.
    pub bit_size: u32,
}

impl RegisterDef {
    /// Creates a new register definition.
    pub const fn new(
        index: usize,
        name: &'static str,
        class: RegisterClass,
        domain: usize,
        bit_offset: u32,
        bit_size: u32,
    ) -> Self {
        Self {
            index,
            name,
            class,
            domain,
            bit_offset,
            bit_size,
        }
    }

    /// Returns true if `self` is a strict sub-register of `other`.
    ///
    /// `al` is a sub-register of `ax` and `eax`; `eax` is not a
    /// sub-register of itself.
    pub fn is_sub_register_of(&self, other: &RegisterDef) -> bool {
        self.index != other.index
            && self.domain == other.domain
            && self.bit_size < other.bit_size
            && self.bit_offset >= other.bit_offset
            && self.bit_offset + self.bit_size <= other.bit_offset + other.bit_size
    }

    /// Returns the size of the register in bytes.
    pub fn byte_size(&self) -> u32 {
        self.bit_size.div_ceil(8)
    }
}

impl fmt::Display for RegisterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

const WORD_BITS: usize = 64;

/// Register indices at or above this bound are never stored in a
/// [`RegisterSet`].
pub const MAX_REGISTER_INDEX: usize = 4096;

/// A set of register indices drawn from a fixed universe.
///
/// Iteration is always in ascending index order; parameter ordering during
/// signature synthesis relies on it. Sets of different universe sizes can be
/// combined; the result covers the larger universe. Indices of
/// [`MAX_REGISTER_INDEX`] and above are dropped on insertion.
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterSet {
    words: Vec<u64>,
}

impl RegisterSet {
    /// Creates an empty set able to hold indices `0..universe` without
    /// reallocating.
    pub fn new(universe: usize) -> Self {
        Self {
            words: vec![0; universe.div_ceil(WORD_BITS)],
        }
    }

    /// Creates an empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of indices the set can hold without growing.
    pub fn universe(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Adds a register index. Returns true if it was not already present.
    /// An index of [`MAX_REGISTER_INDEX`] or above is ignored and returns
    /// false.
    pub fn insert(&mut self, index: usize) -> bool {
        if index >= MAX_REGISTER_INDEX {
            return false;
        }
        let (word, bit) = (index / WORD_BITS, index % WORD_BITS);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & (1 << bit) != 0;
        self.words[word] |= 1 << bit;
        !was_set
    }

    /// Removes a register index. Returns true if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        let (word, bit) = (index / WORD_BITS, index % WORD_BITS);
        match self.words.get_mut(word) {
            Some(w) if *w & (1 << bit) != 0 => {
                *w &= !(1 << bit);
                true
            }
            _ => false,
        }
    }

    /// Returns true if the index is a member.
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|w| w & (1 << (index % WORD_BITS)) != 0)
    }

    /// Returns true if no index is a member.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Iterates members in ascending index order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Returns `self ∪ other`.
    pub fn union(&self, other: &RegisterSet) -> RegisterSet {
        self.zip_with(other, |a, b| a | b)
    }

    /// Returns `self ∩ other`.
    pub fn intersection(&self, other: &RegisterSet) -> RegisterSet {
        self.zip_with(other, |a, b| a & b)
    }

    /// Returns `self − other`.
    pub fn difference(&self, other: &RegisterSet) -> RegisterSet {
        self.zip_with(other, |a, b| a & !b)
    }

    /// Returns true if every member of `self` is in `other`.
    pub fn is_subset(&self, other: &RegisterSet) -> bool {
        self.difference(other).is_empty()
    }

    fn zip_with(&self, other: &RegisterSet, op: impl Fn(u64, u64) -> u64) -> RegisterSet {
        let len = self.words.len().max(other.words.len());
        let words = (0..len)
            .map(|i| {
                op(
                    self.words.get(i).copied().unwrap_or(0),
                    other.words.get(i).copied().unwrap_or(0),
                )
            })
            .collect();
        RegisterSet { words }
    }
}

impl PartialEq for RegisterSet {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for RegisterSet {}

impl fmt::Debug for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for RegisterSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = RegisterSet::empty();
        set.extend(iter);
        set
    }
}

impl Extend<usize> for RegisterSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.insert(index);
        }
    }
}

impl<'a> IntoIterator for &'a RegisterSet {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl BitOr for &RegisterSet {
    type Output = RegisterSet;

    fn bitor(self, rhs: &RegisterSet) -> RegisterSet {
        self.union(rhs)
    }
}

impl BitAnd for &RegisterSet {
    type Output = RegisterSet;

    fn bitand(self, rhs: &RegisterSet) -> RegisterSet {
        self.intersection(rhs)
    }
}

impl Sub for &RegisterSet {
    type Output = RegisterSet;

    fn sub(self, rhs: &RegisterSet) -> RegisterSet {
        self.difference(rhs)
    }
}

impl BitOrAssign<&RegisterSet> for RegisterSet {
    fn bitor_assign(&mut self, rhs: &RegisterSet) {
        *self = self.union(rhs);
    }
}

impl BitAndAssign<&RegisterSet> for RegisterSet {
    fn bitand_assign(&mut self, rhs: &RegisterSet) {
        *self = self.intersection(rhs);
    }
}

impl SubAssign<&RegisterSet> for RegisterSet {
    fn sub_assign(&mut self, rhs: &RegisterSet) {
        *self = self.difference(rhs);
    }
}

/// Ascending iterator over the members of a [`RegisterSet`].
pub struct Iter<'a> {
    words: &'a [u64],
    word: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word * WORD_BITS + bit);
            }
            self.word += 1;
            self.current = *self.words.get(self.word)?;
        }
    }
}

// x86 (32-bit) register indices
pub mod x86 {
    // 32-bit GPRs
    pub const EAX: usize = 0;
    pub const ECX: usize = 1;
    pub const EDX: usize = 2;
    pub const EBX: usize = 3;
    pub const ESP: usize = 4;
    pub const EBP: usize = 5;
    pub const ESI: usize = 6;
    pub const EDI: usize = 7;

    // 16-bit GPRs
    pub const AX: usize = 8;
    pub const CX: usize = 9;
    pub const DX: usize = 10;
    pub const BX: usize = 11;
    pub const SP: usize = 12;
    pub const BP: usize = 13;
    pub const SI: usize = 14;
    pub const DI: usize = 15;

    // 8-bit low
    pub const AL: usize = 16;
    pub const CL: usize = 17;
    pub const DL: usize = 18;
    pub const BL: usize = 19;

    // 8-bit high
    pub const AH: usize = 20;
    pub const CH: usize = 21;
    pub const DH: usize = 22;
    pub const BH: usize = 23;

    // Segment registers
    pub const ES: usize = 24;
    pub const CS: usize = 25;
    pub const SS: usize = 26;
    pub const DS: usize = 27;
    pub const FS: usize = 28;
    pub const GS: usize = 29;

    // Flags
    pub const EFLAGS: usize = 30;

    /// Number of register indices in the x86 universe.
    pub const COUNT: usize = 31;

    // Flag bits inside EFLAGS, as used by flag-group masks.
    pub const FLAG_S: u32 = 1;
    pub const FLAG_C: u32 = 2;
    pub const FLAG_Z: u32 = 4;
    pub const FLAG_D: u32 = 8;
    pub const FLAG_O: u32 = 16;
    pub const FLAG_P: u32 = 32;
}

use RegisterClass::*;

/// The x86 register file, indexed by the constants in [`x86`].
pub static X86_REGISTERS: [RegisterDef; x86::COUNT] = [
    RegisterDef::new(x86::EAX, "eax", General, x86::EAX, 0, 32),
    RegisterDef::new(x86::ECX, "ecx", General, x86::ECX, 0, 32),
    RegisterDef::new(x86::EDX, "edx", General, x86::EDX, 0, 32),
    RegisterDef::new(x86::EBX, "ebx", General, x86::EBX, 0, 32),
    RegisterDef::new(x86::ESP, "esp", StackPointer, x86::ESP, 0, 32),
    RegisterDef::new(x86::EBP, "ebp", FramePointer, x86::EBP, 0, 32),
    RegisterDef::new(x86::ESI, "esi", General, x86::ESI, 0, 32),
    RegisterDef::new(x86::EDI, "edi", General, x86::EDI, 0, 32),
    RegisterDef::new(x86::AX, "ax", General, x86::EAX, 0, 16),
    RegisterDef::new(x86::CX, "cx", General, x86::ECX, 0, 16),
    RegisterDef::new(x86::DX, "dx", General, x86::EDX, 0, 16),
    RegisterDef::new(x86::BX, "bx", General, x86::EBX, 0, 16),
    RegisterDef::new(x86::SP, "sp", StackPointer, x86::ESP, 0, 16),
    RegisterDef::new(x86::BP, "bp", FramePointer, x86::EBP, 0, 16),
    RegisterDef::new(x86::SI, "si", General, x86::ESI, 0, 16),
    RegisterDef::new(x86::DI, "di", General, x86::EDI, 0, 16),
    RegisterDef::new(x86::AL, "al", General, x86::EAX, 0, 8),
    RegisterDef::new(x86::CL, "cl", General, x86::ECX, 0, 8),
    RegisterDef::new(x86::DL, "dl", General, x86::EDX, 0, 8),
    RegisterDef::new(x86::BL, "bl", General, x86::EBX, 0, 8),
    RegisterDef::new(x86::AH, "ah", General, x86::EAX, 8, 8),
    RegisterDef::new(x86::CH, "ch", General, x86::ECX, 8, 8),
    RegisterDef::new(x86::DH, "dh", General, x86::EDX, 8, 8),
    RegisterDef::new(x86::BH, "bh", General, x86::EBX, 8, 8),
    RegisterDef::new(x86::ES, "es", Segment, x86::ES, 0, 16),
    RegisterDef::new(x86::CS, "cs", Segment, x86::CS, 0, 16),
    RegisterDef::new(x86::SS, "ss", Segment, x86::SS, 0, 16),
    RegisterDef::new(x86::DS, "ds", Segment, x86::DS, 0, 16),
    RegisterDef::new(x86::FS, "fs", Segment, x86::FS, 0, 16),
    RegisterDef::new(x86::GS, "gs", Segment, x86::GS, 0, 16),
    RegisterDef::new(x86::EFLAGS, "eflags", Flags, x86::EFLAGS, 0, 32),
];
