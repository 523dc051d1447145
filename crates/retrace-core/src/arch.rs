//! Architecture and platform services.
//!
//! The register model and the platform calling conventions are supplied by
//! the environment; the analyses only query them. [`X86`] and
//! [`Win32Platform`] are the bundled implementations.

use std::fmt;

use crate::register::{x86, RegisterDef, RegisterSet, X86_REGISTERS};

/// Register model of a processor architecture.
pub trait Architecture: fmt::Debug + Send + Sync {
    /// Returns the name of this architecture.
    fn name(&self) -> &'static str;

    /// Number of register indices in this architecture's universe.
    fn register_count(&self) -> usize;

    /// Looks up a register by index. Unknown indices yield `None`.
    fn register(&self, index: usize) -> Option<&RegisterDef>;

    /// Returns true if `a` is a strict sub-register of `b`.
    fn is_sub_register_of(&self, a: &RegisterDef, b: &RegisterDef) -> bool {
        a.is_sub_register_of(b)
    }

    /// The register that holds the condition flags, if any.
    fn flags_register(&self) -> Option<&RegisterDef>;

    /// Renders a flag-group mask, e.g. `SZ` for sign and zero.
    fn flag_group_name(&self, mask: u32) -> String;

    /// Size in bytes of the return address pushed by a call.
    fn return_address_size(&self) -> i32;

    /// Size of a pointer in bits.
    fn pointer_bit_size(&self) -> u32;

    /// Looks up a register by name.
    fn register_by_name(&self, name: &str) -> Option<&RegisterDef> {
        (0..self.register_count())
            .filter_map(|i| self.register(i))
            .find(|r| r.name == name)
    }

    /// Returns an empty register set sized for this architecture.
    fn empty_register_set(&self) -> RegisterSet {
        RegisterSet::new(self.register_count())
    }
}

/// Platform (operating environment) conventions.
pub trait Platform: fmt::Debug + Send + Sync {
    /// Returns the name of this platform.
    fn name(&self) -> &'static str;

    /// Registers that are implicitly passed to every procedure (stack
    /// pointer, segment registers) and therefore never become synthesized
    /// parameters or return values.
    fn implicit_argument_registers(&self) -> RegisterSet;
}

/// 32-bit x86.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86;

const X86_FLAG_NAMES: [(u32, char); 6] = [
    (x86::FLAG_S, 'S'),
    (x86::FLAG_C, 'C'),
    (x86::FLAG_Z, 'Z'),
    (x86::FLAG_D, 'D'),
    (x86::FLAG_O, 'O'),
    (x86::FLAG_P, 'P'),
];

impl Architecture for X86 {
    fn name(&self) -> &'static str {
        "x86"
    }

    fn register_count(&self) -> usize {
        x86::COUNT
    }

    fn register(&self, index: usize) -> Option<&RegisterDef> {
        X86_REGISTERS.get(index)
    }

    fn flags_register(&self) -> Option<&RegisterDef> {
        X86_REGISTERS.get(x86::EFLAGS)
    }

    fn flag_group_name(&self, mask: u32) -> String {
        X86_FLAG_NAMES
            .iter()
            .filter(|(bit, _)| mask & bit != 0)
            .map(|&(_, c)| c)
            .collect()
    }

    fn return_address_size(&self) -> i32 {
        4
    }

    fn pointer_bit_size(&self) -> u32 {
        32
    }
}

/// 32-bit Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Platform;

impl Platform for Win32Platform {
    fn name(&self) -> &'static str {
        "win32"
    }

    fn implicit_argument_registers(&self) -> RegisterSet {
        [x86::ESP, x86::SP, x86::CS, x86::SS].into_iter().collect()
    }
}
