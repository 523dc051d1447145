//! Where a value lives.

use std::fmt;

use crate::frame::Identifier;
use crate::register::RegisterDef;

/// The location backing an identifier.
///
/// This is a closed set; code that needs to treat storages differently
/// matches on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Storage {
    /// A processor register.
    Register { index: usize, bit_size: u32 },
    /// A stack slot at or above the return address (an incoming argument).
    /// `offset` is relative to the stack pointer on procedure entry.
    StackArgument { offset: i32, bit_size: u32 },
    /// A stack slot below the entry stack pointer (a local).
    StackLocal { offset: i32, bit_size: u32 },
    /// A slot of the floating point register stack.
    FpuStackArgument { depth: i32 },
    /// A subset of the condition flags.
    FlagGroup { flags_register: usize, mask: u32 },
    /// An out-parameter that passes back the value of `original`.
    OutArgument { original: Box<Identifier> },
}

/// Discriminant of [`Storage`], for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Register,
    StackArgument,
    StackLocal,
    FpuStackArgument,
    FlagGroup,
    OutArgument,
}

impl Storage {
    /// Storage for a register definition.
    pub fn register(reg: &RegisterDef) -> Self {
        Storage::Register {
            index: reg.index,
            bit_size: reg.bit_size,
        }
    }

    /// Returns the discriminant.
    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Register { .. } => StorageKind::Register,
            Storage::StackArgument { .. } => StorageKind::StackArgument,
            Storage::StackLocal { .. } => StorageKind::StackLocal,
            Storage::FpuStackArgument { .. } => StorageKind::FpuStackArgument,
            Storage::FlagGroup { .. } => StorageKind::FlagGroup,
            Storage::OutArgument { .. } => StorageKind::OutArgument,
        }
    }

    /// Returns the register index for register storage.
    pub fn register_index(&self) -> Option<usize> {
        match self {
            Storage::Register { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Returns true for out-parameters whose original lives in a register.
    pub fn is_register_out_argument(&self) -> bool {
        match self {
            Storage::OutArgument { original } => {
                matches!(original.storage, Storage::Register { .. })
            }
            _ => false,
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Register { index, bit_size } => write!(f, "Register({index}:{bit_size})"),
            Storage::StackArgument { offset, bit_size } => {
                write!(f, "Stack(+{offset:#x}:{bit_size})")
            }
            Storage::StackLocal { offset, bit_size } => {
                write!(f, "Stack(-{:#x}:{bit_size})", offset.unsigned_abs())
            }
            Storage::FpuStackArgument { depth } => write!(f, "FpuStack({depth})"),
            Storage::FlagGroup { mask, .. } => write!(f, "Flags({mask:#x})"),
            Storage::OutArgument { original } => write!(f, "Out({})", original.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{x86, X86_REGISTERS};
    use crate::types::DataType;

    #[test]
    fn test_register_storage() {
        let s = Storage::register(&X86_REGISTERS[x86::EDX]);
        assert_eq!(s.kind(), StorageKind::Register);
        assert_eq!(s.register_index(), Some(x86::EDX));
        assert_eq!(
            s,
            Storage::Register {
                index: x86::EDX,
                bit_size: 32
            }
        );
    }

    #[test]
    fn test_register_out_argument() {
        let orig = Identifier::new("edx", DataType::word(32), Storage::register(&X86_REGISTERS[x86::EDX]));
        let out = Storage::OutArgument {
            original: Box::new(orig),
        };
        assert!(out.is_register_out_argument());
        assert_eq!(out.register_index(), None);

        let fpu = Identifier::new("rArg0", DataType::real(64), Storage::FpuStackArgument { depth: 0 });
        let fpu_out = Storage::OutArgument {
            original: Box::new(fpu),
        };
        assert!(!fpu_out.is_register_out_argument());
    }
}
