//! Procedure signatures.

use std::fmt;

use crate::frame::Identifier;
use crate::storage::Storage;

/// Default upper bound on the depth of FPU stack out-arguments.
pub const DEFAULT_FPU_STACK_OUT_ARGUMENT_MAX: i32 = -1;

/// The calling interface of a procedure.
///
/// Parameters and the return value carry copies of the callee's frame
/// identifiers so a signature can be read without the callee's frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature {
    pub return_value: Option<Identifier>,
    pub parameters: Vec<Identifier>,
    /// Net change of the FPU stack depth across a call.
    pub fpu_stack_delta: i32,
    /// Deepest FPU stack slot that can carry a result back.
    pub fpu_stack_out_argument_max: i32,
    parameters_valid: bool,
}

impl Signature {
    /// A signature that has not been determined yet.
    pub fn unknown() -> Self {
        Self {
            return_value: None,
            parameters: Vec::new(),
            fpu_stack_delta: 0,
            fpu_stack_out_argument_max: DEFAULT_FPU_STACK_OUT_ARGUMENT_MAX,
            parameters_valid: false,
        }
    }

    /// An undetermined signature carrying calling-convention metadata.
    pub fn with_fpu_stack(fpu_stack_delta: i32, fpu_stack_out_argument_max: i32) -> Self {
        Self {
            fpu_stack_delta,
            fpu_stack_out_argument_max,
            ..Self::unknown()
        }
    }

    /// A determined signature.
    pub fn new(return_value: Option<Identifier>, parameters: Vec<Identifier>) -> Self {
        Self {
            return_value,
            parameters,
            parameters_valid: true,
            ..Self::unknown()
        }
    }

    /// Returns true once the parameters and return value are determined.
    pub fn is_valid(&self) -> bool {
        self.parameters_valid
    }

    /// Returns true if the procedure returns a value.
    pub fn has_return_value(&self) -> bool {
        self.return_value.is_some()
    }

    /// Parameters that pass values back to the caller.
    pub fn out_arguments(&self) -> impl Iterator<Item = &Identifier> {
        self.parameters
            .iter()
            .filter(|p| matches!(p.storage, Storage::OutArgument { .. }))
    }

    /// Renders the signature as a C-like prototype, e.g.
    /// `word32 fn(word32 ecx, (word32 *) edxOut)`.
    pub fn format(&self, name: &str) -> String {
        let ret = match &self.return_value {
            Some(rv) => rv.data_type.to_string(),
            None => "void".to_string(),
        };
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.data_type, p.name))
            .collect();
        format!("{ret} {name}({})", params.join(", "))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("<unknown>");
        }
        f.write_str(&self.format("fn"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{x86, X86_REGISTERS};
    use crate::types::DataType;

    fn reg(index: usize) -> Identifier {
        let def = &X86_REGISTERS[index];
        Identifier::new(def.name, DataType::word(def.bit_size), Storage::register(def))
    }

    #[test]
    fn test_unknown_is_invalid() {
        let sig = Signature::unknown();
        assert!(!sig.is_valid());
        assert_eq!(sig.fpu_stack_out_argument_max, -1);
        assert_eq!(sig.to_string(), "<unknown>");
    }

    #[test]
    fn test_format() {
        let edx = reg(x86::EDX);
        let out = Identifier::new(
            "edxOut",
            DataType::pointer_to(DataType::word(32), 32),
            Storage::OutArgument {
                original: Box::new(edx),
            },
        );
        let sig = Signature::new(Some(reg(x86::EAX)), vec![reg(x86::ECX), out]);
        assert!(sig.is_valid());
        assert_eq!(sig.format("foo"), "word32 foo(word32 ecx, (word32 *) edxOut)");
        assert_eq!(sig.out_arguments().count(), 1);
    }

    #[test]
    fn test_void_format() {
        let sig = Signature::new(None, vec![]);
        assert_eq!(sig.format("bar"), "void bar()");
        assert!(!sig.has_return_value());
    }
}
