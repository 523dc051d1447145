//! Statements of the intermediate representation.

use std::fmt;

use crate::expression::{Application, Callee, Expression};
use crate::frame::{Frame, IdentifierId};

/// Stack and FPU stack depth at a call site.
///
/// `stack_depth` is the number of bytes the caller has pushed below its
/// own entry stack pointer when the call executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallSite {
    pub stack_depth: i32,
    pub fpu_depth: i32,
}

impl CallSite {
    pub fn new(stack_depth: i32, fpu_depth: i32) -> Self {
        Self {
            stack_depth,
            fpu_depth,
        }
    }
}

/// A call that has not been bound to a signature yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallInstruction {
    pub callee: Callee,
    pub site: CallSite,
}

/// A return, optionally carrying the returned value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReturnInstruction {
    pub expression: Option<Expression>,
}

/// A synthetic read of an identifier, keeping it live up to the exit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UseInstruction {
    pub expression: Expression,
    /// The out-parameter the value is passed back through.
    pub out: Option<IdentifierId>,
}

/// Instruction kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instruction {
    Assignment { dst: IdentifierId, src: Expression },
    /// An expression evaluated for its effects only.
    SideEffect(Expression),
    Branch { condition: Expression, target: String },
    /// Placeholder for a call site, rewritten once signatures are known.
    Call(CallInstruction),
    Return(ReturnInstruction),
    Use(UseInstruction),
}

impl Instruction {
    /// Returns the application of a bound call, if this is one.
    pub fn application(&self) -> Option<&Application> {
        match self {
            Instruction::Assignment {
                src: Expression::Application(app),
                ..
            }
            | Instruction::SideEffect(Expression::Application(app)) => Some(app),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Instruction::Call(_))
    }
}

/// An instruction at an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statement {
    pub address: u64,
    pub instruction: Instruction,
}

impl Statement {
    pub fn new(address: u64, instruction: Instruction) -> Self {
        Self {
            address,
            instruction,
        }
    }

    /// Returns a displayable view resolving identifier names through `frame`.
    pub fn display<'a>(&'a self, frame: &'a Frame) -> StatementDisplay<'a> {
        StatementDisplay { stm: self, frame }
    }
}

/// Renders a [`Statement`] with identifier names.
pub struct StatementDisplay<'a> {
    stm: &'a Statement,
    frame: &'a Frame,
}

impl fmt::Display for StatementDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.frame;
        let name = |id: IdentifierId| {
            frame
                .identifier(id)
                .map(|i| i.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        match &self.stm.instruction {
            Instruction::Assignment { dst, src } => {
                write!(f, "{} = {}", name(*dst), src.display(frame))
            }
            Instruction::SideEffect(e) => write!(f, "{}", e.display(frame)),
            Instruction::Branch { condition, target } => {
                write!(f, "branch {} {target}", condition.display(frame))
            }
            Instruction::Call(call) => match &call.callee {
                Callee::Procedure(p) => write!(f, "call {p}"),
                Callee::External(n) => write!(f, "call {n}"),
                Callee::Indirect(e) => write!(f, "call ({})", e.display(frame)),
            },
            Instruction::Return(ret) => match &ret.expression {
                Some(e) => write!(f, "return {}", e.display(frame)),
                None => f.write_str("return"),
            },
            Instruction::Use(u) => {
                write!(f, "use {}", u.expression.display(frame))?;
                if let Some(out) = u.out {
                    write!(f, " ({})", name(out))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::ProcedureId;
    use crate::register::{x86, X86_REGISTERS};

    #[test]
    fn test_application_accessor() {
        let mut frame = Frame::new(4);
        let eax = frame.ensure_register(&X86_REGISTERS[x86::EAX]);
        let app = Application {
            callee: Callee::Procedure(ProcedureId(1)),
            arguments: vec![],
        };
        let assign = Instruction::Assignment {
            dst: eax,
            src: Expression::Application(app.clone()),
        };
        assert_eq!(assign.application(), Some(&app));
        assert!(!assign.is_call());

        let call = Instruction::Call(CallInstruction {
            callee: Callee::Procedure(ProcedureId(1)),
            site: CallSite::default(),
        });
        assert!(call.is_call());
        assert!(call.application().is_none());
    }

    #[test]
    fn test_display() {
        let mut frame = Frame::new(4);
        let eax = frame.ensure_register(&X86_REGISTERS[x86::EAX]);
        let stm = Statement::new(
            0x1000,
            Instruction::Return(ReturnInstruction {
                expression: Some(Expression::id(eax)),
            }),
        );
        assert_eq!(stm.display(&frame).to_string(), "return eax");
    }
}
