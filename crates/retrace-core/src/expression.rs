//! Expressions of the intermediate representation.

use std::fmt;

use crate::frame::{Frame, IdentifierId};
use crate::procedure::ProcedureId;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Returns the operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Neg,
    Not,
}

/// The target of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Callee {
    /// A procedure of the program being decompiled.
    Procedure(ProcedureId),
    /// A named routine outside the program (import, runtime helper).
    External(String),
    /// A computed target.
    Indirect(Box<Expression>),
}

/// A call of a procedure with bound arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Application {
    pub callee: Callee,
    pub arguments: Vec<Expression>,
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expression {
    /// Reference to a frame identifier.
    Identifier(IdentifierId),
    /// An integer constant of the given width.
    Constant { value: i64, bit_size: u32 },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Application(Application),
    /// An identifier passed by reference so the callee can write it.
    OutArgument(IdentifierId),
}

impl Expression {
    pub fn id(id: IdentifierId) -> Self {
        Expression::Identifier(id)
    }

    pub fn constant(value: i64, bit_size: u32) -> Self {
        Expression::Constant { value, bit_size }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Returns the identifier this expression names directly, if any.
    pub fn as_identifier(&self) -> Option<IdentifierId> {
        match self {
            Expression::Identifier(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns a displayable view resolving identifier names through `frame`.
    pub fn display<'a>(&'a self, frame: &'a Frame) -> ExpressionDisplay<'a> {
        ExpressionDisplay { expr: self, frame }
    }
}

/// Renders an [`Expression`] with identifier names.
pub struct ExpressionDisplay<'a> {
    expr: &'a Expression,
    frame: &'a Frame,
}

impl ExpressionDisplay<'_> {
    fn write_id(&self, f: &mut fmt::Formatter<'_>, id: IdentifierId) -> fmt::Result {
        match self.frame.identifier(id) {
            Some(ident) => f.write_str(&ident.name),
            None => write!(f, "{id}"),
        }
    }
}

impl fmt::Display for ExpressionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expression::Identifier(id) => self.write_id(f, *id),
            Expression::Constant { value, .. } => {
                if *value < 0 {
                    write!(f, "-{:#x}", value.unsigned_abs())
                } else {
                    write!(f, "{value:#x}")
                }
            }
            Expression::Binary { op, left, right } => write!(
                f,
                "{} {} {}",
                left.display(self.frame),
                op.symbol(),
                right.display(self.frame)
            ),
            Expression::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "~",
                };
                write!(f, "{sym}{}", operand.display(self.frame))
            }
            Expression::Application(app) => {
                match &app.callee {
                    Callee::Procedure(p) => write!(f, "{p}")?,
                    Callee::External(name) => f.write_str(name)?,
                    Callee::Indirect(target) => write!(f, "({})", target.display(self.frame))?,
                }
                f.write_str("(")?;
                for (i, arg) in app.arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg.display(self.frame))?;
                }
                f.write_str(")")
            }
            Expression::OutArgument(id) => {
                f.write_str("out ")?;
                self.write_id(f, *id)
            }
        }
    }
}
