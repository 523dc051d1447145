//! # retrace-core
//!
//! Core abstractions for the retrace decompiler back end. This crate defines
//! the register model, storages and frames, the intermediate representation
//! (expressions, statements, basic blocks, control flow graphs), and
//! procedures with their signatures.

pub mod arch;
pub mod basic_block;
pub mod cfg;
pub mod error;
pub mod expression;
pub mod frame;
pub mod procedure;
pub mod program;
pub mod register;
pub mod signature;
pub mod statement;
pub mod storage;
pub mod types;

pub use arch::{Architecture, Platform, Win32Platform, X86};
pub use basic_block::{BasicBlock, BasicBlockId};
pub use cfg::{ControlFlowGraph, DominatorTree};
pub use error::{Error, Result};
pub use expression::{Application, BinaryOp, Callee, Expression, UnaryOp};
pub use frame::{Frame, Identifier, IdentifierId};
pub use procedure::{Procedure, ProcedureId};
pub use program::Program;
pub use register::{RegisterClass, RegisterDef, RegisterSet};
pub use signature::Signature;
pub use statement::{CallInstruction, CallSite, Instruction, ReturnInstruction, Statement, UseInstruction};
pub use storage::{Storage, StorageKind};
pub use types::{DataType, Domain, PrimitiveType};
