//! Basic block representation.

use crate::statement::{Instruction, Statement};

/// Unique identifier for a basic block within a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlockId(pub u32);

impl BasicBlockId {
    /// Creates a new basic block ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: a named, straight-line sequence of statements.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    /// Unique identifier for this block.
    pub id: BasicBlockId,
    /// Label of the block, e.g. `loopheader` or `fn_entry`.
    pub name: String,
    /// Statements in this block.
    pub statements: Vec<Statement>,
}

impl BasicBlock {
    /// Creates a new empty basic block.
    pub fn new(id: BasicBlockId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            statements: Vec::new(),
        }
    }

    /// Appends a statement.
    pub fn push(&mut self, address: u64, instruction: Instruction) {
        self.statements.push(Statement::new(address, instruction));
    }

    /// Returns true if this block has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Returns the number of statements in this block.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns the last statement in this block, if any.
    pub fn last_statement(&self) -> Option<&Statement> {
        self.statements.last()
    }

    /// Address of the first statement, if any.
    pub fn address(&self) -> Option<u64> {
        self.statements.first().map(|s| s.address)
    }
}
