//! Procedures.

use std::fmt;

use crate::basic_block::{BasicBlock, BasicBlockId};
use crate::cfg::ControlFlowGraph;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::signature::Signature;

/// Index of a procedure within its [`Program`](crate::Program).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcedureId(pub u32);

impl fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc{}", self.0)
    }
}

/// A procedure: frame, signature and control flow graph.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Procedure {
    pub id: ProcedureId,
    pub name: String,
    pub frame: Frame,
    signature: Signature,
    pub cfg: ControlFlowGraph,
}

impl Procedure {
    /// Creates a procedure whose graph holds only the synthetic entry and
    /// exit blocks, named `<name>_entry` and `<name>_exit`.
    pub fn with_entry_exit(id: ProcedureId, name: impl Into<String>, return_address_size: i32) -> Self {
        let name = name.into();
        let entry = BasicBlockId::new(0);
        let exit = BasicBlockId::new(1);
        let mut cfg = ControlFlowGraph::new(entry, exit);
        cfg.add_block(BasicBlock::new(entry, format!("{name}_entry")));
        cfg.add_block(BasicBlock::new(exit, format!("{name}_exit")));
        Self::new(id, name, Frame::new(return_address_size), cfg)
    }

    /// Creates a procedure from an existing graph.
    pub fn new(id: ProcedureId, name: impl Into<String>, frame: Frame, cfg: ControlFlowGraph) -> Self {
        Self {
            id,
            name: name.into(),
            frame,
            signature: Signature::unknown(),
            cfg,
        }
    }

    /// Returns the current signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Replaces an undetermined signature, e.g. to set FPU stack metadata
    /// before synthesis or to supply a known prototype.
    pub fn set_signature(&mut self, signature: Signature) -> Result<()> {
        if self.signature.is_valid() {
            return Err(Error::SignatureAlreadyValid(self.name.clone()));
        }
        self.signature = signature;
        Ok(())
    }

    /// Commits a synthesized signature. A valid signature is never replaced.
    pub fn commit_signature(&mut self, signature: Signature) -> Result<()> {
        self.set_signature(signature)
    }
}
