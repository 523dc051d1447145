//! Programs: procedures plus the architecture and platform they run on.

use std::sync::Arc;

use crate::arch::{Architecture, Platform};
use crate::error::{Error, Result};
use crate::procedure::{Procedure, ProcedureId};

/// A program being decompiled.
#[derive(Debug, Clone)]
pub struct Program {
    pub architecture: Arc<dyn Architecture>,
    pub platform: Arc<dyn Platform>,
    procedures: Vec<Procedure>,
}

impl Program {
    pub fn new(architecture: Arc<dyn Architecture>, platform: Arc<dyn Platform>) -> Self {
        Self {
            architecture,
            platform,
            procedures: Vec::new(),
        }
    }

    /// Adds a procedure with entry and exit blocks and returns its id.
    pub fn add_procedure(&mut self, name: impl Into<String>) -> ProcedureId {
        let id = ProcedureId(self.procedures.len() as u32);
        let ras = self.architecture.return_address_size();
        self.procedures.push(Procedure::with_entry_exit(id, name, ras));
        id
    }

    /// Adds a prebuilt procedure, renumbering it to its position.
    pub fn push_procedure(&mut self, mut procedure: Procedure) -> ProcedureId {
        let id = ProcedureId(self.procedures.len() as u32);
        procedure.id = id;
        self.procedures.push(procedure);
        id
    }

    pub fn procedure(&self, id: ProcedureId) -> Option<&Procedure> {
        self.procedures.get(id.0 as usize)
    }

    pub fn procedure_mut(&mut self, id: ProcedureId) -> Option<&mut Procedure> {
        self.procedures.get_mut(id.0 as usize)
    }

    /// Returns a procedure, or an error for an unknown id.
    pub fn get(&self, id: ProcedureId) -> Result<&Procedure> {
        self.procedure(id).ok_or(Error::UnknownProcedure(id))
    }

    /// Returns a procedure mutably, or an error for an unknown id.
    pub fn get_mut(&mut self, id: ProcedureId) -> Result<&mut Procedure> {
        self.procedures.get_mut(id.0 as usize).ok_or(Error::UnknownProcedure(id))
    }

    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    pub fn procedures_mut(&mut self) -> &mut [Procedure] {
        &mut self.procedures
    }

    pub fn num_procedures(&self) -> usize {
        self.procedures.len()
    }

    /// Finds a procedure by name.
    pub fn procedure_by_name(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }
}
