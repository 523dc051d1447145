//! Interprocedural dataflow summaries.
//!
//! A [`ProcedureFlow`] is produced by the dataflow analysis that runs before
//! call rewriting. The rewriter narrows it in place and records the
//! synthesized signature on it.

use std::fmt;

use indexmap::IndexMap;

use retrace_core::{Architecture, IdentifierId, ProcedureId, RegisterSet, Signature};

/// Summary of how one procedure uses registers, flags and the stack.
#[derive(Debug, Clone, Default)]
pub struct ProcedureFlow {
    /// Registers that may be read before being written.
    pub may_use: RegisterSet,
    /// Registers whose values may be observed by callers.
    pub live_out: RegisterSet,
    /// Registers the procedure may modify.
    pub trashed: RegisterSet,
    /// Flag bits whose values may be observed by callers.
    pub grf_live_out: u32,
    /// Flag bits the procedure may modify.
    pub grf_trashed: u32,
    /// Observed access width in bits of each stack argument identifier.
    pub stack_arguments: IndexMap<IdentifierId, u32>,
    /// Signature synthesized from this summary.
    pub signature: Option<Signature>,
}

impl ProcedureFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a displayable view naming registers and flag groups through
    /// `arch`.
    pub fn display<'a>(&'a self, arch: &'a dyn Architecture) -> ProcedureFlowDisplay<'a> {
        ProcedureFlowDisplay { flow: self, arch }
    }
}

/// Renders a [`ProcedureFlow`] one summary per line.
pub struct ProcedureFlowDisplay<'a> {
    flow: &'a ProcedureFlow,
    arch: &'a dyn Architecture,
}

impl ProcedureFlowDisplay<'_> {
    fn registers(
        &self,
        f: &mut fmt::Formatter<'_>,
        label: &str,
        set: &RegisterSet,
    ) -> fmt::Result {
        write!(f, "{label}")?;
        for r in set.iter() {
            match self.arch.register(r) {
                Some(def) => write!(f, " {}", def.name)?,
                None => write!(f, " r{r}")?,
            }
        }
        writeln!(f)
    }
}

impl fmt::Display for ProcedureFlowDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flow = self.flow;
        self.registers(f, "MayUse: ", &flow.may_use)?;
        self.registers(f, "LiveOut:", &flow.live_out)?;
        self.registers(f, "Trashed:", &flow.trashed)?;
        writeln!(f, "grfLiveOut: {}", self.arch.flag_group_name(flow.grf_live_out))?;
        writeln!(f, "grfTrashed: {}", self.arch.flag_group_name(flow.grf_trashed))?;
        if !flow.stack_arguments.is_empty() {
            write!(f, "StackArguments:")?;
            for (id, bits) in &flow.stack_arguments {
                write!(f, " {id}:{bits}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Dataflow summaries for every procedure of a program.
#[derive(Debug, Clone, Default)]
pub struct ProgramDataFlow {
    flows: IndexMap<ProcedureId, ProcedureFlow>,
}

impl ProgramDataFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ProcedureId, flow: ProcedureFlow) -> Option<ProcedureFlow> {
        self.flows.insert(id, flow)
    }

    pub fn get(&self, id: ProcedureId) -> Option<&ProcedureFlow> {
        self.flows.get(&id)
    }

    pub fn get_mut(&mut self, id: ProcedureId) -> Option<&mut ProcedureFlow> {
        self.flows.get_mut(&id)
    }

    pub fn contains(&self, id: ProcedureId) -> bool {
        self.flows.contains_key(&id)
    }

    /// Returns the summary for `id`, inserting an empty one if absent.
    pub fn ensure(&mut self, id: ProcedureId) -> &mut ProcedureFlow {
        self.flows.entry(id).or_default()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcedureId, &ProcedureFlow)> {
        self.flows.iter().map(|(id, f)| (*id, f))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ProcedureId, &mut ProcedureFlow)> {
        self.flows.iter_mut().map(|(id, f)| (*id, f))
    }
}
