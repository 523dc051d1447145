//! Program-wide signature synthesis and call rewriting.
//!
//! Rewriting runs in two passes. The first synthesizes a signature for every
//! procedure from its dataflow summary; procedures are independent here and
//! may be processed in parallel. The resulting [`SignatureTable`] is the only
//! thing the second pass sees of other procedures: it binds every call site
//! to the callee's final signature and makes returns carry the return value.
//! No call is rewritten before every signature is fixed.

mod binder;

pub use binder::CallBinder;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, log_enabled, trace, Level};
use rayon::prelude::*;

use retrace_core::{
    Application, Architecture, CallSite, Callee, DataType, Expression, Frame, Identifier,
    IdentifierId, Instruction, Platform, PrimitiveType, Procedure, ProcedureId, Program,
    RegisterSet, Signature, Statement, Storage, StorageKind, UseInstruction,
};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::flow::{ProcedureFlow, ProgramDataFlow};
use crate::signature_builder::SignatureBuilder;

/// Signatures of all procedures, frozen after the first pass.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    signatures: IndexMap<ProcedureId, Signature>,
}

impl SignatureTable {
    /// Collects the valid signatures of a program.
    pub fn from_program(program: &Program) -> Self {
        let signatures = program
            .procedures()
            .iter()
            .filter(|p| p.signature().is_valid())
            .map(|p| (p.id, p.signature().clone()))
            .collect();
        Self { signatures }
    }

    pub fn get(&self, id: ProcedureId) -> Option<&Signature> {
        self.signatures.get(&id)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcedureId, &Signature)> {
        self.signatures.iter().map(|(id, s)| (*id, s))
    }
}

/// Statistics from rewriting one procedure's call sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Call sites bound to a signature.
    pub calls_rewritten: usize,
    /// Call sites left in place (unknown, external or indirect callee).
    pub calls_unresolved: usize,
    /// Return instructions updated.
    pub returns_rewritten: usize,
}

impl std::ops::AddAssign for RewriteStats {
    fn add_assign(&mut self, rhs: Self) {
        self.calls_rewritten += rhs.calls_rewritten;
        self.calls_unresolved += rhs.calls_unresolved;
        self.returns_rewritten += rhs.returns_rewritten;
    }
}

/// Synthesizes signatures from dataflow summaries and rewrites call sites.
#[derive(Debug, Clone)]
pub struct GlobalCallRewriter {
    arch: Arc<dyn Architecture>,
    platform: Arc<dyn Platform>,
    config: AnalysisConfig,
}

impl GlobalCallRewriter {
    pub fn new(program: &Program, config: AnalysisConfig) -> Self {
        Self {
            arch: Arc::clone(&program.architecture),
            platform: Arc::clone(&program.platform),
            config,
        }
    }

    /// Rewrites a program with the default configuration.
    pub fn rewrite(program: &mut Program, summaries: &mut ProgramDataFlow) -> Result<SignatureTable> {
        Self::rewrite_with_config(program, summaries, AnalysisConfig::default())
    }

    /// Runs both passes. Afterwards every procedure has a valid signature
    /// and every resolvable call site and return reflects it.
    pub fn rewrite_with_config(
        program: &mut Program,
        summaries: &mut ProgramDataFlow,
        config: AnalysisConfig,
    ) -> Result<SignatureTable> {
        let crw = Self::new(program, config);
        let table = crw.synthesize_signatures(program, summaries)?;
        let stats = crw.rewrite_call_sites(program, &table);
        debug!(
            "call rewriting: {} signatures, {} calls bound, {} unresolved, {} returns",
            table.len(),
            stats.calls_rewritten,
            stats.calls_unresolved,
            stats.returns_rewritten
        );
        Ok(table)
    }

    /// First pass: ensure every procedure has a signature.
    pub fn synthesize_signatures(
        &self,
        program: &mut Program,
        summaries: &mut ProgramDataFlow,
    ) -> Result<SignatureTable> {
        for proc in program.procedures() {
            if !summaries.contains(proc.id) {
                debug!("{}: no dataflow summary, using an empty one", proc.name);
                summaries.ensure(proc.id);
            }
        }

        let mut flows: HashMap<ProcedureId, &mut ProcedureFlow> = summaries.iter_mut().collect();
        let work: Vec<(&mut Procedure, &mut ProcedureFlow)> = program
            .procedures_mut()
            .iter_mut()
            .filter_map(|proc| {
                let flow = flows.remove(&proc.id)?;
                Some((proc, flow))
            })
            .collect();

        if self.config.is_parallel() {
            work.into_par_iter()
                .map(|(proc, flow)| self.process_procedure(proc, flow))
                .collect::<Result<Vec<()>>>()?;
        } else {
            for (proc, flow) in work {
                self.process_procedure(proc, flow)?;
            }
        }

        Ok(SignatureTable::from_program(program))
    }

    fn process_procedure(&self, proc: &mut Procedure, flow: &mut ProcedureFlow) -> Result<()> {
        if log_enabled!(Level::Trace) {
            trace!("{}:\n{}", proc.name, flow.display(self.arch.as_ref()));
        }
        Self::adjust_live_out(flow);
        if self.ensure_signature(proc, flow)? && self.config.emit_out_argument_uses {
            Self::add_use_instructions_for_out_arguments(proc);
        }
        Ok(())
    }

    /// Narrows the live-out sets to what the procedure actually modifies.
    ///
    /// A register that is live out but never written still holds the
    /// caller's value, so it is not a result.
    pub fn adjust_live_out(flow: &mut ProcedureFlow) {
        flow.grf_live_out &= flow.grf_trashed;
        flow.live_out &= &flow.trashed;
    }

    /// Creates a signature for `proc` from its summary. Returns false if the
    /// procedure already had a valid signature, which is left untouched.
    pub fn ensure_signature(&self, proc: &mut Procedure, flow: &mut ProcedureFlow) -> Result<bool> {
        if proc.signature().is_valid() {
            trace!("{}: signature already valid", proc.name);
            return Ok(false);
        }
        let arch = self.arch.as_ref();
        let fpu_delta = proc.signature().fpu_stack_delta;
        let fpu_out_max = proc.signature().fpu_stack_out_argument_max;
        let mut sb = SignatureBuilder::new(&mut proc.frame, arch).with_fpu_stack(fpu_delta, fpu_out_max);

        if flow.grf_live_out != 0 {
            sb.add_flag_group_return_value(flow.grf_live_out);
        }

        let implicit = self.platform.implicit_argument_registers();
        let may_use = &flow.may_use - &implicit;
        for r in may_use.iter() {
            if !self.is_sub_register_of_registers(r, &may_use) {
                sb.add_register_argument(r);
            }
        }

        for (offset, id) in sorted_arguments(sb.frame(), StorageKind::StackArgument, 0) {
            add_stack_argument(&mut sb, offset, id, flow)?;
        }

        for (depth, id) in sorted_arguments(sb.frame(), StorageKind::FpuStackArgument, 0) {
            sb.add_fpu_stack_argument(depth, id);
        }

        let live_out = &flow.live_out - &implicit;
        for r in live_out.iter() {
            if self.is_sub_register_of_registers(r, &live_out) {
                continue;
            }
            let Some(reg) = arch.register(r) else {
                trace!("{}: live-out register {r} has no definition", proc.name);
                continue;
            };
            let id = sb.frame().ensure_register(reg);
            sb.add_argument(id, true)?;
        }

        for (depth, id) in sorted_arguments(sb.frame(), StorageKind::FpuStackArgument, -fpu_delta) {
            if depth <= fpu_out_max {
                let data_type = sb.frame().get(id)?.data_type.clone();
                let id = sb.frame().ensure_fpu_stack_variable(depth, data_type);
                sb.add_argument(id, true)?;
            }
        }

        let sig = sb.build()?;
        debug!("{}: {}", proc.name, sig.format(&proc.name));
        flow.signature = Some(sig.clone());
        proc.commit_signature(sig)?;
        Ok(true)
    }

    /// Adds a `use` of each register out-argument's original at the head of
    /// the exit block, in parameter order.
    pub fn add_use_instructions_for_out_arguments(proc: &mut Procedure) {
        let frame = &proc.frame;
        let uses: Vec<Statement> = proc
            .signature()
            .parameters
            .iter()
            .filter(|p| p.storage.is_register_out_argument())
            .filter_map(|p| {
                let Storage::OutArgument { original } = &p.storage else {
                    return None;
                };
                let orig = frame.find(&original.storage)?;
                let out = frame.find(&p.storage)?;
                Some(Statement::new(
                    0,
                    Instruction::Use(UseInstruction {
                        expression: Expression::Identifier(orig),
                        out: Some(out),
                    }),
                ))
            })
            .collect();
        if uses.is_empty() {
            return;
        }
        let name = proc.name.clone();
        match proc.cfg.exit_block_mut() {
            Some(exit) => {
                exit.statements.splice(0..0, uses);
            }
            None => debug!("{name}: no exit block for out-argument uses"),
        }
    }

    /// Second pass: bind call sites and returns of every procedure.
    pub fn rewrite_call_sites(&self, program: &mut Program, table: &SignatureTable) -> RewriteStats {
        let per_proc: Vec<RewriteStats> = if self.config.is_parallel() {
            program
                .procedures_mut()
                .par_iter_mut()
                .map(|proc| self.rewrite_procedure(proc, table))
                .collect()
        } else {
            program
                .procedures_mut()
                .iter_mut()
                .map(|proc| self.rewrite_procedure(proc, table))
                .collect()
        };
        let mut total = RewriteStats::default();
        for s in per_proc {
            total += s;
        }
        total
    }

    fn rewrite_procedure(&self, proc: &mut Procedure, table: &SignatureTable) -> RewriteStats {
        let mut stats = self.rewrite_calls(proc, table);
        stats.returns_rewritten = Self::rewrite_returns(proc);
        stats
    }

    /// Replaces call placeholders whose callee has a signature with an
    /// application bound in the caller's frame.
    pub fn rewrite_calls(&self, proc: &mut Procedure, table: &SignatureTable) -> RewriteStats {
        let mut stats = RewriteStats::default();
        let arch = self.arch.as_ref();
        let Procedure { name, frame, cfg, .. } = proc;
        for block in cfg.blocks_mut() {
            for stm in &mut block.statements {
                let Instruction::Call(call) = &stm.instruction else {
                    continue;
                };
                let sig = match &call.callee {
                    Callee::Procedure(callee) => match table.get(*callee) {
                        Some(sig) => sig,
                        None => {
                            debug!("{name}: call to {callee} at {:#x} has no signature", stm.address);
                            stats.calls_unresolved += 1;
                            continue;
                        }
                    },
                    Callee::External(_) | Callee::Indirect(_) => {
                        trace!("{name}: call at {:#x} left unresolved", stm.address);
                        stats.calls_unresolved += 1;
                        continue;
                    }
                };
                stm.instruction = bind_call(frame, arch, call.callee.clone(), call.site, sig);
                stats.calls_rewritten += 1;
            }
        }
        stats
    }

    /// Makes every return carry the procedure's return value. Returns the
    /// number of returns updated.
    pub fn rewrite_returns(proc: &mut Procedure) -> usize {
        let Some(rv) = proc.signature().return_value.clone() else {
            return 0;
        };
        let id = proc.frame.ensure_identifier(&rv);
        let mut count = 0;
        for block in proc.cfg.blocks_mut() {
            for stm in &mut block.statements {
                if let Instruction::Return(ret) = &mut stm.instruction {
                    ret.expression = Some(Expression::Identifier(id));
                    count += 1;
                }
            }
        }
        count
    }

    /// Returns true if register `r` is a strict sub-register of a member of
    /// `regs`. Unknown registers are never sub-registers.
    fn is_sub_register_of_registers(&self, r: usize, regs: &RegisterSet) -> bool {
        let Some(reg) = self.arch.register(r) else {
            return false;
        };
        regs.iter()
            .filter_map(|r2| self.arch.register(r2))
            .any(|other| self.arch.is_sub_register_of(reg, other))
    }
}

/// Builds the bound form of a call: an assignment of the application to
/// the return value's binding, or a side effect when there is none.
fn bind_call(
    frame: &mut Frame,
    arch: &dyn Architecture,
    callee: Callee,
    site: CallSite,
    sig: &Signature,
) -> Instruction {
    let mut binder = CallBinder::new(frame, arch, site);
    let arguments = sig.parameters.iter().map(|p| binder.bind(p)).collect();
    let app = Expression::Application(Application { callee, arguments });
    match &sig.return_value {
        Some(rv) => Instruction::Assignment {
            dst: binder.bind_identifier(rv),
            src: app,
        },
        None => Instruction::SideEffect(app),
    }
}

/// Narrows a stack argument to its observed access width, then adds it.
fn add_stack_argument(
    sb: &mut SignatureBuilder<'_>,
    offset: i32,
    id: IdentifierId,
    flow: &ProcedureFlow,
) -> Result<()> {
    if let Some(&bits) = flow.stack_arguments.get(&id) {
        let data_type = &sb.frame().get(id)?.data_type;
        if bits < data_type.bit_size() {
            if let Some(pt) = data_type.as_primitive() {
                let narrowed = PrimitiveType::create(pt.domain, bits);
                sb.frame().set_data_type(id, DataType::Primitive(narrowed))?;
            }
        }
    }
    sb.add_stack_argument(offset, id);
    Ok(())
}

/// Identifiers of one storage kind keyed by external offset, keeping the
/// widest identifier at each offset at or above `start`.
fn sorted_arguments(frame: &Frame, kind: StorageKind, start: i32) -> Vec<(i32, IdentifierId)> {
    let mut arguments: BTreeMap<i32, (IdentifierId, &Identifier)> = BTreeMap::new();
    for (id, ident) in frame.identifiers() {
        if ident.storage.kind() != kind {
            continue;
        }
        let Some(offset) = frame.external_offset(id) else {
            continue;
        };
        if offset < start {
            continue;
        }
        let wider = arguments
            .get(&offset)
            .map_or(true, |(_, old)| old.data_type.bit_size() < ident.data_type.bit_size());
        if wider {
            arguments.insert(offset, (id, ident));
        }
    }
    arguments.into_iter().map(|(o, (id, _))| (o, id)).collect()
}
