//! The two structuring phases.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use retrace_core::{BasicBlockId, Procedure};

use super::node::{
    BlockKind, CondType, LoopType, NodeId, StructureNode, StructureType, UnstructuredType, ELSE,
    THEN,
};
use super::{depth_first, ProcedureStructure, Visit};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Built,
    Structured,
}

/// Drives structuring of a single procedure.
///
/// ```ignore
/// let mut sa = StructureAnalysis::new(&procedure);
/// sa.build_procedure_structure()?;
/// sa.find_structures()?;
/// print!("{}", sa.structure()?);
/// ```
pub struct StructureAnalysis<'a> {
    procedure: &'a Procedure,
    walk_limit: usize,
    phase: Phase,
    structure: Option<ProcedureStructure>,
}

impl<'a> StructureAnalysis<'a> {
    pub fn new(procedure: &'a Procedure) -> Self {
        Self::with_config(procedure, &AnalysisConfig::default())
    }

    pub fn with_config(procedure: &'a Procedure, config: &AnalysisConfig) -> Self {
        Self {
            procedure,
            walk_limit: config.post_dominator_walk_limit,
            phase: Phase::Created,
            structure: None,
        }
    }

    /// Runs both phases and returns the classified structure.
    pub fn analyze(procedure: &'a Procedure, config: &AnalysisConfig) -> Result<ProcedureStructure> {
        let mut sa = Self::with_config(procedure, config);
        sa.build_procedure_structure()?;
        sa.find_structures()?;
        sa.into_structure()
    }

    /// Builds the node graph: orderings, loop stamps and immediate
    /// post-dominators.
    pub fn build_procedure_structure(&mut self) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(self.phase_error("build_procedure_structure", "twice"));
        }
        let mut ps = ProcedureStructure::from_procedure(self.procedure)?;
        ps.compute_post_dominators(self.walk_limit);
        debug!(
            "built structure graph of {} with {} nodes",
            self.procedure.name,
            ps.len()
        );
        self.structure = Some(ps);
        self.phase = Phase::Built;
        Ok(())
    }

    /// Classifies conditionals and loops and flags unstructured branches.
    pub fn find_structures(&mut self) -> Result<()> {
        let reason = match self.phase {
            Phase::Created => Some("before build_procedure_structure"),
            Phase::Structured => Some("twice"),
            Phase::Built => None,
        };
        if let Some(reason) = reason {
            return Err(self.phase_error("find_structures", reason));
        }
        let Some(ps) = self.structure.as_mut() else {
            return Err(self.phase_error("find_structures", "before build_procedure_structure"));
        };
        ps.structure_conditionals();
        ps.structure_loops();
        ps.check_conditionals();
        ps.flag_unlatched_back_edges();
        debug!("structured {}", self.procedure.name);
        self.phase = Phase::Structured;
        Ok(())
    }

    /// The classified structure; available once both phases have run.
    pub fn structure(&self) -> Result<&ProcedureStructure> {
        match (&self.structure, self.phase) {
            (Some(ps), Phase::Structured) => Ok(ps),
            _ => Err(self.phase_error("structure", "before find_structures")),
        }
    }

    pub fn into_structure(self) -> Result<ProcedureStructure> {
        if self.phase != Phase::Structured {
            return Err(self.phase_error("into_structure", "before find_structures"));
        }
        match self.structure {
            Some(ps) => Ok(ps),
            None => Err(AnalysisError::PhaseOrder {
                procedure: self.procedure.name.clone(),
                phase: "into_structure",
                reason: "before build_procedure_structure",
            }),
        }
    }

    fn phase_error(&self, phase: &'static str, reason: &'static str) -> AnalysisError {
        AnalysisError::PhaseOrder {
            procedure: self.procedure.name.clone(),
            phase,
            reason,
        }
    }
}

impl ProcedureStructure {
    /// Creates one node per block reachable from the entry and numbers them.
    fn from_procedure(procedure: &Procedure) -> Result<Self> {
        let cfg = &procedure.cfg;
        if cfg.block(cfg.entry).is_none() {
            return Err(AnalysisError::MissingEntry(procedure.name.clone()));
        }

        let mut reachable: HashSet<BasicBlockId> = HashSet::new();
        let mut work = vec![cfg.entry];
        while let Some(b) = work.pop() {
            if cfg.block(b).is_some() && reachable.insert(b) {
                work.extend(cfg.successors(b).iter().copied());
            }
        }

        let mut ids: HashMap<BasicBlockId, NodeId> = HashMap::with_capacity(reachable.len());
        let mut nodes = Vec::with_capacity(reachable.len());
        for (pos, block) in cfg.blocks().enumerate() {
            if reachable.contains(&block.id) {
                ids.insert(block.id, NodeId(nodes.len()));
                nodes.push(StructureNode::new(block.id, block.name.clone(), pos + 1));
            }
        }
        for node in &mut nodes {
            for &s in cfg.successors(node.block) {
                match ids.get(&s) {
                    Some(&id) => node.successors.push(id),
                    None => trace!("{}: edge {} -> {s} leaves the graph", procedure.name, node.block),
                }
            }
            node.predecessors = cfg
                .predecessors(node.block)
                .iter()
                .filter_map(|p| ids.get(p).copied())
                .collect();
            node.kind = BlockKind::from_successor_count(node.successors.len());
        }

        let Some(&entry) = ids.get(&cfg.entry) else {
            return Err(AnalysisError::MissingEntry(procedure.name.clone()));
        };
        let exit = ids.get(&cfg.exit).copied();
        let mut ps = ProcedureStructure {
            procedure: procedure.name.clone(),
            nodes,
            entry,
            exit,
            ordering: Vec::new(),
            rev_ordering: Vec::new(),
        };
        ps.number_nodes();
        Ok(ps)
    }

    /// Assigns both loop-stamp intervals, `Order` and `RevOrder`.
    fn number_nodes(&mut self) {
        let count = self.nodes.len();
        let successors: Vec<Vec<NodeId>> = self.nodes.iter().map(|n| n.successors.clone()).collect();
        let predecessors: Vec<Vec<NodeId>> =
            self.nodes.iter().map(|n| n.predecessors.clone()).collect();

        let nodes = &mut self.nodes;
        let ordering = &mut self.ordering;
        let mut time = 0;
        let mut visited = vec![false; count];
        depth_first(&successors, self.entry, false, &mut visited, |v| match v {
            Visit::Enter(id) => {
                time += 1;
                nodes[id.0].loop_stamps[0] = time;
            }
            Visit::Leave(id) => {
                time += 1;
                nodes[id.0].loop_stamps[1] = time;
                nodes[id.0].order = ordering.len();
                ordering.push(id);
            }
        });

        let mut time = 0;
        let mut visited = vec![false; count];
        depth_first(&successors, self.entry, true, &mut visited, |v| match v {
            Visit::Enter(id) => {
                time += 1;
                nodes[id.0].rev_loop_stamps[0] = time;
            }
            Visit::Leave(id) => {
                time += 1;
                nodes[id.0].rev_loop_stamps[1] = time;
            }
        });

        // Blocks that cannot reach the exit get numbered from further roots,
        // taken in Order sequence.
        let rev_ordering = &mut self.rev_ordering;
        let mut visited = vec![false; count];
        let roots = self.exit.into_iter().chain(ordering.iter().copied());
        for root in roots {
            if visited[root.0] {
                continue;
            }
            depth_first(&predecessors, root, false, &mut visited, |v| {
                if let Visit::Leave(id) = v {
                    nodes[id.0].rev_order = rev_ordering.len();
                    rev_ordering.push(id);
                }
            });
        }
    }

    /// Walks the post-dominator chains of `a` and `b` up to their meeting
    /// point. Returns `a` unchanged if the walk does not settle within
    /// `limit` steps.
    fn common_post_dominator(
        &self,
        a: Option<NodeId>,
        b: Option<NodeId>,
        limit: usize,
    ) -> Option<NodeId> {
        let (Some(old), Some(_)) = (a, b) else {
            return a.or(b);
        };
        let (mut cur, mut succ) = (a, b);
        let mut steps = 0;
        while steps < limit {
            match (cur, succ) {
                (Some(c), Some(s)) if c != s => {
                    if self[c].rev_order > self[s].rev_order {
                        succ = self[s].imm_pdom;
                    } else {
                        cur = self[c].imm_pdom;
                    }
                    steps += 1;
                }
                _ => break,
            }
        }
        if steps >= limit {
            trace!("{}: post-dominator walk gave up", self.procedure);
            return Some(old);
        }
        cur
    }

    fn update_post_dominator(&mut self, n: NodeId, a: Option<NodeId>, b: Option<NodeId>, limit: usize) {
        let pdom = self.common_post_dominator(a, b, limit);
        self.at_mut(n).imm_pdom = pdom;
    }

    fn compute_post_dominators(&mut self, limit: usize) {
        for i in (0..self.rev_ordering.len()).rev() {
            let n = self.rev_ordering[i];
            for k in 0..self[n].successors.len() {
                let s = self[n].successors[k];
                if self[s].rev_order > self[n].rev_order {
                    self.update_post_dominator(n, self[n].imm_pdom, Some(s), limit);
                }
            }
        }

        for i in 0..self.ordering.len() {
            let n = self.ordering[i];
            if self[n].successors.len() <= 1 {
                continue;
            }
            for k in 0..self[n].successors.len() {
                let s = self[n].successors[k];
                self.update_post_dominator(n, self[n].imm_pdom, Some(s), limit);
            }
        }

        // Back edges may leave a header post-dominated by something inside
        // its loop; pull it out to the successor's post-dominator.
        for i in 0..self.ordering.len() {
            let n = self.ordering[i];
            if self[n].successors.len() <= 1 {
                continue;
            }
            for k in 0..self[n].successors.len() {
                let s = self[n].successors[k];
                let own = self[n].imm_pdom;
                let through_back_edge = match (self[s].imm_pdom, own) {
                    (Some(sp), Some(np)) if self.has_back_edge_to(n, s) => {
                        (self[sp].order < self[np].order).then_some(sp)
                    }
                    _ => None,
                };
                match through_back_edge {
                    Some(sp) => self.update_post_dominator(n, Some(sp), own, limit),
                    None => self.update_post_dominator(n, own, Some(s), limit),
                }
            }
        }
    }

    fn set_cond_type(&mut self, n: NodeId) {
        let node = &self[n];
        let follow = node.cond_follow;
        let cond_type = if node.kind == BlockKind::NWay {
            CondType::Case
        } else if Some(node.successors[ELSE]) == follow {
            CondType::IfThen
        } else if Some(node.successors[THEN]) == follow {
            CondType::IfElse
        } else {
            CondType::IfThenElse
        };
        let node = self.at_mut(n);
        node.cond_type = Some(cond_type);
        node.structure_type = StructureType::Cond;
    }

    /// Tags the body of the switch at `head` with its case head. The walk
    /// stops at the switch follow and skips over nested switches.
    fn set_case_head(&mut self, head: NodeId, follow: Option<NodeId>, visited: &mut [bool]) {
        visited[head.0] = true;
        let mut stack = vec![head];
        while let Some(n) = stack.pop() {
            if n != head {
                self.at_mut(n).case_head = Some(head);
            }
            if self[n].kind == BlockKind::NWay && n != head {
                if let Some(f) = self[n].cond_follow {
                    if !visited[f.0] && Some(f) != follow {
                        visited[f.0] = true;
                        stack.push(f);
                    }
                }
                continue;
            }
            // Reverse so the first successor is tagged first.
            for k in (0..self[n].successors.len()).rev() {
                let s = self[n].successors[k];
                if !self.has_back_edge_to(n, s) && !visited[s.0] && Some(s) != follow {
                    visited[s.0] = true;
                    stack.push(s);
                }
            }
        }
    }

    fn structure_conditionals(&mut self) {
        let mut case_visited = vec![false; self.nodes.len()];
        for i in 0..self.ordering.len() {
            let n = self.ordering[i];
            if self[n].successors.len() <= 1 {
                continue;
            }
            if self.has_back_edge(n) && self[n].kind == BlockKind::TwoWay {
                self.set_cond_type(n);
                continue;
            }
            let follow = self[n].imm_pdom;
            self.at_mut(n).cond_follow = follow;
            self.set_cond_type(n);
            if self[n].cond_type == Some(CondType::Case) {
                self.set_case_head(n, follow, &mut case_visited);
            }
        }
    }

    fn is_latch_candidate(&self, p: NodeId, head: NodeId, latch: Option<NodeId>) -> bool {
        let (pn, hn) = (&self[p], &self[head]);
        pn.case_head == hn.case_head
            && pn.loop_head == hn.loop_head
            && latch.map_or(true, |l| self[l].order > pn.order)
            && !pn.loop_head.is_some_and(|h| self[h].latch == Some(p))
            && self.has_back_edge_to(p, head)
    }

    fn structure_loops(&mut self) {
        for i in (0..self.ordering.len()).rev() {
            let head = self.ordering[i];
            let mut latch = None;
            for k in 0..self[head].predecessors.len() {
                let p = self[head].predecessors[k];
                if self.is_latch_candidate(p, head, latch) {
                    latch = Some(p);
                }
            }
            if let Some(latch) = latch {
                self.mark_loop(head, latch);
            }
        }
    }

    fn mark_loop(&mut self, head: NodeId, latch: NodeId) {
        trace!(
            "{}: loop {} latched by {}",
            self.procedure,
            self[head].name,
            self[latch].name
        );
        self.at_mut(head).latch = Some(latch);
        if latch != head && self[latch].structure_type == StructureType::Cond {
            self.at_mut(latch).structure_type = StructureType::Seq;
        }
        self.at_mut(head).structure_type = StructureType::Loop;
        self.at_mut(head).loop_head = Some(head);

        let mut members = vec![false; self.nodes.len()];
        members[head.0] = true;
        let encloses = |outer: [usize; 2], d: [usize; 2], inner: [usize; 2]| {
            outer[0] < d[0] && d[1] < outer[1] && d[0] < inner[0] && inner[1] < d[1]
        };
        for j in (self[latch].order..self[head].order).rev() {
            let d = self.ordering[j];
            let (h, dn, l) = (&self[head], &self[d], &self[latch]);
            let inside = d == latch
                || encloses(h.loop_stamps, dn.loop_stamps, l.loop_stamps)
                || encloses(h.rev_loop_stamps, dn.rev_loop_stamps, l.rev_loop_stamps);
            if inside {
                members[d.0] = true;
                self.at_mut(d).loop_head = Some(head);
            }
        }

        let head_kind = self[head].kind;
        let loop_type = if self[latch].kind == BlockKind::TwoWay {
            LoopType::PostTested
        } else if head_kind == BlockKind::TwoWay {
            if self[head].cond_follow.is_some_and(|f| members[f.0]) {
                LoopType::Endless
            } else {
                LoopType::PreTested
            }
        } else {
            LoopType::Endless
        };
        if head_kind == BlockKind::TwoWay && head != latch {
            self.at_mut(head).structure_type = StructureType::LoopCond;
        }

        let follow = match loop_type {
            LoopType::PreTested => {
                let s = &self[head].successors;
                Some(if members[s[THEN].0] { s[ELSE] } else { s[THEN] })
            }
            LoopType::PostTested => {
                let s = &self[latch].successors;
                Some(if s[THEN] == head { s[ELSE] } else { s[THEN] })
            }
            LoopType::Endless => self.endless_loop_follow(head, latch, &members),
        };
        let node = self.at_mut(head);
        node.loop_type = Some(loop_type);
        node.loop_follow = follow;
    }

    /// The follow of an endless loop is the highest-ordered exit target of
    /// the conditionals in its body.
    fn endless_loop_follow(&self, head: NodeId, latch: NodeId, members: &[bool]) -> Option<NodeId> {
        let mut follow: Option<NodeId> = None;
        let latch_order = self[latch].order as isize;
        let mut j = self[head].order as isize - 1;
        while j > latch_order {
            let d = self.ordering[j as usize];
            let dn = &self[d];
            if let (StructureType::Cond, Some(df), Some(h)) =
                (dn.structure_type, dn.cond_follow, dn.loop_head)
            {
                if h == head {
                    if members[df.0] {
                        if dn.order > self[df].order {
                            j = self[df].order as isize;
                        } else {
                            break;
                        }
                    } else {
                        let mut exit = Some(dn.successors[THEN]);
                        if members[dn.successors[THEN].0] {
                            let other = dn.successors[ELSE];
                            exit = (!members[other.0]).then_some(other);
                        }
                        if let Some(s) = exit {
                            if follow.map_or(true, |f| self[s].order > self[f].order) {
                                follow = Some(s);
                            }
                        }
                    }
                }
            }
            j -= 1;
        }
        follow
    }

    /// Returns the condition type forced by a branch of `n` leading to or
    /// above `target`, if any.
    fn branch_toward(&self, n: NodeId, target: NodeId) -> Option<CondType> {
        let s = &self[n].successors;
        let leads = |b: NodeId| b == target || self[b].is_ancestor_of(&self[target]);
        if leads(s[THEN]) {
            Some(CondType::IfElse)
        } else if leads(s[ELSE]) {
            Some(CondType::IfThen)
        } else {
            None
        }
    }

    fn check_conditionals(&mut self) {
        for i in 0..self.ordering.len() {
            let n = self.ordering[i];
            let node = &self[n];
            if !matches!(
                node.structure_type,
                StructureType::Cond | StructureType::LoopCond
            ) || node.cond_type == Some(CondType::Case)
            {
                continue;
            }
            let Some(follow) = node.cond_follow else {
                continue;
            };
            let own_loop = if node.structure_type == StructureType::LoopCond {
                Some(n)
            } else {
                node.loop_head
            };
            let follow_loop = self[follow].loop_head;

            let mut forced = None;
            if own_loop != follow_loop {
                if let Some(latch) = own_loop.and_then(|h| self[h].latch) {
                    forced = self.branch_toward(n, latch);
                }
                if forced.is_none() {
                    if let Some(fl) = follow_loop {
                        forced = self.branch_toward(n, fl);
                    }
                }
            }

            if let Some(cond_type) = forced {
                trace!("{}: {} jumps across a loop", self.procedure, self[n].name);
                let node = self.at_mut(n);
                node.unstructured_type = UnstructuredType::JumpInOutLoop;
                node.cond_type = Some(cond_type);
            } else if self[n]
                .successors
                .iter()
                .any(|&s| self[s].case_head != self[n].case_head)
            {
                self.at_mut(n).unstructured_type = UnstructuredType::JumpIntoCase;
            }
        }
    }

    /// A node can latch a single loop. Any other back edge out of it jumps
    /// into a loop past its header and latch, so its source is flagged.
    fn flag_unlatched_back_edges(&mut self) {
        for i in 0..self.ordering.len() {
            let n = self.ordering[i];
            if self[n].unstructured_type != UnstructuredType::Structured {
                continue;
            }
            let unlatched = self[n]
                .successors
                .iter()
                .any(|&s| self.has_back_edge_to(n, s) && self[s].latch != Some(n));
            if unlatched {
                trace!("{}: {} has an unlatched back edge", self.procedure, self[n].name);
                self.at_mut(n).unstructured_type = UnstructuredType::JumpInOutLoop;
            }
        }
    }
}
