//! Property-based tests for control-flow structuring.
//!
//! These tests check invariants that must hold on any graph:
//! - Order and RevOrder are bijections onto 0..N
//! - Every loop header has a latch that jumps back to it
//! - Every back edge is a latch edge or its source is flagged unstructured
//! - Structuring is deterministic
//! - Natural loops on a chain are found with exactly their members

use proptest::prelude::*;

use retrace_analysis::{
    AnalysisConfig, ProcedureStructure, StructureAnalysis, StructureType, UnstructuredType,
};
use retrace_core::{BasicBlock, BasicBlockId, ControlFlowGraph, Frame, Procedure, ProcedureId};

// =============================================================================
// Graph generators
// =============================================================================

/// A graph of `n` blocks where every block but the last has one to three
/// successors. The last block is the exit.
fn arb_graph(max_blocks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2..=max_blocks).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0..n, 1..=3), n - 1).prop_map(|mut succs| {
            succs.push(Vec::new());
            succs
        })
    })
}

/// A chain `0 -> 1 -> ... -> n-1` plus one back edge `j -> i`.
fn arb_chain_with_loop(max_blocks: usize) -> impl Strategy<Value = (usize, usize, usize)> {
    (2..=max_blocks)
        .prop_flat_map(|n| (Just(n), 0..n - 1))
        .prop_flat_map(|(n, j)| (Just(n), 0..=j, Just(j)))
}

fn procedure(successors: &[Vec<usize>]) -> Procedure {
    let n = successors.len();
    let mut cfg = ControlFlowGraph::new(BasicBlockId(0), BasicBlockId(n as u32 - 1));
    for i in 0..n {
        cfg.add_block(BasicBlock::new(BasicBlockId(i as u32), format!("b{i}")));
    }
    for (from, succs) in successors.iter().enumerate() {
        for &to in succs {
            cfg.add_edge(BasicBlockId(from as u32), BasicBlockId(to as u32));
        }
    }
    Procedure::new(ProcedureId(0), "random", Frame::new(4), cfg)
}

fn structure(proc: &Procedure) -> ProcedureStructure {
    StructureAnalysis::analyze(proc, &AnalysisConfig::default()).unwrap()
}

fn block_index(ps: &ProcedureStructure, id: retrace_analysis::NodeId) -> usize {
    ps[id].block().0 as usize
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Order and RevOrder number every node exactly once.
    #[test]
    fn orderings_are_bijections(succs in arb_graph(12)) {
        let ps = structure(&procedure(&succs));
        let n = ps.len();

        let mut orders: Vec<usize> = ps.nodes().map(|(_, node)| node.order()).collect();
        orders.sort_unstable();
        prop_assert_eq!(orders, (0..n).collect::<Vec<_>>());

        let mut revs: Vec<usize> = ps.nodes().map(|(_, node)| node.rev_order()).collect();
        revs.sort_unstable();
        prop_assert_eq!(revs, (0..n).collect::<Vec<_>>());

        prop_assert_eq!(ps.ordering().len(), n);
        prop_assert_eq!(ps.rev_ordering().len(), n);
        for (i, &id) in ps.ordering().iter().enumerate() {
            prop_assert_eq!(ps[id].order(), i);
        }
    }

    /// Every loop header is latched by a predecessor that jumps back to it.
    #[test]
    fn loop_headers_have_latches(succs in arb_graph(12)) {
        let ps = structure(&procedure(&succs));
        for (id, node) in ps.nodes() {
            if !node.structure_type().is_loop() {
                continue;
            }
            let latch = node.latch();
            prop_assert!(latch.is_some(), "{} has no latch", node.name());
            let latch = latch.unwrap();
            prop_assert!(ps[latch].successors().contains(&id));
            prop_assert_eq!(node.loop_head(), Some(id));
            if node.structure_type() == StructureType::LoopCond {
                prop_assert_ne!(latch, id);
            }
        }
    }

    /// An edge `p -> h` where `h` dominates `p` either latches the loop at
    /// `h`, or leaves `p` flagged as an unstructured jump.
    #[test]
    fn back_edges_latch_or_are_flagged(succs in arb_graph(12)) {
        let proc = procedure(&succs);
        let ps = structure(&proc);
        let dominators = proc.cfg.compute_dominators();

        for (p, targets) in succs.iter().enumerate() {
            let Some(source) = ps.node_by_name(&format!("b{p}")) else {
                continue;
            };
            for &h in targets {
                if !dominators.dominates(BasicBlockId(h as u32), BasicBlockId(p as u32)) {
                    continue;
                }
                let header = ps.node_by_name(&format!("b{h}")).unwrap();
                let latched = ps[header].latch() == Some(source);
                if latched {
                    prop_assert!(ps[header].structure_type().is_loop());
                } else {
                    prop_assert_ne!(
                        ps[source].unstructured_type(),
                        UnstructuredType::Structured,
                        "back edge b{} -> b{} is neither latch nor flagged",
                        p,
                        h
                    );
                }
            }
        }
    }

    /// Only blocks reachable from the entry become nodes.
    #[test]
    fn nodes_are_reachable_blocks(succs in arb_graph(12)) {
        let ps = structure(&procedure(&succs));
        let mut reachable = vec![false; succs.len()];
        let mut work = vec![0usize];
        while let Some(b) = work.pop() {
            if !reachable[b] {
                reachable[b] = true;
                work.extend(succs[b].iter().copied());
            }
        }
        prop_assert_eq!(ps.len(), reachable.iter().filter(|r| **r).count());
        for (id, _) in ps.nodes() {
            prop_assert!(reachable[block_index(&ps, id)]);
        }
    }

    /// Structuring the same graph twice yields the same dump.
    #[test]
    fn structuring_is_deterministic(succs in arb_graph(12)) {
        let proc = procedure(&succs);
        let first = structure(&proc).dump();
        let second = StructureAnalysis::analyze(&proc, &AnalysisConfig::sequential())
            .unwrap()
            .dump();
        prop_assert_eq!(first, second);
    }

    /// A back edge `j -> i` on a chain makes `i` a loop latched by `j`
    /// whose members are exactly `i..=j`.
    #[test]
    fn chain_back_edge_forms_natural_loop((n, i, j) in arb_chain_with_loop(12)) {
        let mut succs: Vec<Vec<usize>> = (0..n)
            .map(|k| if k + 1 < n { vec![k + 1] } else { Vec::new() })
            .collect();
        succs[j].push(i);
        let ps = structure(&procedure(&succs));

        let header = ps.node_by_name(&format!("b{i}")).unwrap();
        let latch = ps.node_by_name(&format!("b{j}")).unwrap();
        prop_assert!(ps[header].structure_type().is_loop());
        prop_assert_eq!(ps[header].latch(), Some(latch));

        for (_, node) in ps.nodes() {
            let k = node.block().0 as usize;
            if (i..=j).contains(&k) {
                prop_assert_eq!(node.loop_head(), Some(header), "b{} outside loop", k);
            } else {
                prop_assert_eq!(node.loop_head(), None, "b{} inside loop", k);
            }
        }
    }
}
