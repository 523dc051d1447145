//! Property-based tests for the procedure CFG.
//!
//! Graphs are built the way procedures are: named blocks `b0..bn`, entry
//! first and exit last, with successors in declared order.

use proptest::prelude::*;
use std::collections::HashSet;

use retrace_core::{BasicBlock, BasicBlockId, ControlFlowGraph};

// =============================================================================
// Generators
// =============================================================================

fn id(i: usize) -> BasicBlockId {
    BasicBlockId(i as u32)
}

/// Successor lists for `n` blocks; the last block is the exit and has none.
/// With `forward_only` every edge goes to a higher block, so the graph is
/// acyclic.
fn arb_successors(
    max_blocks: usize,
    forward_only: bool,
) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_blocks).prop_flat_map(move |n| {
        (0..n)
            .map(|i| {
                let lo = if forward_only { i + 1 } else { 0 };
                if i + 1 == n || lo >= n {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(lo..n, 0..=3).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

fn cfg_of(successors: &[Vec<usize>]) -> ControlFlowGraph {
    let n = successors.len();
    let mut cfg = ControlFlowGraph::new(id(0), id(n - 1));
    for i in 0..n {
        cfg.add_block(BasicBlock::new(id(i), format!("b{i}")));
    }
    for (from, succs) in successors.iter().enumerate() {
        for &to in succs {
            cfg.add_edge(id(from), id(to));
        }
    }
    cfg
}

/// Blocks reachable from `start` without passing through `blocked`.
fn reachable_from(
    cfg: &ControlFlowGraph,
    start: BasicBlockId,
    blocked: Option<BasicBlockId>,
) -> HashSet<BasicBlockId> {
    let mut seen = HashSet::new();
    let mut pending = vec![start];
    while let Some(b) = pending.pop() {
        if Some(b) == blocked || !seen.insert(b) {
            continue;
        }
        pending.extend_from_slice(cfg.successors(b));
    }
    seen
}

// =============================================================================
// Construction
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Successor lists come back exactly as declared, and every edge shows up
    /// as many times among the target's predecessors.
    #[test]
    fn edges_round_trip_through_both_lists(succs in arb_successors(16, false)) {
        let cfg = cfg_of(&succs);
        for (from, targets) in succs.iter().enumerate() {
            let declared: Vec<_> = targets.iter().map(|&t| id(t)).collect();
            prop_assert_eq!(cfg.successors(id(from)), declared.as_slice());
            for &t in targets {
                let out = targets.iter().filter(|&&x| x == t).count();
                let back = cfg.predecessors(id(t)).iter().filter(|&&p| p == id(from)).count();
                prop_assert_eq!(out, back, "b{} -> b{}", from, t);
            }
        }
    }

    /// Names resolve to the block at the same insertion position.
    #[test]
    fn names_and_positions_agree(succs in arb_successors(16, false)) {
        let cfg = cfg_of(&succs);
        prop_assert_eq!(cfg.num_blocks(), succs.len());
        for i in 0..succs.len() {
            let block = cfg.block_by_name(&format!("b{i}"));
            prop_assert_eq!(block.map(|b| b.id), Some(id(i)));
            prop_assert_eq!(cfg.position(id(i)), Some(i));
        }
        prop_assert_eq!(cfg.exit_block().map(|b| b.id), Some(id(succs.len() - 1)));
    }
}

// =============================================================================
// Orderings and dominance
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Reverse post-order is a permutation of the blocks that starts at the
    /// entry and lists reachable blocks after the unreachable roots.
    #[test]
    fn rpo_is_a_permutation(succs in arb_successors(16, false)) {
        let cfg = cfg_of(&succs);
        let rpo = cfg.reverse_post_order();
        let unique: HashSet<_> = rpo.iter().copied().collect();
        prop_assert_eq!(unique.len(), rpo.len());
        prop_assert_eq!(unique, cfg.block_ids().collect::<HashSet<_>>());

        let reachable = reachable_from(&cfg, cfg.entry, None);
        let first_reachable = rpo.iter().position(|b| reachable.contains(b));
        prop_assert_eq!(first_reachable.map(|i| rpo[i]), Some(cfg.entry));
    }

    /// On an acyclic graph every edge points forward in reverse post-order.
    #[test]
    fn rpo_orders_acyclic_edges(succs in arb_successors(16, true)) {
        let cfg = cfg_of(&succs);
        let rpo = cfg.reverse_post_order();
        let at = |b: BasicBlockId| rpo.iter().position(|&x| x == b);
        for (from, targets) in succs.iter().enumerate() {
            for &t in targets {
                prop_assert!(at(id(from)) < at(id(t)), "b{} -> b{}", from, t);
            }
        }
    }

    /// `a` dominates reachable `b` exactly when removing `a` cuts `b` off
    /// from the entry.
    #[test]
    fn dominance_matches_path_cutting(succs in arb_successors(10, false)) {
        let cfg = cfg_of(&succs);
        let dominators = cfg.compute_dominators();
        let reachable = reachable_from(&cfg, cfg.entry, None);

        for &b in &reachable {
            for a in cfg.block_ids() {
                let cut = a == b || !reachable_from(&cfg, cfg.entry, Some(a)).contains(&b);
                prop_assert_eq!(dominators.dominates(a, b), cut, "b{} dom b{}", a.0, b.0);
            }
        }
    }

    /// The dominator chain of a reachable block climbs strictly to the entry.
    #[test]
    fn dominator_chain_ends_at_entry(succs in arb_successors(16, false)) {
        let cfg = cfg_of(&succs);
        let dominators = cfg.compute_dominators();
        for b in reachable_from(&cfg, cfg.entry, None) {
            let chain: Vec<_> = dominators.dominators(b).collect();
            prop_assert_eq!(chain.last().copied(), Some(cfg.entry));
            let unique: HashSet<_> = chain.iter().collect();
            prop_assert_eq!(unique.len(), chain.len());
        }
        prop_assert_eq!(dominators.immediate_dominator(cfg.entry), None);
    }
}
