//! Control flow graph representation.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::basic_block::{BasicBlock, BasicBlockId};

/// A control flow graph for a procedure.
///
/// Blocks keep their insertion order, and each block's successors keep the
/// order in which edges were added. Traversals depend on both, so the same
/// construction sequence always yields the same analysis results.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlFlowGraph {
    /// Entry block ID.
    pub entry: BasicBlockId,
    /// Exit block ID. Every return flows here.
    pub exit: BasicBlockId,
    /// All basic blocks, indexed by ID.
    blocks: IndexMap<BasicBlockId, BasicBlock>,
    /// Forward edges (block -> successors).
    successors: IndexMap<BasicBlockId, Vec<BasicBlockId>>,
    /// Backward edges (block -> predecessors).
    predecessors: IndexMap<BasicBlockId, Vec<BasicBlockId>>,
    next_id: u32,
}

impl ControlFlowGraph {
    /// Creates a new empty CFG with the given entry and exit block ids.
    pub fn new(entry: BasicBlockId, exit: BasicBlockId) -> Self {
        Self {
            entry,
            exit,
            blocks: IndexMap::new(),
            successors: IndexMap::new(),
            predecessors: IndexMap::new(),
            next_id: entry.0.max(exit.0) + 1,
        }
    }

    /// Adds a basic block to the CFG.
    pub fn add_block(&mut self, block: BasicBlock) {
        let id = block.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.blocks.insert(id, block);
        self.successors.entry(id).or_default();
        self.predecessors.entry(id).or_default();
    }

    /// Adds a new empty block with a fresh id and returns the id.
    pub fn add_named_block(&mut self, name: impl Into<String>) -> BasicBlockId {
        let id = BasicBlockId::new(self.next_id);
        self.add_block(BasicBlock::new(id, name));
        id
    }

    /// Adds an edge from one block to another.
    pub fn add_edge(&mut self, from: BasicBlockId, to: BasicBlockId) {
        self.successors.entry(from).or_default().push(to);
        self.predecessors.entry(to).or_default().push(from);
    }

    /// Returns a reference to a block by ID.
    pub fn block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    /// Returns a mutable reference to a block by ID.
    pub fn block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Returns the entry block.
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.get(&self.entry)
    }

    /// Returns the exit block.
    pub fn exit_block(&self) -> Option<&BasicBlock> {
        self.blocks.get(&self.exit)
    }

    /// Returns the exit block mutably.
    pub fn exit_block_mut(&mut self) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&self.exit)
    }

    /// Returns an iterator over all blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    /// Returns an iterator over all blocks, mutably.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.values_mut()
    }

    /// Returns an iterator over all block IDs.
    pub fn block_ids(&self) -> impl Iterator<Item = BasicBlockId> + '_ {
        self.blocks.keys().copied()
    }

    /// Returns the number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Zero-based insertion position of a block.
    pub fn position(&self, id: BasicBlockId) -> Option<usize> {
        self.blocks.get_index_of(&id)
    }

    /// Finds a block by name.
    pub fn block_by_name(&self, name: &str) -> Option<&BasicBlock> {
        self.blocks.values().find(|b| b.name == name)
    }

    /// Returns the successors of a block, in declared order.
    pub fn successors(&self, id: BasicBlockId) -> &[BasicBlockId] {
        self.successors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the predecessors of a block, in edge insertion order.
    pub fn predecessors(&self, id: BasicBlockId) -> &[BasicBlockId] {
        self.predecessors
            .get(&id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns every block in reverse post-order.
    ///
    /// The walk starts at the entry. Blocks it cannot reach are then used as
    /// further roots in insertion order, so each block appears exactly once.
    /// Edges to blocks that were never added are ignored.
    pub fn reverse_post_order(&self) -> Vec<BasicBlockId> {
        let mut seen = vec![false; self.blocks.len()];
        let mut post_order = Vec::with_capacity(self.blocks.len());

        for root in std::iter::once(self.entry).chain(self.block_ids()) {
            let Some(pos) = self.position(root) else {
                continue;
            };
            if seen[pos] {
                continue;
            }
            seen[pos] = true;

            // (block, index of the next successor to try)
            let mut stack = vec![(root, 0usize)];
            while let Some(top) = stack.last_mut() {
                let (block, next) = *top;
                match self.successors(block).get(next) {
                    Some(&succ) => {
                        top.1 += 1;
                        if let Some(p) = self.position(succ) {
                            if !seen[p] {
                                seen[p] = true;
                                stack.push((succ, 0));
                            }
                        }
                    }
                    None => {
                        post_order.push(block);
                        stack.pop();
                    }
                }
            }
        }

        post_order.reverse();
        post_order
    }

    /// Computes the dominator tree.
    pub fn compute_dominators(&self) -> DominatorTree {
        DominatorTree::compute(self)
    }
}

/// Dominator tree of a CFG.
///
/// Only blocks reachable from the entry have a dominator. An unreachable
/// block dominates itself and nothing else.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator per reachable block; the entry maps to itself.
    idom: IndexMap<BasicBlockId, BasicBlockId>,
}

impl DominatorTree {
    /// Computes immediate dominators by iterating over reverse post-order
    /// until nothing changes (Cooper, Harvey and Kennedy).
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let rpo = cfg.reverse_post_order();
        let index: HashMap<BasicBlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let Some(&root) = index.get(&cfg.entry) else {
            return Self { idom: IndexMap::new() };
        };

        // Indexed by position in `rpo`.
        let mut idom: Vec<Option<usize>> = vec![None; rpo.len()];
        idom[root] = Some(root);

        let mut changed = true;
        while changed {
            changed = false;
            for (i, &block) in rpo.iter().enumerate() {
                if i == root {
                    continue;
                }
                let mut done = cfg
                    .predecessors(block)
                    .iter()
                    .filter_map(|p| index.get(p).copied())
                    .filter(|&p| idom[p].is_some());
                let Some(first) = done.next() else {
                    continue;
                };
                let new_idom = done.fold(first, |a, b| Self::intersect(&idom, a, b));
                if idom[i] != Some(new_idom) {
                    idom[i] = Some(new_idom);
                    changed = true;
                }
            }
        }

        let idom = rpo
            .iter()
            .zip(&idom)
            .filter_map(|(&block, dom)| dom.map(|d| (block, rpo[d])))
            .collect();
        Self { idom }
    }

    fn intersect(idom: &[Option<usize>], mut a: usize, mut b: usize) -> usize {
        while a != b {
            while a > b {
                match idom[a] {
                    Some(d) if d != a => a = d,
                    _ => return b,
                }
            }
            while b > a {
                match idom[b] {
                    Some(d) if d != b => b = d,
                    _ => return a,
                }
            }
        }
        a
    }

    /// Iterates `block` followed by each of its dominators up to the entry.
    pub fn dominators(&self, block: BasicBlockId) -> impl Iterator<Item = BasicBlockId> + '_ {
        std::iter::successors(Some(block), move |&b| self.immediate_dominator(b))
    }

    /// Returns true if `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BasicBlockId, b: BasicBlockId) -> bool {
        self.dominators(b).any(|d| d == a)
    }

    /// Returns the immediate dominator of a block, `None` for the entry and
    /// for unreachable blocks.
    pub fn immediate_dominator(&self, block: BasicBlockId) -> Option<BasicBlockId> {
        self.idom.get(&block).copied().filter(|&d| d != block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bb(id: u32) -> BasicBlockId {
        BasicBlockId::new(id)
    }

    fn graph(n: u32, edges: &[(u32, u32)]) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::new(bb(0), bb(n - 1));
        for i in 0..n {
            cfg.add_block(BasicBlock::new(bb(i), format!("b{i}")));
        }
        for &(a, b) in edges {
            cfg.add_edge(bb(a), bb(b));
        }
        cfg
    }

    #[test]
    fn test_new_cfg_has_entry_and_exit() {
        let cfg = ControlFlowGraph::new(bb(0), bb(1));
        assert_eq!(cfg.entry, bb(0));
        assert_eq!(cfg.exit, bb(1));
        assert_eq!(cfg.num_blocks(), 0);
    }

    #[test]
    fn test_add_named_block_allocates_fresh_ids() {
        let mut cfg = ControlFlowGraph::new(bb(0), bb(1));
        cfg.add_block(BasicBlock::new(bb(0), "entry"));
        let a = cfg.add_named_block("a");
        let b = cfg.add_named_block("b");
        assert_eq!(a, bb(2));
        assert_eq!(b, bb(3));
        assert_eq!(cfg.block_by_name("b").map(|blk| blk.id), Some(b));
        assert_eq!(cfg.position(a), Some(1));
        assert_eq!(cfg.position(bb(1)), None);
    }

    #[test]
    fn test_successor_order_is_declared_order() {
        let cfg = graph(4, &[(0, 2), (0, 1), (1, 3), (2, 3)]);
        assert_eq!(cfg.successors(bb(0)), &[bb(2), bb(1)]);
        assert_eq!(cfg.predecessors(bb(3)), &[bb(1), bb(2)]);
    }

    #[test]
    fn test_successors_empty_for_unknown_block() {
        let cfg = graph(1, &[]);
        assert!(cfg.successors(bb(99)).is_empty());
        assert!(cfg.predecessors(bb(99)).is_empty());
    }

    #[test]
    fn test_reverse_post_order_diamond() {
        let cfg = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo[0], bb(0));
        assert_eq!(rpo[3], bb(3));
    }

    #[test]
    fn test_reverse_post_order_with_unreachable() {
        let cfg = graph(3, &[(0, 1)]);
        assert_eq!(cfg.reverse_post_order().len(), 3);
    }

    #[test]
    fn test_dominators_diamond() {
        let cfg = graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = cfg.compute_dominators();
        assert!(dom.dominates(bb(0), bb(3)));
        assert!(!dom.dominates(bb(1), bb(3)));
        assert!(!dom.dominates(bb(2), bb(3)));
        assert_eq!(dom.immediate_dominator(bb(3)), Some(bb(0)));
        assert!(dom.immediate_dominator(bb(0)).is_none());
    }

    #[test]
    fn test_reverse_post_order_ignores_dangling_edges() {
        let mut cfg = graph(2, &[(0, 1)]);
        cfg.add_edge(bb(1), bb(7));
        assert_eq!(cfg.reverse_post_order(), vec![bb(0), bb(1)]);
    }

    #[test]
    fn test_dominator_chain_walks_to_entry() {
        let cfg = graph(4, &[(0, 1), (1, 2), (2, 3)]);
        let dom = cfg.compute_dominators();
        let chain: Vec<_> = dom.dominators(bb(3)).collect();
        assert_eq!(chain, vec![bb(3), bb(2), bb(1), bb(0)]);
    }

    #[test]
    fn test_unreachable_block_has_no_dominator() {
        let cfg = graph(3, &[(0, 1), (2, 1)]);
        let dom = cfg.compute_dominators();
        assert_eq!(dom.immediate_dominator(bb(2)), None);
        assert!(!dom.dominates(bb(0), bb(2)));
        assert_eq!(dom.immediate_dominator(bb(1)), Some(bb(0)));
    }
}
