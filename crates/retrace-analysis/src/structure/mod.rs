//! Control-flow structuring.
//!
//! Classifies the blocks of a procedure as sequential code, conditionals
//! and loops, and flags branches that cannot be expressed with structured
//! statements. The analysis runs in two phases driven by
//! [`StructureAnalysis`]: building the structure graph (orderings, loop
//! stamps, post-dominators) and classifying it.
//!
//! Nodes live in a flat arena owned by [`ProcedureStructure`]; every
//! cross-reference (header, latch, follow) is a [`NodeId`].

mod analysis;
mod dump;
pub mod node;

use std::ops::Index;

pub use analysis::StructureAnalysis;
pub use node::{
    BlockKind, CondType, LoopType, NodeId, StructureNode, StructureType, UnstructuredType,
};

/// The structure graph of one procedure.
#[derive(Debug, Clone)]
pub struct ProcedureStructure {
    procedure: String,
    nodes: Vec<StructureNode>,
    entry: NodeId,
    exit: Option<NodeId>,
    /// Nodes indexed by their forward post-order number.
    ordering: Vec<NodeId>,
    /// Nodes indexed by their reverse post-order number.
    rev_ordering: Vec<NodeId>,
}

impl ProcedureStructure {
    /// Name of the procedure this structure was built from.
    pub fn procedure_name(&self) -> &str {
        &self.procedure
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// The exit node, if the exit block is reachable from the entry.
    pub fn exit(&self) -> Option<NodeId> {
        self.exit
    }

    pub fn node(&self, id: NodeId) -> Option<&StructureNode> {
        self.nodes.get(id.0)
    }

    /// Iterates over all nodes in block-list order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &StructureNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Nodes in forward post-order.
    pub fn ordering(&self) -> &[NodeId] {
        &self.ordering
    }

    /// Nodes in reverse-edge post-order.
    pub fn rev_ordering(&self) -> &[NodeId] {
        &self.rev_ordering
    }

    /// Returns true if the edge `from -> to` is a back edge.
    pub fn has_back_edge_to(&self, from: NodeId, to: NodeId) -> bool {
        from == to || self[to].is_ancestor_of(&self[from])
    }

    /// Returns true if any outgoing edge of `id` is a back edge.
    pub fn has_back_edge(&self, id: NodeId) -> bool {
        self[id]
            .successors
            .iter()
            .any(|&s| self.has_back_edge_to(id, s))
    }

    fn at_mut(&mut self, id: NodeId) -> &mut StructureNode {
        &mut self.nodes[id.0]
    }
}

impl Index<NodeId> for ProcedureStructure {
    type Output = StructureNode;

    fn index(&self, id: NodeId) -> &StructureNode {
        &self.nodes[id.0]
    }
}

/// Events reported by [`depth_first`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Visit {
    Enter(NodeId),
    Leave(NodeId),
}

/// Iterative depth-first walk over `adjacency` from `root`.
///
/// Neighbours are visited in list order, or last-to-first when `reversed`.
/// A node is reported on entry and again once every neighbour has been
/// handled. Nodes already marked in `visited` are not entered.
pub(crate) fn depth_first(
    adjacency: &[Vec<NodeId>],
    root: NodeId,
    reversed: bool,
    visited: &mut [bool],
    mut visit: impl FnMut(Visit),
) {
    visited[root.0] = true;
    visit(Visit::Enter(root));
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    while let Some(frame) = stack.last_mut() {
        let node = frame.0;
        let edges = &adjacency[node.0];
        if frame.1 < edges.len() {
            let k = if reversed {
                edges.len() - 1 - frame.1
            } else {
                frame.1
            };
            frame.1 += 1;
            let next = edges[k];
            if !visited[next.0] {
                visited[next.0] = true;
                visit(Visit::Enter(next));
                stack.push((next, 0));
            }
        } else {
            stack.pop();
            visit(Visit::Leave(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_first_events() {
        // 0 -> 1, 0 -> 2, 1 -> 2
        let adj = vec![vec![NodeId(1), NodeId(2)], vec![NodeId(2)], vec![]];
        let mut visited = vec![false; 3];
        let mut log = Vec::new();
        depth_first(&adj, NodeId(0), false, &mut visited, |v| match v {
            Visit::Enter(n) => log.push(format!("+{}", n.0)),
            Visit::Leave(n) => log.push(format!("-{}", n.0)),
        });
        assert_eq!(log, ["+0", "+1", "+2", "-2", "-1", "-0"]);
    }

    #[test]
    fn test_depth_first_reversed() {
        let adj = vec![vec![NodeId(1), NodeId(2)], vec![NodeId(2)], vec![]];
        let mut visited = vec![false; 3];
        let mut entered = Vec::new();
        depth_first(&adj, NodeId(0), true, &mut visited, |v| {
            if let Visit::Enter(n) = v {
                entered.push(n.0);
            }
        });
        assert_eq!(entered, [0, 2, 1]);
    }
}
