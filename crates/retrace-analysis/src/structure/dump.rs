//! Textual dump of a structure graph.

use std::fmt::{self, Write};

use super::{depth_first, NodeId, ProcedureStructure, Visit};

impl ProcedureStructure {
    /// Nodes in forward preorder from the entry.
    pub fn preorder(&self) -> Vec<NodeId> {
        let successors: Vec<Vec<NodeId>> =
            self.nodes.iter().map(|n| n.successors.clone()).collect();
        let mut visited = vec![false; self.nodes.len()];
        let mut out = Vec::with_capacity(self.nodes.len());
        depth_first(&successors, self.entry, false, &mut visited, |v| {
            if let Visit::Enter(id) = v {
                out.push(id);
            }
        });
        out
    }

    /// Writes every node in forward preorder, followed by an empty line.
    pub fn write<W: Write>(&self, out: &mut W) -> fmt::Result {
        for id in self.preorder() {
            let node = &self[id];
            writeln!(out, "Node {}: Block: {}", node.position, node.name)?;
            writeln!(out, "    Order: {}, RevOrder {}", node.order, node.rev_order)?;
            writeln!(out, "    Structure type: {}", node.structure_type)?;
            if let Some(h) = node.loop_head {
                writeln!(out, "    Loop header:{}", self[h].name)?;
            }
            if let Some(l) = node.latch {
                writeln!(out, "    Latch: {}", self[l].name)?;
            }
            if let Some(f) = node.cond_follow {
                writeln!(out, "    Cond follow: {}", self[f].name)?;
            }
            writeln!(out, "    Unstructured type: {}", node.unstructured_type)?;
            for (i, &s) in node.successors.iter().enumerate() {
                if i > 0 {
                    out.write_char(',')?;
                }
                out.write_str(&self[s].name)?;
            }
            out.write_char('\n')?;
        }
        out.write_char('\n')
    }

    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProcedureStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}
