//! Nodes of a procedure's structure graph.

use std::fmt;

use retrace_core::BasicBlockId;

/// Index of a node in its [`ProcedureStructure`](super::ProcedureStructure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Role of a node in the structured program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StructureType {
    /// Straight-line code.
    #[default]
    Seq,
    /// Head of an if/switch.
    Cond,
    /// Head of a loop.
    Loop,
    /// Head of a loop that is also a conditional.
    LoopCond,
}

impl StructureType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Seq => "Seq",
            Self::Cond => "Cond",
            Self::Loop => "Loop",
            Self::LoopCond => "LoopCond",
        }
    }

    /// Returns true for loop heads.
    pub fn is_loop(&self) -> bool {
        matches!(self, Self::Loop | Self::LoopCond)
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a conditional cannot be emitted as structured code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnstructuredType {
    #[default]
    Structured,
    /// One branch leaves or enters a loop other than the follow's.
    JumpInOutLoop,
    /// One branch enters the body of a different switch.
    JumpIntoCase,
}

impl UnstructuredType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Structured => "Structured",
            Self::JumpInOutLoop => "JumpInOutLoop",
            Self::JumpIntoCase => "JumpIntoCase",
        }
    }
}

impl fmt::Display for UnstructuredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a conditional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondType {
    /// The else successor is the follow.
    IfThen,
    /// The then successor is the follow.
    IfElse,
    IfThenElse,
    /// Multi-way branch.
    Case,
}

/// Where a loop tests its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopType {
    /// `while`: the header tests.
    PreTested,
    /// `do ... while`: the latch tests.
    PostTested,
    /// Neither header nor latch exits the loop.
    Endless,
}

/// Branching shape of a block, derived from its successor count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// No successors.
    Return,
    OneWay,
    TwoWay,
    /// More than two successors.
    NWay,
}

impl BlockKind {
    pub fn from_successor_count(count: usize) -> Self {
        match count {
            0 => Self::Return,
            1 => Self::OneWay,
            2 => Self::TwoWay,
            _ => Self::NWay,
        }
    }
}

/// Index of the successor taken when a two-way condition holds.
pub const THEN: usize = 0;
/// Index of the successor taken when a two-way condition fails.
pub const ELSE: usize = 1;

/// One basic block of a procedure with its structuring annotations.
#[derive(Debug, Clone)]
pub struct StructureNode {
    pub(crate) block: BasicBlockId,
    pub(crate) name: String,
    pub(crate) position: usize,
    pub(crate) kind: BlockKind,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) predecessors: Vec<NodeId>,

    pub(crate) order: usize,
    pub(crate) rev_order: usize,
    pub(crate) loop_stamps: [usize; 2],
    pub(crate) rev_loop_stamps: [usize; 2],
    pub(crate) imm_pdom: Option<NodeId>,

    pub(crate) structure_type: StructureType,
    pub(crate) unstructured_type: UnstructuredType,
    pub(crate) cond_type: Option<CondType>,
    pub(crate) cond_follow: Option<NodeId>,
    pub(crate) loop_type: Option<LoopType>,
    pub(crate) loop_follow: Option<NodeId>,
    pub(crate) loop_head: Option<NodeId>,
    pub(crate) latch: Option<NodeId>,
    pub(crate) case_head: Option<NodeId>,
}

impl StructureNode {
    pub(crate) fn new(block: BasicBlockId, name: String, position: usize) -> Self {
        Self {
            block,
            name,
            position,
            kind: BlockKind::Return,
            successors: Vec::new(),
            predecessors: Vec::new(),
            order: usize::MAX,
            rev_order: usize::MAX,
            loop_stamps: [0; 2],
            rev_loop_stamps: [0; 2],
            imm_pdom: None,
            structure_type: StructureType::Seq,
            unstructured_type: UnstructuredType::Structured,
            cond_type: None,
            cond_follow: None,
            loop_type: None,
            loop_follow: None,
            loop_head: None,
            latch: None,
            case_head: None,
        }
    }

    /// The basic block this node stands for.
    pub fn block(&self) -> BasicBlockId {
        self.block
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based position of the block in the procedure's block list.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Successors in declared order.
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    /// Forward post-order number.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Post-order number of the traversal over reversed edges from the exit.
    pub fn rev_order(&self) -> usize {
        self.rev_order
    }

    pub fn loop_stamps(&self) -> [usize; 2] {
        self.loop_stamps
    }

    pub fn rev_loop_stamps(&self) -> [usize; 2] {
        self.rev_loop_stamps
    }

    pub fn immediate_post_dominator(&self) -> Option<NodeId> {
        self.imm_pdom
    }

    pub fn structure_type(&self) -> StructureType {
        self.structure_type
    }

    pub fn unstructured_type(&self) -> UnstructuredType {
        self.unstructured_type
    }

    pub fn cond_type(&self) -> Option<CondType> {
        self.cond_type
    }

    pub fn cond_follow(&self) -> Option<NodeId> {
        self.cond_follow
    }

    pub fn loop_type(&self) -> Option<LoopType> {
        self.loop_type
    }

    pub fn loop_follow(&self) -> Option<NodeId> {
        self.loop_follow
    }

    /// Header of the innermost loop containing this node.
    pub fn loop_head(&self) -> Option<NodeId> {
        self.loop_head
    }

    /// Latch of the loop this node heads.
    pub fn latch(&self) -> Option<NodeId> {
        self.latch
    }

    /// Header of the switch whose body contains this node.
    pub fn case_head(&self) -> Option<NodeId> {
        self.case_head
    }

    /// Returns true if this node's stamp interval strictly encloses the
    /// other's in either traversal, i.e. it is a proper DFS ancestor.
    pub fn is_ancestor_of(&self, other: &StructureNode) -> bool {
        (self.loop_stamps[0] < other.loop_stamps[0] && self.loop_stamps[1] > other.loop_stamps[1])
            || (self.rev_loop_stamps[0] < other.rev_loop_stamps[0]
                && self.rev_loop_stamps[1] > other.rev_loop_stamps[1])
    }
}
