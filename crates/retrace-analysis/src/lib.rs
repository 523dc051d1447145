//! # retrace-analysis
//!
//! Interprocedural analyses for the retrace decompiler back end.
//!
//! This crate provides:
//! - Signature synthesis from per-procedure dataflow summaries
//! - Call-site and return rewriting against the synthesized signatures
//! - Control-flow structuring (conditionals, loops, unstructured jumps)
//! - Parallel drivers over whole programs

pub mod call_rewriter;
pub mod config;
pub mod error;
pub mod flow;
pub mod parallel;
pub mod signature_builder;
pub mod structure;

pub use call_rewriter::{CallBinder, GlobalCallRewriter, RewriteStats, SignatureTable};
pub use config::{AnalysisConfig, Parallelism};
pub use error::{AnalysisError, Result};
pub use flow::{ProcedureFlow, ProcedureFlowDisplay, ProgramDataFlow};
pub use parallel::structure_procedures;
pub use signature_builder::SignatureBuilder;
pub use structure::{
    BlockKind, CondType, LoopType, NodeId, ProcedureStructure, StructureAnalysis, StructureNode,
    StructureType, UnstructuredType,
};
