//! Parallel structuring of whole programs.
//!
//! Procedures are structured independently of each other, so the work fans
//! out over rayon's pool. Results come back in program order either way.

use log::debug;
use rayon::prelude::*;

use retrace_core::{Procedure, Program};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::structure::{ProcedureStructure, StructureAnalysis};

/// Structures every procedure of `program`.
///
/// # Example
/// ```ignore
/// use retrace_analysis::{structure_procedures, AnalysisConfig};
///
/// let structures = structure_procedures(&program, &AnalysisConfig::default())?;
/// for s in &structures {
///     print!("{s}");
/// }
/// ```
pub fn structure_procedures(
    program: &Program,
    config: &AnalysisConfig,
) -> Result<Vec<ProcedureStructure>> {
    let procedures = program.procedures();
    debug!(
        "structuring {} procedures ({})",
        procedures.len(),
        config.parallelism.name()
    );
    if config.is_parallel() {
        procedures
            .par_iter()
            .map(|p| structure_procedure(p, config))
            .collect()
    } else {
        procedures
            .iter()
            .map(|p| structure_procedure(p, config))
            .collect()
    }
}

fn structure_procedure(procedure: &Procedure, config: &AnalysisConfig) -> Result<ProcedureStructure> {
    StructureAnalysis::analyze(procedure, config)
}
