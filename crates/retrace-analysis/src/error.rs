//! Error types for retrace-analysis.

use thiserror::Error;

/// Analysis error type.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Error raised by the core data model.
    #[error(transparent)]
    Core(#[from] retrace_core::Error),

    /// A structuring phase was invoked out of order.
    #[error("structuring of {procedure}: {phase} called {reason}")]
    PhaseOrder {
        procedure: String,
        phase: &'static str,
        reason: &'static str,
    },

    /// The entry block of a procedure is missing from its graph.
    #[error("procedure {0} has no entry block")]
    MissingEntry(String),
}

/// Result alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
