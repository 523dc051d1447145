//! Error types for retrace-core.

use thiserror::Error;

use crate::frame::IdentifierId;
use crate::procedure::ProcedureId;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier id not present in the frame.
    #[error("invalid identifier id: {0}")]
    InvalidIdentifier(IdentifierId),

    /// Procedure id not present in the program.
    #[error("unknown procedure: {0}")]
    UnknownProcedure(ProcedureId),

    /// Attempt to replace a signature that has already been determined.
    #[error("procedure {0} already has a valid signature")]
    SignatureAlreadyValid(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
