use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error kinds surfaced at the storage-core boundary.
///
/// Transaction-scoped errors (`TypeMismatch`, `NotFound`, `OutOfRange`) are
/// recoverable: the transaction stays open and the caller may retry a
/// corrected op or abort. `Io` and `Corrupt` are fatal to the transaction;
/// `Corrupt` is fatal to the graph session.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("type mismatch: {0}")]
    TypeMismatch(&'static str),
    #[error("out of range: {0}")]
    OutOfRange(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("duplicate primary key")]
    Duplicate,
    #[error("operation disallowed by schema: {0}")]
    Disallowed(&'static str),
    #[error("edge exists and overwrite is forbidden")]
    Conflict,
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption detected: {0}")]
    Corrupt(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl GraphError {
    /// True for errors a caller may recover from without aborting the
    /// enclosing transaction.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GraphError::TypeMismatch(_)
                | GraphError::OutOfRange(_)
                | GraphError::NotFound(_)
                | GraphError::Duplicate
                | GraphError::Disallowed(_)
                | GraphError::Conflict
                | GraphError::Unsupported(_)
        )
    }
}
