//! Crate-wide error types.

use thiserror::Error;

use crate::common::{SiteId, TransactionId};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors the engine can report.
///
/// Per the error taxonomy in the design doc: every variant here is an
/// `InvalidInstruction` except `ProtocolViolation`, which indicates an
/// internal precondition was broken and should never be observed in a
/// correct build. `Blocked` and `Unavailable` are not errors at all;
/// they are [`crate::site::Outcome`] values, since an operation staying
/// queued is expected control flow, not a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    #[error("transaction {0} does not exist")]
    UnknownTransaction(TransactionId),

    #[error("site {0} is out of range 1..=10")]
    SiteOutOfRange(SiteId),

    #[error("site {0} is already down")]
    SiteAlreadyDown(SiteId),

    #[error("site {0} is already up")]
    SiteAlreadyUp(SiteId),

    #[error("malformed instruction: {0}")]
    Malformed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl EngineError {
    /// `true` for the taxonomy's `InvalidInstruction` category: user
    /// errors that are reported and skipped, never fatal.
    pub fn is_invalid_instruction(&self) -> bool {
        !matches!(self, EngineError::ProtocolViolation(_))
    }
}
