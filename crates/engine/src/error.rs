//! The module contains the errors the engine can throw.
//!
//! The errors map onto four families:
//!
//! - [`Conflict`] the account or user changed since it was last read.
//! - [`InvalidInput`] malformed numeric or text input, the step is re-prompted.
//! - [`FetchError`] the mailbox could not be queried, counted as "no code".
//! - [`Database`] persistence failure, nothing was committed.
//!
//!  [`Conflict`]: EngineError::Conflict
//!  [`InvalidInput`]: EngineError::InvalidInput
//!  [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::InvalidTransition(a), Self::InvalidTransition(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Failure of a single mailbox query.
///
/// The code-wait loop never aborts on these: each one is logged and the
/// attempt is counted as "no code".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("mailbox connection failed: {0}")]
    Connection(String),
    #[error("mailbox authentication failed: {0}")]
    Auth(String),
    #[error("mailbox protocol error: {0}")]
    Protocol(String),
    #[error("message parse error: {0}")]
    Parse(String),
}
