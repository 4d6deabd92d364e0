//! Shared error type across promux crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, PromuxError>;

/// Unified error type used by core and daemon.
#[derive(Debug, Error)]
pub enum PromuxError {
    /// Malformed spec or update payload; the whole batch is discarded.
    #[error("parse: {0}")]
    Parse(String),
    /// Bad metric or label name, duplicate label, label-arity mismatch, or
    /// unknown method; the single offending item is dropped.
    #[error("validation: {0}")]
    Validation(String),
    /// The exposition surface rejected a register/unregister; the affected
    /// item is skipped for this reload cycle.
    #[error("registration: {0}")]
    Registration(String),
    /// Update references an unknown metric name; the update is dropped.
    #[error("lookup: {0}")]
    Lookup(String),
    /// Infrastructure failure (socket, filesystem).
    #[error("io: {0}")]
    Io(String),
}

impl PromuxError {
    /// Stable short code used in logs and telemetry fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PromuxError::Parse(_) => "parse",
            PromuxError::Validation(_) => "validation",
            PromuxError::Registration(_) => "registration",
            PromuxError::Lookup(_) => "lookup",
            PromuxError::Io(_) => "io",
        }
    }
}
