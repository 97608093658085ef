use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid period: start {start} is not before end {end}")]
    InvalidPeriod { start: String, end: String },

    #[error("unknown actor kind: {0}")]
    UnknownActorKind(String),

    #[error("invalid actor id {0}, expected kind:id")]
    InvalidActorId(String),
}
