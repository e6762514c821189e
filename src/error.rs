//! Error types.
//!
//! Validation rejections (bad country code, unknown identity, tolerance
//! failures) are not errors: they are reported as values by the validator.
//! The types here cover configuration, wire decoding, model construction,
//! and the external collaborators (store, oracle).

use thiserror::Error;

pub type RobertResult<T> = Result<T, RobertError>;

/// Startup-fatal configuration problems.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ClockError {
    #[error("{0} doesn't match RobertInstant pattern")]
    Pattern(String),

    #[error("invalid instant: {0}")]
    Instant(String),

    #[error("timestamp out of range: {0}")]
    OutOfRange(i128),
}

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("invalid length for {field}: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Raised by the value constructors of the stored records.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failures talking to the crypto oracle. All of them are treated as an
/// authentication failure for the contact being processed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Cannot score contact with no HELLO messages")]
    NoMessages,

    #[error("invalid scoring parameter {0}")]
    InvalidParameter(&'static str),
}

#[derive(Debug, Error)]
pub enum RobertError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
