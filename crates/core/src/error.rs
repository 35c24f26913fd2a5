//! Core error types for flowgate

use thiserror::Error;

/// Result type alias using flowgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for flowgate modules.
///
/// Configuration faults and construction-time validation failures land
/// here. Transient admission failure (buffer full) is never an `Error` —
/// it is a normal `Dropped` outcome on the data path. Invariant violations
/// (not work-conserving, negative byte counts) are programmer bugs and are
/// raised as panics, not as `Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}
