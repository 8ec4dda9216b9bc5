//! # Kura Core Errors
//!
//! Defines the crate-level error type aggregating the per-subsystem
//! errors ([`MacroSystemError`], [`StorageSystemError`]) behind `#[from]`
//! conversions, plus the crate-wide [`Result`] alias.

use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::macros::error::MacroSystemError;
use crate::storage::error::StorageSystemError;

/// Top-level error type for the kura storage engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed macro system error
    #[error("Macro system error: {0}")]
    MacroSystem(#[from] MacroSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
