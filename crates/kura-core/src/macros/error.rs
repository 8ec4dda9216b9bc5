//! # Kura Macro System Errors
//!
//! Defines error types specific to the path macro engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MacroSystemError {
    #[error("Unknown path macro '{token}' in '{input}'")]
    UnknownMacro { token: String, input: String },
}
