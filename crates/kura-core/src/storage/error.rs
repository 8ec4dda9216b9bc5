//! # Kura Storage System Errors
//!
//! Defines error types specific to the storage subsystem: file I/O,
//! backend construction, state document serialization, and pluggable
//! factory resolution.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageSystemError {
    #[error("I/O error during operation '{operation}' on path '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File spec '{file_spec}' expands to '{path}', which has no file extension")]
    MissingExtension { file_spec: String, path: PathBuf },

    #[error("No backend factory registered for type '{type_name}'")]
    BackendFactoryNotRegistered { type_name: &'static str },

    #[error("No splitter factory registered for type '{type_name}'")]
    SplitterFactoryNotRegistered { type_name: &'static str },

    #[error("Serialization to '{format}' failed: {source}")]
    SerializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Deserialization from '{format}' failed: {source}")]
    DeserializationError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Invalid path provided: '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

// Helper for creating Io errors, ensuring path is always included.
impl StorageSystemError {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        }
    }
}
