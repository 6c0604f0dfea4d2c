//! Error types for Lore.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! embedding, index persistence and retrieval errors.

use thiserror::Error;

/// Unified error type for Lore.
///
/// Library functions return `Result<T, AppError>`. Environmental problems
/// (missing embedding runtime, stale index) are recovered by the retrieval
/// layer; only programmer misuse is expected to reach callers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Knowledge base and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// The embedding backend could not be constructed (missing model or runtime)
    #[error("Embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// An embedding call failed after the backend was initialized
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A persisted index is missing, corrupt, or written by an incompatible version
    #[error("Invalid index: {0}")]
    IndexInvalid(String),

    /// Invalid arguments supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error reports a backend that cannot be constructed at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AppError::EmbedderUnavailable(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
