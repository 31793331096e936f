//! Error types for the Lumina library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`LuminaError`] enum. Most variants carry a human readable message and can be
//! built through the constructor helpers on [`LuminaError`].
//!
//! # Examples
//!
//! ```
//! use lumina::error::{LuminaError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(LuminaError::invalid_argument("threshold must be within [-1, 1]"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Lumina operations.
#[derive(Error, Debug)]
pub enum LuminaError {
    /// The feature-extraction model could not be initialized.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// An input image could not be read or decoded.
    #[error("Decode failure: {0}")]
    Decode(String),

    /// A vector does not have the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector contains NaN or infinite components.
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Invalid argument passed by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persisted index artifacts exist but cannot be parsed.
    #[error("Storage unreadable: {0}")]
    StorageUnreadable(String),

    /// A durable write did not complete.
    #[error("Storage write failure: {0}")]
    StorageWrite(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with LuminaError.
pub type Result<T> = std::result::Result<T, LuminaError>;

impl LuminaError {
    /// Create a new model-unavailable error.
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        LuminaError::ModelUnavailable(msg.into())
    }

    /// Create a new decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        LuminaError::Decode(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        LuminaError::DimensionMismatch { expected, actual }
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        LuminaError::InvalidArgument(msg.into())
    }

    /// Create a new storage-unreadable error.
    pub fn storage_unreadable<S: Into<String>>(msg: S) -> Self {
        LuminaError::StorageUnreadable(msg.into())
    }

    /// Create a new storage write error.
    pub fn storage_write<S: Into<String>>(msg: S) -> Self {
        LuminaError::StorageWrite(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        LuminaError::Storage(msg.into())
    }

    /// Create a new inference error.
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        LuminaError::Inference(msg.into())
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        LuminaError::Timeout(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LuminaError::Other(msg.into())
    }

    /// Whether this error means the subsystem runs without a model.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, LuminaError::ModelUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = LuminaError::decode("not an image");
        assert_eq!(error.to_string(), "Decode failure: not an image");

        let error = LuminaError::dimension_mismatch(768, 3);
        assert_eq!(error.to_string(), "Dimension mismatch: expected 768, got 3");

        let error = LuminaError::storage_write("disk full");
        assert_eq!(error.to_string(), "Storage write failure: disk full");

        let error = LuminaError::model_unavailable("weights missing");
        assert!(error.is_model_unavailable());
        assert!(!LuminaError::timeout("inference").is_model_unavailable());
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = LuminaError::from(io_error);

        match error {
            LuminaError::Io(_) => {} // Expected
            _ => panic!("Expected IO error"),
        }
    }
}
