//! Error types for background trimming operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for background trimming operations
pub type Result<T> = std::result::Result<T, BgTrimError>;

/// Error types for the processing pipeline
///
/// Only conditions that abort a step live here. Recoverable situations such as a
/// missing foreground contour or a failed upload are reported through
/// [`crate::types::TrimOutcome`] and [`crate::types::UploadOutcome`] instead.
#[derive(Error, Debug)]
pub enum BgTrimError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The input file does not exist
    #[error("File not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// No decoder could identify the input
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Mask or tensor processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Transport level failures (DNS, TLS, timeouts)
    #[error("Network error: {0}")]
    Network(String),

    /// The storage service answered with an error
    #[error("Storage error ({status}): {message}")]
    Storage { status: u16, message: String },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgTrimError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a storage error from an HTTP status and response body
    pub fn storage<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Storage {
            status,
            message: message.into(),
        }
    }

    /// Create a network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}
