//! Centralized error types for the shared library.
//!
//! Every error is classified as either retryable or non-retryable so that
//! callers can decide whether a failed operation is worth repeating.

use std::path::PathBuf;
use thiserror::Error;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP client construction or request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// TLS material could not be read from disk
    #[error("Unable to read TLS material from {}: {source}", path.display())]
    TlsMaterial {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Service is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Global tracing subscriber could not be installed
    #[error("Tracing initialisation failed: {0}")]
    Tracing(String),
}

impl PlatformError {
    /// Check if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::PlatformError;
    ///
    /// let err = PlatformError::unavailable("connection reset");
    /// assert!(err.is_retryable());
    ///
    /// let err = PlatformError::Tracing("subscriber already set".into());
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
