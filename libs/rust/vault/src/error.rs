//! Vault error types using thiserror 2.0.
//!
//! Provides Vault-specific errors with retryability classification
//! and integration with platform common errors.

use rust_common::PlatformError;
use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Missing or invalid configuration, reported once with every violation
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Credentials absent, partial or rejected by the server
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Document or field absent
    #[error("{0}")]
    SecretNotFound(String),

    /// Ciphertext found but the reference lacks transit settings
    #[error(
        "Vault key value needs to be decrypted, but the following configuration was/were not provided: [ {} ]",
        .0.join(", ")
    )]
    DecryptionConfigMissing(Vec<String>),

    /// Write accepted but the response carried no version metadata
    #[error("{0}")]
    PersistConfig(String),

    /// Database credential read failed
    #[error("{message}")]
    DbCredentials {
        /// Summary of the failure
        message: String,
        /// Underlying cause, when there is one
        #[source]
        source: Option<Box<VaultError>>,
    },

    /// Vault server unavailable (network failure or 5xx)
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// Unexpected response status
    #[error("Unexpected response from Vault: {0}")]
    UnexpectedResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_) => true,
            Self::Platform(e) => e.is_retryable(),
            Self::DbCredentials {
                source: Some(inner),
                ..
            } => inner.is_retryable(),
            _ => false,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::SecretNotFound(msg.into())
    }

    /// Create a database credential error wrapping a cause.
    #[must_use]
    pub fn db_credentials(msg: impl Into<String>, source: Option<Self>) -> Self {
        Self::DbCredentials {
            message: msg.into(),
            source: source.map(Box::new),
        }
    }
}
