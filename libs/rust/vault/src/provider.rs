//! Provider traits exposed to the rest of the application.
//!
//! Callers hold these as trait objects and never talk to Vault directly.

use crate::error::VaultResult;
use crate::secrets::{SecretDocument, SecretReference, SetSecretResponse};
use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;

/// Versioned secret storage with optional transit encryption.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Read one field, decrypting transit ciphertext.
    async fn get_secret(&self, reference: &SecretReference) -> VaultResult<String>;

    /// Write a document as a new version, encrypting fields when the
    /// reference names a transit key.
    async fn set_secret(
        &self,
        reference: &SecretReference,
        document: &SecretDocument,
    ) -> VaultResult<SetSecretResponse>;
}

/// Source of database credentials.
#[async_trait]
pub trait DatabaseCredentialProvider: Send + Sync {
    /// Fetch a fresh credential lease.
    async fn get_db_credentials(&self) -> VaultResult<DbCredentials>;
}

/// Database credentials with their validity window.
#[derive(Debug, Clone)]
pub struct DbCredentials {
    /// Database user
    pub username: String,
    /// Database password
    pub password: SecretString,
    /// Validity in seconds
    pub lease_duration_secs: u64,
}

impl DbCredentials {
    /// Validity as a duration.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_credentials_debug_redacts_password() {
        let creds = DbCredentials {
            username: "app_user".to_string(),
            password: SecretString::from("db-password-xyz"),
            lease_duration_secs: 3600,
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("app_user"));
        assert!(!debug.contains("db-password-xyz"));
        assert_eq!(creds.lease_duration(), Duration::from_secs(3600));
    }
}
