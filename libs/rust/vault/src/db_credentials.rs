//! Database credential reads.

use crate::client::VaultOperations;
use crate::config::DbCredentialsConfig;
use crate::error::{VaultError, VaultResult};
use crate::provider::{DatabaseCredentialProvider, DbCredentials};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, instrument};

const UNEXPECTED_ERROR: &str = "Unexpected error reading db credentials from hashicorp vault";
const EMPTY_RESPONSE: &str =
    "Empty response from Hashicorp vault while trying to retrieve database credentials.";

/// [`DatabaseCredentialProvider`] reading a Vault database role.
pub struct VaultDbCredentialsService {
    backend: Arc<dyn VaultOperations>,
    path: String,
}

impl VaultDbCredentialsService {
    /// Create the service for the role named in `config`.
    #[must_use]
    pub fn new(backend: Arc<dyn VaultOperations>, config: &DbCredentialsConfig) -> Self {
        let path = format!(
            "{}/{}/{}",
            config.db_secret_engine_name(),
            config.credential_path(),
            config.vault_db_role()
        );
        Self { backend, path }
    }

    /// Path the credentials are read from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl DatabaseCredentialProvider for VaultDbCredentialsService {
    #[instrument(skip(self), fields(path = %self.path))]
    async fn get_db_credentials(&self) -> VaultResult<DbCredentials> {
        let response = self
            .backend
            .read_db_credentials(&self.path)
            .await
            .map_err(|e| VaultError::db_credentials(UNEXPECTED_ERROR, Some(e)))?
            .ok_or_else(|| VaultError::db_credentials(EMPTY_RESPONSE, None))?;

        let data = response
            .data
            .ok_or_else(|| VaultError::db_credentials(EMPTY_RESPONSE, None))?;

        // Static roles report the remaining validity in `ttl`.
        let lease_duration_secs = data.ttl.unwrap_or(response.lease_duration);
        debug!(username = %data.username, lease_duration_secs, "Read database credentials");

        Ok(DbCredentials {
            username: data.username,
            password: SecretString::from(data.password),
            lease_duration_secs,
        })
    }
}
