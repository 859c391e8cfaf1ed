//! Versioned key storage on a kv v2 engine.
//!
//! Fields marked with the transit ciphertext prefix are decrypted on read.
//! When the reference names a transit engine and key, every non-empty field
//! is encrypted before it is written.

use crate::client::VaultOperations;
use crate::error::{VaultError, VaultResult};
use crate::provider::SecretProvider;
use crate::secrets::{SecretDocument, SecretReference, SetSecretResponse};
use crate::transit::TransitCipherClient;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const PERSIST_CONFIG_MESSAGE: &str = "Unable to save generated secret to vault.  Ensure that the secret engine being used is a v2 kv secret engine";

/// [`SecretProvider`] backed by Vault.
pub struct VaultKeyVaultService {
    backend: Arc<dyn VaultOperations>,
    transit: TransitCipherClient,
}

impl VaultKeyVaultService {
    /// Create the service over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn VaultOperations>) -> Self {
        let transit = TransitCipherClient::new(Arc::clone(&backend));
        Self { backend, transit }
    }

    async fn encrypt_field(&self, reference: &SecretReference, value: &str) -> VaultResult<String> {
        match reference.transit() {
            Some((engine, key)) if !value.is_empty() => {
                self.transit.encrypt(engine, key, value).await
            }
            _ => Ok(value.to_string()),
        }
    }
}

fn field_as_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl SecretProvider for VaultKeyVaultService {
    #[instrument(skip(self), fields(location = %reference.location(), id = %reference.secret_id))]
    async fn get_secret(&self, reference: &SecretReference) -> VaultResult<String> {
        let mut document = self
            .backend
            .read_versioned(&reference.engine_name, &reference.secret_name, reference.version)
            .await?
            .ok_or_else(|| {
                VaultError::not_found(format!("No data found at {}", reference.location()))
            })?;

        let value = document
            .remove(&reference.secret_id)
            .map(field_as_string)
            .ok_or_else(|| {
                VaultError::not_found(format!(
                    "No value with id {} found at {}",
                    reference.secret_id,
                    reference.location()
                ))
            })?;

        if !TransitCipherClient::is_ciphertext(&value) {
            return Ok(value);
        }

        let Some((engine, key)) = reference.transit() else {
            return Err(VaultError::DecryptionConfigMissing(
                reference.missing_transit_properties(),
            ));
        };
        debug!(engine, key, "Stored value is transit ciphertext");
        self.transit.decrypt(engine, key, &value).await
    }

    #[instrument(
        skip(self, document),
        fields(location = %reference.location(), fields = document.len())
    )]
    async fn set_secret(
        &self,
        reference: &SecretReference,
        document: &SecretDocument,
    ) -> VaultResult<SetSecretResponse> {
        let mut payload = BTreeMap::new();
        for (name, value) in document.payload() {
            payload.insert(name.to_string(), self.encrypt_field(reference, value).await?);
        }

        let version = self
            .backend
            .write_versioned(&reference.engine_name, &reference.secret_name, &payload)
            .await?
            .ok_or_else(|| VaultError::PersistConfig(PERSIST_CONFIG_MESSAGE.to_string()))?;

        info!(version, "Stored secret");
        Ok(SetSecretResponse { version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_as_string() {
        assert_eq!(field_as_string(serde_json::json!("abc")), "abc");
        assert_eq!(field_as_string(serde_json::json!(42)), "42");
        assert_eq!(field_as_string(serde_json::json!(true)), "true");
    }

    #[test]
    fn test_ciphertext_detection() {
        assert!(TransitCipherClient::is_ciphertext("vault:v1:abcd"));
        assert!(!TransitCipherClient::is_ciphertext("plain"));
        assert!(!TransitCipherClient::is_ciphertext(""));
    }
}
