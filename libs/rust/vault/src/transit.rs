//! Transit engine encryption.
//!
//! Stateless: every call is one round trip and nothing is cached.

use crate::client::VaultOperations;
use crate::error::VaultResult;
use crate::secrets::CIPHERTEXT_PREFIX;
use std::sync::Arc;
use tracing::info;

/// Encrypts and decrypts values with a named transit key.
#[derive(Clone)]
pub struct TransitCipherClient {
    backend: Arc<dyn VaultOperations>,
}

impl TransitCipherClient {
    /// Create a client over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn VaultOperations>) -> Self {
        Self { backend }
    }

    /// Whether a stored value is transit ciphertext.
    #[must_use]
    pub fn is_ciphertext(value: &str) -> bool {
        value.starts_with(CIPHERTEXT_PREFIX)
    }

    /// Encrypt `plaintext` with `key` on the transit engine `engine`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn encrypt(&self, engine: &str, key: &str, plaintext: &str) -> VaultResult<String> {
        let ciphertext = self.backend.transit_encrypt(engine, key, plaintext).await?;
        info!(engine, key, "Encrypted value with transit key");
        Ok(ciphertext)
    }

    /// Decrypt `ciphertext` with `key` on the transit engine `engine`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn decrypt(&self, engine: &str, key: &str, ciphertext: &str) -> VaultResult<String> {
        let plaintext = self.backend.transit_decrypt(engine, key, ciphertext).await?;
        info!(engine, key, "Decrypted value with transit key");
        Ok(plaintext)
    }
}
