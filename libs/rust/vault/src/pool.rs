//! Connection pool hand-off.
//!
//! The pool itself belongs to the caller. This module only needs to push
//! rotated credentials into it and to build it from the first lease.

use crate::lifecycle::{DbCredentialsVaultLifecycleManager, RotationSettings};
use crate::provider::{DatabaseCredentialProvider, DbCredentials};
use anyhow::Context as _;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

/// Pool whose credentials can be replaced while it is running.
pub trait ConnectionPool: Send + Sync {
    /// Username for new connections.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn set_username(&self, username: &str) -> anyhow::Result<()>;

    /// Password for new connections.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn set_password(&self, password: &SecretString) -> anyhow::Result<()>;

    /// Retire idle connections so they reconnect with the new credentials.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn soft_evict_idle_connections(&self) -> anyhow::Result<()>;
}

/// A pool kept supplied with credentials for as long as the handle lives.
pub struct VaultBackedPool<P: ConnectionPool> {
    pool: Arc<P>,
    lifecycle: DbCredentialsVaultLifecycleManager,
}

impl<P: ConnectionPool + 'static> VaultBackedPool<P> {
    /// Fetch the first credentials, build the pool with them and start
    /// rotation before that lease expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial credentials cannot be read or the
    /// pool cannot be built.
    pub async fn create<F>(
        provider: Arc<dyn DatabaseCredentialProvider>,
        settings: RotationSettings,
        build: F,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce(&DbCredentials) -> anyhow::Result<P>,
    {
        let credentials = provider
            .get_db_credentials()
            .await
            .context("Unable to read initial database credentials")?;
        let pool = Arc::new(build(&credentials).context("Unable to build connection pool")?);

        let lifecycle = DbCredentialsVaultLifecycleManager::new(
            provider,
            Arc::clone(&pool) as Arc<dyn ConnectionPool>,
            settings,
        );
        lifecycle.start(credentials.lease_duration_secs);
        info!(
            username = %credentials.username,
            lease_duration_secs = credentials.lease_duration_secs,
            "Connection pool created with database credentials from vault"
        );

        Ok(Self { pool, lifecycle })
    }

    /// The pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// The rotation manager driving the pool.
    #[must_use]
    pub const fn lifecycle(&self) -> &DbCredentialsVaultLifecycleManager {
        &self.lifecycle
    }

    /// Stop rotation and wait for the task to finish.
    pub async fn shutdown(&self) {
        self.lifecycle.stop();
        self.lifecycle.wait().await;
    }
}
