//! Vault client configuration.
//!
//! Two shapes are supported. [`VaultConfig`] describes a key vault used for
//! secret storage; [`DbCredentialsConfig`] describes the database credential
//! source together with the rotation tunables. Both deserialize from
//! camelCase documents and can be loaded from `VAULT_*` environment variables.

use crate::env::{EnvironmentVariableProvider, SystemEnvironment};
use crate::error::{VaultError, VaultResult};
use rust_common::TlsConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default AppRole mount path.
pub const DEFAULT_APPROLE_PATH: &str = "approle";
/// Default database secret engine.
pub const DEFAULT_DB_SECRET_ENGINE_NAME: &str = "database";
/// Default credential type.
pub const DEFAULT_CREDENTIAL_TYPE: &str = "static";

const DB_CREDENTIALS_SECTION: &str = "jdbc.hashicorpVaultDbCredentialsConfig";

/// Connection settings for a Vault server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Vault server address
    pub url: String,
    /// Enterprise namespace sent as `X-Vault-Namespace`
    #[serde(default)]
    pub namespace: Option<String>,
    /// AppRole auth mount path
    #[serde(default = "default_approle_path")]
    pub approle_path: String,
    /// PEM file with client key and certificate
    #[serde(default)]
    pub tls_key_store_path: Option<PathBuf>,
    /// PEM bundle of trusted CAs
    #[serde(default)]
    pub tls_trust_store_path: Option<PathBuf>,
}

fn default_approle_path() -> String {
    DEFAULT_APPROLE_PATH.to_string()
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: None,
            approle_path: default_approle_path(),
            tls_key_store_path: None,
            tls_trust_store_path: None,
        }
    }

    /// Set namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set AppRole mount path.
    #[must_use]
    pub fn with_approle_path(mut self, path: impl Into<String>) -> Self {
        self.approle_path = path.into();
        self
    }

    /// Set TLS material.
    #[must_use]
    pub fn with_tls(
        mut self,
        key_store: Option<PathBuf>,
        trust_store: Option<PathBuf>,
    ) -> Self {
        self.tls_key_store_path = key_store;
        self.tls_trust_store_path = trust_store;
        self
    }

    /// Namespace, ignoring empty values.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// TLS material derived from the configured paths.
    ///
    /// A client identity is only used when a trust store is also configured.
    #[must_use]
    pub fn tls(&self) -> TlsConfig {
        match (&self.tls_key_store_path, &self.tls_trust_store_path) {
            (Some(identity), Some(trust)) => TlsConfig::mutual(identity, trust),
            (None, Some(trust)) => TlsConfig::for_trust_store(trust),
            _ => TlsConfig::unconfigured(),
        }
    }

    /// Load from `VAULT_*` variables after reading a `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `VAULT_URL` is unset.
    pub fn from_env() -> VaultResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_env_provider(&SystemEnvironment)
    }

    /// Load from the given environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `VAULT_URL` is unset.
    pub fn from_env_provider(env: &dyn EnvironmentVariableProvider) -> VaultResult<Self> {
        let url = env
            .get_env("VAULT_URL")
            .ok_or_else(|| VaultError::config("VAULT_URL must be set"))?;
        Ok(Self {
            url,
            namespace: env.get_env("VAULT_NAMESPACE"),
            approle_path: env
                .get_env("VAULT_APPROLE_PATH")
                .unwrap_or_else(default_approle_path),
            tls_key_store_path: env.get_env("VAULT_TLS_KEY_STORE_PATH").map(PathBuf::from),
            tls_trust_store_path: env.get_env("VAULT_TLS_TRUST_STORE_PATH").map(PathBuf::from),
        })
    }
}

/// Raw rotation tunables, validated by the lifecycle manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationTunables {
    /// Base retry delay after a failed rotation
    #[serde(default)]
    pub retry_delay_in_seconds: Option<String>,
    /// Upper bound for the retry delay
    #[serde(default)]
    pub max_retry_delay_in_seconds: Option<String>,
    /// Floor for the delay between successful rotations
    #[serde(default)]
    pub min_delay_before_next_run_in_seconds: Option<String>,
    /// Share of the lease kept as head-room before expiry
    #[serde(default)]
    pub delay_before_next_run_factor: Option<String>,
    /// Upper bound for that head-room
    #[serde(default)]
    pub max_duration_before_ttl_expire_in_seconds: Option<String>,
}

/// Database credential source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCredentialsConfig {
    /// Vault server address
    #[serde(default)]
    pub url: Option<String>,
    /// Enterprise namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// AppRole auth mount path
    #[serde(default)]
    pub approle_path: Option<String>,
    /// Database secret engine mount
    #[serde(default)]
    pub db_secret_engine_name: Option<String>,
    /// Database role to request credentials for
    #[serde(default)]
    pub vault_db_role: Option<String>,
    /// `dynamic` or `static`
    #[serde(default)]
    pub credential_type: Option<String>,
    /// PEM file with client key and certificate
    #[serde(default)]
    pub tls_key_store_path: Option<PathBuf>,
    /// PEM bundle of trusted CAs
    #[serde(default)]
    pub tls_trust_store_path: Option<PathBuf>,
    /// Rotation tunables
    #[serde(flatten)]
    pub tunables: RotationTunables,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl DbCredentialsConfig {
    /// Database secret engine, defaulting to `database`.
    #[must_use]
    pub fn db_secret_engine_name(&self) -> &str {
        self.db_secret_engine_name
            .as_deref()
            .unwrap_or(DEFAULT_DB_SECRET_ENGINE_NAME)
    }

    /// AppRole mount path, defaulting to `approle`.
    #[must_use]
    pub fn approle_path(&self) -> &str {
        self.approle_path.as_deref().unwrap_or(DEFAULT_APPROLE_PATH)
    }

    /// Credential type, defaulting to `static`.
    #[must_use]
    pub fn credential_type(&self) -> &str {
        present(self.credential_type.as_ref()).unwrap_or(DEFAULT_CREDENTIAL_TYPE)
    }

    /// Path segment under the database engine.
    #[must_use]
    pub fn credential_path(&self) -> &'static str {
        if self.credential_type() == "dynamic" {
            "creds"
        } else {
            "static-creds"
        }
    }

    /// Check that every required property is present, reporting all missing
    /// ones at once.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Configuration`] naming each missing property.
    pub fn validate_required_properties(&self) -> VaultResult<()> {
        let db_secret_engine_name = self.db_secret_engine_name().to_string();
        let approle_path = self.approle_path().to_string();
        let required = [
            ("url", self.url.as_ref()),
            ("dbSecretEngineName", Some(&db_secret_engine_name)),
            ("vaultDbRole", self.vault_db_role.as_ref()),
            ("approlePath", Some(&approle_path)),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| present(*value).is_none())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(VaultError::config(format!(
            "[{}] missing in the configuration. This/these properties should be defined in configuration section: {DB_CREDENTIALS_SECTION}",
            missing.join(", ")
        )))
    }

    /// Connection settings for the Vault server.
    ///
    /// # Errors
    ///
    /// Returns an error if required properties are missing.
    pub fn to_vault_config(&self) -> VaultResult<VaultConfig> {
        self.validate_required_properties()?;
        Ok(VaultConfig {
            url: self.url.clone().unwrap_or_default(),
            namespace: self.namespace.clone(),
            approle_path: self.approle_path().to_string(),
            tls_key_store_path: self.tls_key_store_path.clone(),
            tls_trust_store_path: self.tls_trust_store_path.clone(),
        })
    }

    /// Role credentials are requested for.
    #[must_use]
    pub fn vault_db_role(&self) -> &str {
        self.vault_db_role.as_deref().unwrap_or_default()
    }

    /// Load from `VAULT_*` variables after reading a `.env` file if present.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env_provider(&SystemEnvironment)
    }

    /// Load from the given environment. Validation happens later so that
    /// every problem is reported together.
    #[must_use]
    pub fn from_env_provider(env: &dyn EnvironmentVariableProvider) -> Self {
        Self {
            url: env.get_env("VAULT_URL"),
            namespace: env.get_env("VAULT_NAMESPACE"),
            approle_path: env.get_env("VAULT_APPROLE_PATH"),
            db_secret_engine_name: env.get_env("VAULT_DB_SECRET_ENGINE_NAME"),
            vault_db_role: env.get_env("VAULT_DB_ROLE"),
            credential_type: env.get_env("VAULT_DB_CREDENTIAL_TYPE"),
            tls_key_store_path: env.get_env("VAULT_TLS_KEY_STORE_PATH").map(PathBuf::from),
            tls_trust_store_path: env.get_env("VAULT_TLS_TRUST_STORE_PATH").map(PathBuf::from),
            tunables: RotationTunables {
                retry_delay_in_seconds: env.get_env("VAULT_DB_RETRY_DELAY_IN_SECONDS"),
                max_retry_delay_in_seconds: env.get_env("VAULT_DB_MAX_RETRY_DELAY_IN_SECONDS"),
                min_delay_before_next_run_in_seconds: env
                    .get_env("VAULT_DB_MIN_DELAY_BEFORE_NEXT_RUN_IN_SECONDS"),
                delay_before_next_run_factor: env.get_env("VAULT_DB_DELAY_BEFORE_NEXT_RUN_FACTOR"),
                max_duration_before_ttl_expire_in_seconds: env
                    .get_env("VAULT_DB_MAX_DURATION_BEFORE_TTL_EXPIRE_IN_SECONDS"),
            },
        }
    }
}
