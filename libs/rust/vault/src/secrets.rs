//! Secret types and structures.
//!
//! Domain types for addressing and carrying secrets, followed by the wire
//! shapes of the Vault HTTP API responses.

use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property key for the secret version.
pub const SECRET_VERSION_KEY: &str = "secretVersion";
/// Property key for the field id inside a document.
pub const SECRET_ID_KEY: &str = "secretId";
/// Property key for the document name.
pub const SECRET_NAME_KEY: &str = "secretName";
/// Property key for the kv engine.
pub const SECRET_ENGINE_NAME_KEY: &str = "secretEngineName";
/// Property key for the transit engine.
pub const TRANSIT_SECRET_ENGINE_NAME_KEY: &str = "transitSecretEngineName";
/// Property key for the transit key.
pub const TRANSIT_KEY_NAME_KEY: &str = "transitKeyName";

/// Marker prefix of transit ciphertext.
pub const CIPHERTEXT_PREFIX: &str = "vault:v";

/// Routing keys that are never written into a document.
pub const EXCLUDED_FROM_PAYLOAD: [&str; 5] = [
    SECRET_NAME_KEY,
    SECRET_ID_KEY,
    SECRET_ENGINE_NAME_KEY,
    TRANSIT_SECRET_ENGINE_NAME_KEY,
    TRANSIT_KEY_NAME_KEY,
];

/// Address of a secret field, with optional transit settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    /// kv v2 engine mount
    pub engine_name: String,
    /// Document name within the engine
    pub secret_name: String,
    /// Field within the document
    pub secret_id: String,
    /// Version to read; `None` or `Some(0)` reads the latest
    pub version: Option<u32>,
    /// Transit engine mount
    pub transit_engine_name: Option<String>,
    /// Transit key name
    pub transit_key_name: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl SecretReference {
    /// Reference to the latest version of a field.
    #[must_use]
    pub fn new(
        engine_name: impl Into<String>,
        secret_name: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        Self {
            engine_name: engine_name.into(),
            secret_name: secret_name.into(),
            secret_id: secret_id.into(),
            version: None,
            transit_engine_name: None,
            transit_key_name: None,
        }
    }

    /// Pin a version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Route values through a transit key.
    #[must_use]
    pub fn with_transit(mut self, engine: impl Into<String>, key: impl Into<String>) -> Self {
        self.transit_engine_name = Some(engine.into());
        self.transit_key_name = Some(key.into());
        self
    }

    /// Transit engine and key when both are configured.
    #[must_use]
    pub fn transit(&self) -> Option<(&str, &str)> {
        non_empty(self.transit_engine_name.as_ref())
            .zip(non_empty(self.transit_key_name.as_ref()))
    }

    /// Names of the transit properties that are not configured, engine first.
    #[must_use]
    pub fn missing_transit_properties(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if non_empty(self.transit_engine_name.as_ref()).is_none() {
            missing.push(TRANSIT_SECRET_ENGINE_NAME_KEY.to_string());
        }
        if non_empty(self.transit_key_name.as_ref()).is_none() {
            missing.push(TRANSIT_KEY_NAME_KEY.to_string());
        }
        missing
    }

    /// Document path `engine/name` used in messages.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}/{}", self.engine_name, self.secret_name)
    }

    /// Parse a flat property map as used by key configuration files.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or document name is missing, or the
    /// version is not a number.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> VaultResult<Self> {
        let required = |key: &str| {
            properties
                .get(key)
                .cloned()
                .ok_or_else(|| VaultError::config(format!("{key} must be provided")))
        };

        let version = properties
            .get(SECRET_VERSION_KEY)
            .map(|v| {
                v.parse::<u32>().map_err(|e| {
                    VaultError::config(format!("Invalid {SECRET_VERSION_KEY} \"{v}\": {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            engine_name: required(SECRET_ENGINE_NAME_KEY)?,
            secret_name: required(SECRET_NAME_KEY)?,
            secret_id: properties.get(SECRET_ID_KEY).cloned().unwrap_or_default(),
            version,
            transit_engine_name: properties.get(TRANSIT_SECRET_ENGINE_NAME_KEY).cloned(),
            transit_key_name: properties.get(TRANSIT_KEY_NAME_KEY).cloned(),
        })
    }
}

/// Field name to value mapping stored as one document version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretDocument {
    fields: BTreeMap<String, String>,
}

impl SecretDocument {
    /// Empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields that belong in the stored document, routing keys removed.
    pub fn payload(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(name, _)| !EXCLUDED_FROM_PAYLOAD.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SecretDocument {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSecretResponse {
    /// Version created by the write
    pub version: u32,
}

impl SetSecretResponse {
    /// Flat property view, `{"version": "<n>"}`.
    #[must_use]
    pub fn properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("version".to_string(), self.version.to_string())])
    }
}

/// Vault auth response
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Auth block
    pub auth: AuthData,
}

/// Token issued by an auth method.
#[derive(Debug, Deserialize)]
pub struct AuthData {
    /// Token value
    pub client_token: String,
    /// Token lease in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token may be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Policies attached to the token
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Vault KV v2 read response wrapper
#[derive(Debug, Deserialize)]
pub struct KvReadResponse {
    /// Versioned payload, absent when nothing is stored
    #[serde(default)]
    pub data: Option<KvData>,
}

/// Versioned document and its metadata.
#[derive(Debug, Deserialize)]
pub struct KvData {
    /// Document fields, null for deleted versions
    #[serde(default)]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
    /// Version metadata
    #[serde(default)]
    pub metadata: Option<KvMetadata>,
}

/// Vault KV v2 version metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct KvMetadata {
    /// Creation time of the version
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    /// Empty unless the version was deleted
    #[serde(default)]
    pub deletion_time: String,
    /// Whether the version was destroyed
    #[serde(default)]
    pub destroyed: bool,
    /// Version number
    #[serde(default)]
    pub version: Option<u32>,
}

/// Vault KV v2 write response wrapper
#[derive(Debug, Deserialize)]
pub struct KvWriteResponse {
    /// Metadata of the created version
    #[serde(default)]
    pub data: Option<KvMetadata>,
}

/// Vault transit response wrapper
#[derive(Debug, Deserialize)]
pub struct TransitResponse {
    /// Result block
    pub data: TransitData,
}

/// Transit encrypt or decrypt result.
#[derive(Debug, Deserialize)]
pub struct TransitData {
    /// Present on encrypt
    #[serde(default)]
    pub ciphertext: Option<String>,
    /// Base64 plaintext, present on decrypt
    #[serde(default)]
    pub plaintext: Option<String>,
}

/// Vault database credentials response
#[derive(Debug, Deserialize)]
pub struct DatabaseCredsResponse {
    /// Credential payload
    #[serde(default)]
    pub data: Option<DatabaseCredsData>,
    /// Lease id, empty for static roles
    #[serde(default)]
    pub lease_id: String,
    /// Lease in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease may be renewed
    #[serde(default)]
    pub renewable: bool,
}

/// Database username and password.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredsData {
    /// Database user
    pub username: String,
    /// Database password
    pub password: String,
    /// Remaining validity in seconds, reported by static roles
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// `sys/init` response.
#[derive(Debug, Deserialize)]
pub struct InitResponse {
    /// Initial root token
    pub root_token: String,
    /// Unseal keys, base64
    #[serde(default)]
    pub keys_base64: Vec<String>,
}

/// `sys/unseal` response.
#[derive(Debug, Deserialize)]
pub struct UnsealResponse {
    /// Whether the server is still sealed
    pub sealed: bool,
    /// Keys required
    #[serde(default)]
    pub t: u32,
    /// Keys supplied so far
    #[serde(default)]
    pub progress: u32,
}

/// `sys/health` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// Whether the server is initialised
    #[serde(default)]
    pub initialized: bool,
    /// Whether the server is sealed
    #[serde(default)]
    pub sealed: bool,
    /// Whether the node is a standby
    #[serde(default)]
    pub standby: bool,
    /// Server version
    #[serde(default)]
    pub version: String,
}

/// AppRole role id response.
#[derive(Debug, Deserialize)]
pub struct RoleIdResponse {
    /// Payload
    pub data: RoleIdData,
}

/// AppRole role id.
#[derive(Debug, Deserialize)]
pub struct RoleIdData {
    /// Role id
    pub role_id: String,
}

/// AppRole secret id response.
#[derive(Debug, Deserialize)]
pub struct SecretIdResponse {
    /// Payload
    pub data: SecretIdData,
}

/// AppRole secret id.
#[derive(Debug, Deserialize)]
pub struct SecretIdData {
    /// Secret id
    pub secret_id: String,
    /// Accessor for the secret id
    #[serde(default)]
    pub secret_id_accessor: String,
}
