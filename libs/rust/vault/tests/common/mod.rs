//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use vault_credentials::secrets::DatabaseCredsResponse;
use vault_credentials::{ConnectionPool, VaultError, VaultOperations, VaultResult};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROLE_ID: &str = "7f3a0c2e-role";
pub const SECRET_ID: &str = "91bd44aa-secret";
pub const CLIENT_TOKEN: &str = "hvs.session-token";

/// Register an AppRole login at `auth/{mount}/login` issuing [`CLIENT_TOKEN`].
pub async fn mount_approle_login(server: &MockServer, mount: &str, lease_secs: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/auth/{mount}/login")))
        .and(body_json(json!({ "role_id": ROLE_ID, "secret_id": SECRET_ID })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {
                "client_token": CLIENT_TOKEN,
                "lease_duration": lease_secs,
                "renewable": true,
                "policies": ["default", "tessera"]
            }
        })))
        .mount(server)
        .await;
}

/// kv v2 engine and transit engine kept in memory.
///
/// Ciphertext is `vault:v1:` followed by the base64 plaintext, tagged with
/// the key so decrypting with the wrong key fails.
#[derive(Default)]
pub struct InMemoryVault {
    documents: Mutex<HashMap<String, Vec<BTreeMap<String, String>>>>,
    unversioned: bool,
    pub transit_calls: AtomicU32,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that accepts writes but reports no version.
    pub fn unversioned() -> Self {
        Self {
            unversioned: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, engine: &str, name: &str, fields: &[(&str, &str)]) {
        let document = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.documents
            .lock()
            .unwrap()
            .entry(format!("{engine}/{name}"))
            .or_default()
            .push(document);
    }

    pub fn raw(&self, engine: &str, name: &str, field: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap()
            .get(&format!("{engine}/{name}"))
            .and_then(|versions| versions.last())
            .and_then(|document| document.get(field).cloned())
    }
}

#[async_trait]
impl VaultOperations for InMemoryVault {
    async fn read_versioned(
        &self,
        engine: &str,
        name: &str,
        version: Option<u32>,
    ) -> VaultResult<Option<BTreeMap<String, serde_json::Value>>> {
        let documents = self.documents.lock().unwrap();
        let Some(versions) = documents.get(&format!("{engine}/{name}")) else {
            return Ok(None);
        };
        let document = match version {
            Some(v) if v > 0 => versions.get(v as usize - 1),
            _ => versions.last(),
        };
        Ok(document.map(|d| {
            d.iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect()
        }))
    }

    async fn write_versioned(
        &self,
        engine: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> VaultResult<Option<u32>> {
        let mut documents = self.documents.lock().unwrap();
        let versions = documents.entry(format!("{engine}/{name}")).or_default();
        versions.push(data.clone());
        if self.unversioned {
            return Ok(None);
        }
        Ok(Some(u32::try_from(versions.len()).unwrap()))
    }

    async fn transit_encrypt(
        &self,
        _engine: &str,
        key: &str,
        plaintext: &str,
    ) -> VaultResult<String> {
        self.transit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("vault:v1:{key}:{}", BASE64.encode(plaintext)))
    }

    async fn transit_decrypt(
        &self,
        _engine: &str,
        key: &str,
        ciphertext: &str,
    ) -> VaultResult<String> {
        self.transit_calls.fetch_add(1, Ordering::SeqCst);
        let encoded = ciphertext
            .strip_prefix(&format!("vault:v1:{key}:"))
            .ok_or_else(|| {
                VaultError::UnexpectedResponse("cipher: message authentication failed".into())
            })?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::UnexpectedResponse(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| VaultError::UnexpectedResponse(e.to_string()))
    }

    async fn read_db_credentials(&self, _path: &str) -> VaultResult<Option<DatabaseCredsResponse>> {
        Ok(None)
    }
}

/// Pool that records what it was given.
#[derive(Default)]
pub struct RecordingPool {
    pub username: Mutex<String>,
    pub password: Mutex<String>,
    pub evictions: AtomicU32,
    pub reject_password: std::sync::atomic::AtomicBool,
}

impl RecordingPool {
    pub fn with_username(username: &str) -> Self {
        Self {
            username: Mutex::new(username.to_string()),
            ..Self::default()
        }
    }

    pub fn username(&self) -> String {
        self.username.lock().unwrap().clone()
    }

    pub fn password(&self) -> String {
        self.password.lock().unwrap().clone()
    }
}

impl ConnectionPool for RecordingPool {
    fn set_username(&self, username: &str) -> anyhow::Result<()> {
        *self.username.lock().unwrap() = username.to_string();
        Ok(())
    }

    fn set_password(&self, password: &SecretString) -> anyhow::Result<()> {
        if self.reject_password.load(Ordering::SeqCst) {
            anyhow::bail!("pool is closed");
        }
        *self.password.lock().unwrap() = password.expose_secret().to_string();
        Ok(())
    }

    fn soft_evict_idle_connections(&self) -> anyhow::Result<()> {
        self.evictions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
