//! Vault HTTP client.
//!
//! [`VaultEndpoint`] owns the transport concerns shared by every caller
//! (address, namespace header, status mapping). [`VaultClient`] adds session
//! authentication on top and implements [`VaultOperations`], the narrow seam
//! the services are written against.

use crate::{
    error::{VaultError, VaultResult},
    secrets::{DatabaseCredsResponse, KvReadResponse, KvWriteResponse, TransitResponse},
    session::SessionManager,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Address, namespace and HTTP client of a Vault server.
#[derive(Debug, Clone)]
pub struct VaultEndpoint {
    http: Client,
    addr: String,
    namespace: Option<String>,
}

impl VaultEndpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(http: Client, addr: impl Into<String>, namespace: Option<String>) -> Self {
        let addr = addr.into().trim_end_matches('/').to_string();
        Self {
            http,
            addr,
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }

    /// Server address without trailing slash.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Full URL of an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str, token: Option<&SecretString>) -> RequestBuilder {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        request
    }

    /// Send a request and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unavailable`] if the request could not be sent.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Response> {
        let mut request = self.request(method, path, token);
        if let Some(b) = body {
            request = request.json(b);
        }
        request
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))
    }

    /// Send a request and decode the JSON body.
    ///
    /// `404` and `204` yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Maps `403`, `429`, `5xx` and other failures to the matching error.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Option<T>> {
        let response = self.send(method, path, token, body).await?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            StatusCode::FORBIDDEN => return Err(VaultError::PermissionDenied(path.to_string())),
            StatusCode::TOO_MANY_REQUESTS => return Err(VaultError::RateLimited),
            s if s.is_server_error() => {
                let text = response.text().await.unwrap_or_default();
                return Err(VaultError::unavailable(format!("Status {status}: {text}")));
            }
            s if !s.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(VaultError::UnexpectedResponse(format!(
                    "Status {status}: {text}"
                )));
            }
            _ => {}
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// Backend calls the services depend on.
#[async_trait]
pub trait VaultOperations: Send + Sync {
    /// Read a kv v2 document; `None` when nothing is stored.
    async fn read_versioned(
        &self,
        engine: &str,
        name: &str,
        version: Option<u32>,
    ) -> VaultResult<Option<BTreeMap<String, serde_json::Value>>>;

    /// Write a kv v2 document; `None` when the response had no version.
    async fn write_versioned(
        &self,
        engine: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> VaultResult<Option<u32>>;

    /// Encrypt with a transit key.
    async fn transit_encrypt(
        &self,
        engine: &str,
        key: &str,
        plaintext: &str,
    ) -> VaultResult<String>;

    /// Decrypt with a transit key.
    async fn transit_decrypt(
        &self,
        engine: &str,
        key: &str,
        ciphertext: &str,
    ) -> VaultResult<String>;

    /// Read database credentials at `path`; `None` when nothing came back.
    async fn read_db_credentials(&self, path: &str) -> VaultResult<Option<DatabaseCredsResponse>>;
}

/// Vault client authenticating every call through the session manager.
pub struct VaultClient {
    endpoint: VaultEndpoint,
    session: Arc<SessionManager>,
}

impl VaultClient {
    /// Create a new Vault client.
    #[must_use]
    pub const fn new(endpoint: VaultEndpoint, session: Arc<SessionManager>) -> Self {
        Self { endpoint, session }
    }

    /// Endpoint the client talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &VaultEndpoint {
        &self.endpoint
    }

    /// Session manager shared with other clients.
    #[must_use]
    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> VaultResult<Option<T>> {
        let token = self.session.get_session_token().await?;
        self.endpoint
            .send_json(method, path, Some(token.value()), body)
            .await
    }
}

#[async_trait]
impl VaultOperations for VaultClient {
    #[instrument(skip(self))]
    async fn read_versioned(
        &self,
        engine: &str,
        name: &str,
        version: Option<u32>,
    ) -> VaultResult<Option<BTreeMap<String, serde_json::Value>>> {
        let path = match version {
            Some(v) if v > 0 => format!("{engine}/data/{name}?version={v}"),
            _ => format!("{engine}/data/{name}"),
        };
        debug!(path, "Reading versioned secret");

        let response: Option<KvReadResponse> = self.request(Method::GET, &path, None).await?;
        Ok(response.and_then(|r| r.data).and_then(|d| d.data))
    }

    #[instrument(skip(self, data), fields(fields = data.len()))]
    async fn write_versioned(
        &self,
        engine: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> VaultResult<Option<u32>> {
        let path = format!("{engine}/data/{name}");
        let body = serde_json::json!({ "data": data });

        let response: Option<KvWriteResponse> =
            self.request(Method::POST, &path, Some(&body)).await?;
        Ok(response.and_then(|r| r.data).and_then(|m| m.version))
    }

    #[instrument(skip(self, plaintext))]
    async fn transit_encrypt(
        &self,
        engine: &str,
        key: &str,
        plaintext: &str,
    ) -> VaultResult<String> {
        let body = serde_json::json!({ "plaintext": BASE64.encode(plaintext) });
        let response: Option<TransitResponse> = self
            .request(Method::POST, &format!("{engine}/encrypt/{key}"), Some(&body))
            .await?;

        response.and_then(|r| r.data.ciphertext).ok_or_else(|| {
            VaultError::UnexpectedResponse("transit encrypt returned no ciphertext".into())
        })
    }

    #[instrument(skip(self, ciphertext))]
    async fn transit_decrypt(
        &self,
        engine: &str,
        key: &str,
        ciphertext: &str,
    ) -> VaultResult<String> {
        let body = serde_json::json!({ "ciphertext": ciphertext });
        let response: Option<TransitResponse> = self
            .request(Method::POST, &format!("{engine}/decrypt/{key}"), Some(&body))
            .await?;

        let encoded = response.and_then(|r| r.data.plaintext).ok_or_else(|| {
            VaultError::UnexpectedResponse("transit decrypt returned no plaintext".into())
        })?;
        let bytes = BASE64.decode(encoded).map_err(|e| {
            VaultError::UnexpectedResponse(format!("transit plaintext is not base64: {e}"))
        })?;
        String::from_utf8(bytes).map_err(|e| {
            VaultError::UnexpectedResponse(format!("transit plaintext is not UTF-8: {e}"))
        })
    }

    #[instrument(skip(self))]
    async fn read_db_credentials(&self, path: &str) -> VaultResult<Option<DatabaseCredsResponse>> {
        self.request(Method::GET, path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_normalisation() {
        let endpoint = VaultEndpoint::new(Client::new(), "https://vault:8200/", None);
        assert_eq!(endpoint.addr(), "https://vault:8200");
        assert_eq!(endpoint.url("/sys/health"), "https://vault:8200/v1/sys/health");
        assert_eq!(
            endpoint.url("kv/data/node"),
            "https://vault:8200/v1/kv/data/node"
        );
    }

    #[test]
    fn test_empty_namespace_dropped() {
        let endpoint = VaultEndpoint::new(Client::new(), "https://vault", Some(String::new()));
        assert!(endpoint.namespace.is_none());
    }
}
