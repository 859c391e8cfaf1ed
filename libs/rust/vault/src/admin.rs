//! Server administration: initialise, unseal, health, mounts and AppRole
//! provisioning.
//!
//! These calls take an explicit token instead of going through the session
//! manager, since they run before any application credentials exist.

use crate::client::VaultEndpoint;
use crate::error::{VaultError, VaultResult};
use crate::secrets::{
    HealthResponse, InitResponse, RoleIdResponse, SecretIdResponse, UnsealResponse,
};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{info, instrument};

/// Server state reported by `sys/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Initialised, unsealed and active
    Active,
    /// Unsealed standby
    Standby,
    /// Disaster recovery secondary
    DrSecondary,
    /// Performance standby
    PerformanceStandby,
    /// Not initialised
    NotInitialized,
    /// Sealed
    Sealed,
    /// Any other status code
    Unknown(u16),
}

impl From<u16> for HealthStatus {
    fn from(status: u16) -> Self {
        match status {
            200 => Self::Active,
            429 => Self::Standby,
            472 => Self::DrSecondary,
            473 => Self::PerformanceStandby,
            501 => Self::NotInitialized,
            503 => Self::Sealed,
            other => Self::Unknown(other),
        }
    }
}

impl HealthStatus {
    /// Whether the node can serve reads.
    #[must_use]
    pub const fn is_serving(self) -> bool {
        matches!(self, Self::Active | Self::Standby | Self::PerformanceStandby)
    }
}

/// Health status with the body, when the server sent one.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Status derived from the HTTP code
    pub status: HealthStatus,
    /// Parsed body
    pub details: Option<HealthResponse>,
}

/// Administrative client.
pub struct VaultAdmin {
    endpoint: VaultEndpoint,
}

impl VaultAdmin {
    /// Create an admin client.
    #[must_use]
    pub const fn new(endpoint: VaultEndpoint) -> Self {
        Self { endpoint }
    }

    /// Initialise the server.
    ///
    /// # Errors
    ///
    /// Fails if the server is already initialised or unreachable.
    #[instrument(skip(self))]
    pub async fn init(&self, shares: u32, threshold: u32) -> VaultResult<InitResponse> {
        let body = json!({ "secret_shares": shares, "secret_threshold": threshold });
        let response = self
            .endpoint
            .send_json(Method::PUT, "sys/init", None, Some(&body))
            .await?
            .ok_or_else(|| VaultError::UnexpectedResponse("sys/init returned no body".into()))?;
        info!(shares, threshold, "Vault initialised");
        Ok(response)
    }

    /// Submit one unseal key.
    ///
    /// # Errors
    ///
    /// Fails if the key is rejected or the server is unreachable.
    #[instrument(skip_all)]
    pub async fn unseal(&self, key: &SecretString) -> VaultResult<UnsealResponse> {
        let body = json!({ "key": key.expose_secret() });
        let response: UnsealResponse = self
            .endpoint
            .send_json(Method::PUT, "sys/unseal", None, Some(&body))
            .await?
            .ok_or_else(|| VaultError::UnexpectedResponse("sys/unseal returned no body".into()))?;
        info!(sealed = response.sealed, progress = response.progress, "Unseal key submitted");
        Ok(response)
    }

    /// Query `sys/health`. Standby and sealed states are reported, not
    /// treated as errors.
    ///
    /// # Errors
    ///
    /// Fails only if the server is unreachable.
    #[instrument(skip(self))]
    pub async fn health(&self) -> VaultResult<HealthReport> {
        let response = self.endpoint.send(Method::GET, "sys/health", None, None).await?;
        let status = HealthStatus::from(response.status().as_u16());
        let details = response.json::<HealthResponse>().await.ok();
        Ok(HealthReport { status, details })
    }

    /// Mount a secret engine at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the mount is rejected.
    #[instrument(skip(self, token, options))]
    pub async fn mount(
        &self,
        token: &SecretString,
        path: &str,
        engine_type: &str,
        options: Option<serde_json::Value>,
    ) -> VaultResult<()> {
        let mut body = json!({ "type": engine_type });
        if let Some(options) = options {
            body["options"] = options;
        }
        self.endpoint
            .send_json::<serde_json::Value>(
                Method::POST,
                &format!("sys/mounts/{path}"),
                Some(token),
                Some(&body),
            )
            .await?;
        info!(path, engine_type, "Secret engine mounted");
        Ok(())
    }

    /// Enable an auth method at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the request is rejected.
    #[instrument(skip(self, token))]
    pub async fn enable_auth(
        &self,
        token: &SecretString,
        path: &str,
        method: &str,
    ) -> VaultResult<()> {
        let body = json!({ "type": method });
        self.endpoint
            .send_json::<serde_json::Value>(
                Method::POST,
                &format!("sys/auth/{path}"),
                Some(token),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    /// Create a transit key.
    ///
    /// # Errors
    ///
    /// Fails if the request is rejected.
    #[instrument(skip(self, token))]
    pub async fn create_transit_key(
        &self,
        token: &SecretString,
        engine: &str,
        key: &str,
    ) -> VaultResult<()> {
        self.endpoint
            .send_json::<serde_json::Value>(
                Method::POST,
                &format!("{engine}/keys/{key}"),
                Some(token),
                None,
            )
            .await?;
        Ok(())
    }

    /// Role id of an AppRole role.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::SecretNotFound`] if the role does not exist.
    #[instrument(skip(self, token))]
    pub async fn approle_role_id(
        &self,
        token: &SecretString,
        path: &str,
        role: &str,
    ) -> VaultResult<SecretString> {
        let location = format!("auth/{path}/role/{role}/role-id");
        let response: RoleIdResponse = self
            .endpoint
            .send_json(Method::GET, &location, Some(token), None)
            .await?
            .ok_or_else(|| VaultError::not_found(format!("No role found at {location}")))?;
        Ok(SecretString::from(response.data.role_id))
    }

    /// Generate a new secret id for an AppRole role.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::SecretNotFound`] if the role does not exist.
    #[instrument(skip(self, token))]
    pub async fn approle_secret_id(
        &self,
        token: &SecretString,
        path: &str,
        role: &str,
    ) -> VaultResult<SecretString> {
        let location = format!("auth/{path}/role/{role}/secret-id");
        let response: SecretIdResponse = self
            .endpoint
            .send_json(Method::POST, &location, Some(token), None)
            .await?
            .ok_or_else(|| VaultError::not_found(format!("No role found at {location}")))?;
        Ok(SecretString::from(response.data.secret_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_codes() {
        assert_eq!(HealthStatus::from(200), HealthStatus::Active);
        assert_eq!(HealthStatus::from(429), HealthStatus::Standby);
        assert_eq!(HealthStatus::from(472), HealthStatus::DrSecondary);
        assert_eq!(HealthStatus::from(473), HealthStatus::PerformanceStandby);
        assert_eq!(HealthStatus::from(501), HealthStatus::NotInitialized);
        assert_eq!(HealthStatus::from(503), HealthStatus::Sealed);
        assert_eq!(HealthStatus::from(418), HealthStatus::Unknown(418));
    }

    #[test]
    fn test_serving_states() {
        assert!(HealthStatus::Active.is_serving());
        assert!(HealthStatus::PerformanceStandby.is_serving());
        assert!(!HealthStatus::Sealed.is_serving());
        assert!(!HealthStatus::NotInitialized.is_serving());
    }
}
