//! Authentication methods.
//!
//! Exactly one method is resolved from the environment: an AppRole
//! role-id/secret-id pair, or a static token.

use crate::client::VaultEndpoint;
use crate::env::{
    EnvironmentVariableProvider, HASHICORP_ROLE_ID, HASHICORP_SECRET_ID, HASHICORP_TOKEN,
};
use crate::error::{VaultError, VaultResult};
use crate::secrets::AuthResponse;
use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Token returned by a login.
#[derive(Debug, Clone)]
pub struct LoginToken {
    /// Token value
    pub token: SecretString,
    /// Lease; `None` when the token does not expire from the client's view
    pub lease_duration: Option<Duration>,
}

/// Performs a login against the backend.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a new token.
    async fn login(&self) -> VaultResult<LoginToken>;
}

/// Resolved authentication method.
#[derive(Debug, Clone)]
pub enum ClientAuthentication {
    /// Pre-issued token
    Token(SecretString),
    /// AppRole login at the given mount
    AppRole {
        /// Auth mount path
        path: String,
        /// Role id
        role_id: SecretString,
        /// Secret id
        secret_id: SecretString,
    },
}

impl ClientAuthentication {
    /// Reject environments where no method, or only half of AppRole, is set.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AuthenticationFailed`] describing what to set.
    pub fn check_environment(env: &dyn EnvironmentVariableProvider) -> VaultResult<()> {
        let role_id = env.get_env(HASHICORP_ROLE_ID);
        let secret_id = env.get_env(HASHICORP_SECRET_ID);
        let token = env.get_env(HASHICORP_TOKEN);

        if role_id.is_none() && secret_id.is_none() && token.is_none() {
            return Err(VaultError::auth_failed(format!(
                "Environment variables must be set to authenticate with Hashicorp Vault.  Set the {HASHICORP_ROLE_ID} and {HASHICORP_SECRET_ID} environment variables if using the AppRole authentication method.  Set the {HASHICORP_TOKEN} environment variable if using another authentication method."
            )));
        }
        if role_id.is_none() != secret_id.is_none() {
            return Err(VaultError::auth_failed(format!(
                "Only one of the {HASHICORP_ROLE_ID} and {HASHICORP_SECRET_ID} environment variables to authenticate with Hashicorp Vault using the AppRole method has been set"
            )));
        }
        Ok(())
    }

    /// Resolve the method, preferring AppRole when both ids are set.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AuthenticationFailed`] when neither a complete
    /// AppRole pair nor a token is available.
    pub fn resolve(env: &dyn EnvironmentVariableProvider, approle_path: &str) -> VaultResult<Self> {
        let role_id = env.get_env_as_secret(HASHICORP_ROLE_ID);
        let secret_id = env.get_env_as_secret(HASHICORP_SECRET_ID);

        match (role_id, secret_id) {
            (Some(role_id), Some(secret_id)) => Ok(Self::AppRole {
                path: approle_path.to_string(),
                role_id,
                secret_id,
            }),
            (Some(_), None) | (None, Some(_)) => Err(VaultError::auth_failed(format!(
                "Both {HASHICORP_ROLE_ID} and {HASHICORP_SECRET_ID} environment variables must be set to use the AppRole authentication method"
            ))),
            (None, None) => env
                .get_env_as_secret(HASHICORP_TOKEN)
                .map(Self::Token)
                .ok_or_else(|| {
                    VaultError::auth_failed(format!(
                        "Both {HASHICORP_ROLE_ID} and {HASHICORP_SECRET_ID} environment variables must be set to use the AppRole authentication method.  Alternatively set {HASHICORP_TOKEN} to authenticate using the Token method"
                    ))
                }),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::AppRole { .. } => "approle",
        }
    }
}

/// Logs in over HTTP with a resolved method.
pub struct VaultAuthenticator {
    endpoint: VaultEndpoint,
    method: ClientAuthentication,
}

impl VaultAuthenticator {
    /// Create an authenticator.
    #[must_use]
    pub const fn new(endpoint: VaultEndpoint, method: ClientAuthentication) -> Self {
        Self { endpoint, method }
    }
}

#[async_trait]
impl Authenticator for VaultAuthenticator {
    #[instrument(skip(self), fields(method = self.method.method_name()))]
    async fn login(&self) -> VaultResult<LoginToken> {
        match &self.method {
            ClientAuthentication::Token(token) => Ok(LoginToken {
                token: token.clone(),
                lease_duration: None,
            }),
            ClientAuthentication::AppRole {
                path,
                role_id,
                secret_id,
            } => {
                debug!(path, "Logging in with AppRole");
                let body = serde_json::json!({
                    "role_id": role_id.expose_secret(),
                    "secret_id": secret_id.expose_secret(),
                });

                let response: Option<AuthResponse> = self
                    .endpoint
                    .send_json(Method::POST, &format!("auth/{path}/login"), None, Some(&body))
                    .await
                    .map_err(|e| match e {
                        VaultError::PermissionDenied(_) | VaultError::UnexpectedResponse(_) => {
                            VaultError::auth_failed(e.to_string())
                        }
                        other => other,
                    })?;

                let auth = response
                    .ok_or_else(|| {
                        VaultError::auth_failed(format!("AppRole mount {path} not found"))
                    })?
                    .auth;

                info!(
                    lease_secs = auth.lease_duration,
                    renewable = auth.renewable,
                    "Authenticated with Vault"
                );
                Ok(LoginToken {
                    token: SecretString::from(auth.client_token),
                    lease_duration: Some(Duration::from_secs(auth.lease_duration)),
                })
            }
        }
    }
}
