//! Service construction.
//!
//! Checks the environment and configuration, then wires TLS, authentication,
//! the session manager and the client together. Nothing here talks to the
//! server; the first login happens on the first request.

use crate::admin::VaultAdmin;
use crate::auth::{ClientAuthentication, VaultAuthenticator};
use crate::client::{VaultClient, VaultEndpoint, VaultOperations};
use crate::config::{DbCredentialsConfig, VaultConfig};
use crate::db_credentials::VaultDbCredentialsService;
use crate::env::EnvironmentVariableProvider;
use crate::error::{VaultError, VaultResult};
use crate::key_vault::VaultKeyVaultService;
use crate::session::SessionManager;
use rust_common::{HttpConfig, build_http_client};
use std::sync::Arc;
use tracing::info;
use url::Url;

const MALFORMED_URL: &str = "Provided Hashicorp Vault url is incorrectly formatted";

/// Builds Vault-backed services.
#[derive(Debug, Clone, Default)]
pub struct VaultServiceFactory {
    http: HttpConfig,
}

impl VaultServiceFactory {
    /// Factory using the given HTTP settings. TLS material is taken from the
    /// Vault configuration and replaces whatever `http` carries.
    #[must_use]
    pub const fn new(http: HttpConfig) -> Self {
        Self { http }
    }

    /// Key storage service.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing from the environment, the
    /// URL is malformed, or TLS material cannot be loaded.
    pub fn create_key_vault_service(
        &self,
        config: &VaultConfig,
        env: &dyn EnvironmentVariableProvider,
    ) -> VaultResult<VaultKeyVaultService> {
        let client = self.create_client(config, env)?;
        Ok(VaultKeyVaultService::new(client))
    }

    /// Database credential service.
    ///
    /// # Errors
    ///
    /// As [`create_key_vault_service`](Self::create_key_vault_service), plus
    /// a configuration error naming every missing required property.
    pub fn create_db_credentials_service(
        &self,
        config: &DbCredentialsConfig,
        env: &dyn EnvironmentVariableProvider,
    ) -> VaultResult<VaultDbCredentialsService> {
        ClientAuthentication::check_environment(env)?;
        let vault_config = config.to_vault_config()?;
        let client = self.create_client(&vault_config, env)?;
        Ok(VaultDbCredentialsService::new(client, config))
    }

    /// Authenticated client shared by the services.
    ///
    /// # Errors
    ///
    /// See [`create_key_vault_service`](Self::create_key_vault_service).
    pub fn create_client(
        &self,
        config: &VaultConfig,
        env: &dyn EnvironmentVariableProvider,
    ) -> VaultResult<Arc<dyn VaultOperations>> {
        ClientAuthentication::check_environment(env)?;
        let endpoint = self.endpoint(config)?;
        let method = ClientAuthentication::resolve(env, &config.approle_path)?;
        info!(method = method.method_name(), "Resolved Vault authentication method");

        let authenticator = Arc::new(VaultAuthenticator::new(endpoint.clone(), method));
        let session = Arc::new(SessionManager::new(authenticator));
        Ok(Arc::new(VaultClient::new(endpoint, session)))
    }

    /// Administrative client; needs no application credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or TLS material cannot be
    /// loaded.
    pub fn create_admin(&self, config: &VaultConfig) -> VaultResult<VaultAdmin> {
        Ok(VaultAdmin::new(self.endpoint(config)?))
    }

    fn endpoint(&self, config: &VaultConfig) -> VaultResult<VaultEndpoint> {
        let url = parse_url(&config.url)?;
        info!(url = %url, "URL for Hashicorp key vault");
        if let Some(namespace) = config.namespace() {
            info!(namespace, "Namespace for Hashicorp key vault");
        }

        let http = build_http_client(&self.http.clone().with_tls(config.tls()))?;
        Ok(VaultEndpoint::new(
            http,
            url.as_str(),
            config.namespace().map(str::to_string),
        ))
    }
}

fn parse_url(raw: &str) -> VaultResult<Url> {
    let url = Url::parse(raw).map_err(|_| VaultError::config(MALFORMED_URL))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(VaultError::config(MALFORMED_URL));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://vault.example:8200").is_ok());
        assert!(parse_url("http://127.0.0.1:8200/").is_ok());

        for raw in ["", "not a url", "vault:8200", "ftp://vault"] {
            let err = parse_url(raw).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid configuration: Provided Hashicorp Vault url is incorrectly formatted",
                "{raw}"
            );
        }
    }
}
