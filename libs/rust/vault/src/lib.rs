//! HashiCorp Vault credential subsystem.
//!
//! Authenticates with a token or AppRole and keeps the session token fresh,
//! reads and writes versioned secrets with optional transit encryption, and
//! rotates database credentials into a running connection pool before their
//! lease expires.

pub mod admin;
pub mod auth;
pub mod client;
pub mod config;
pub mod db_credentials;
pub mod env;
pub mod error;
pub mod factory;
pub mod key_vault;
pub mod lifecycle;
pub mod pool;
pub mod provider;
pub mod secrets;
pub mod session;
pub mod transit;

pub use admin::{HealthStatus, VaultAdmin};
pub use auth::{Authenticator, ClientAuthentication, LoginToken};
pub use client::{VaultClient, VaultEndpoint, VaultOperations};
pub use config::{DbCredentialsConfig, RotationTunables, VaultConfig};
pub use db_credentials::VaultDbCredentialsService;
pub use env::{EnvironmentVariableProvider, MapEnvironment, SystemEnvironment};
pub use error::{VaultError, VaultResult};
pub use factory::VaultServiceFactory;
pub use key_vault::VaultKeyVaultService;
pub use lifecycle::{DbCredentialsVaultLifecycleManager, RotationSettings};
pub use pool::{ConnectionPool, VaultBackedPool};
pub use provider::{DatabaseCredentialProvider, DbCredentials, SecretProvider};
pub use secrets::{SecretDocument, SecretReference, SetSecretResponse};
pub use session::SessionManager;
pub use transit::TransitCipherClient;
