//! Centralized HTTP client configuration and building.
//!
//! Clients are built on rustls. TLS material is supplied as PEM files: a
//! client identity (private key plus certificate chain) enables mutual TLS,
//! a trust store replaces the built-in roots.

use crate::PlatformError;
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// TLS material for the HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM file holding the client private key and certificate chain
    pub identity_pem: Option<PathBuf>,
    /// PEM bundle of trusted CA certificates
    pub trust_store_pem: Option<PathBuf>,
}

impl TlsConfig {
    /// TLS using the platform roots and no client certificate.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Trust only the certificates in the given bundle.
    #[must_use]
    pub fn for_trust_store(trust_store_pem: impl Into<PathBuf>) -> Self {
        Self {
            identity_pem: None,
            trust_store_pem: Some(trust_store_pem.into()),
        }
    }

    /// Mutual TLS with a client identity and a custom trust store.
    #[must_use]
    pub fn mutual(identity_pem: impl Into<PathBuf>, trust_store_pem: impl Into<PathBuf>) -> Self {
        Self {
            identity_pem: Some(identity_pem.into()),
            trust_store_pem: Some(trust_store_pem.into()),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// TLS material
    pub tls: TlsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: "vault-credentials-rust/1.0".to_string(),
            tls: TlsConfig::unconfigured(),
        }
    }
}

impl HttpConfig {
    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set TLS material.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, PlatformError> {
    std::fs::read(path).map_err(|source| PlatformError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns an error if TLS material cannot be read or parsed, or the client
/// cannot be built.
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_timeout(Duration::from_secs(60));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls();

    if let Some(trust_store) = &config.tls.trust_store_pem {
        let certificates = Certificate::from_pem_bundle(&read_pem(trust_store)?)?;
        debug!(
            path = %trust_store.display(),
            count = certificates.len(),
            "Loaded trust store"
        );
        builder = builder.tls_built_in_root_certs(false);
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    if let Some(identity) = &config.tls.identity_pem {
        debug!(path = %identity.display(), "Loaded client identity");
        builder = builder.identity(Identity::from_pem(&read_pem(identity)?)?);
    }

    Ok(builder.build()?)
}
