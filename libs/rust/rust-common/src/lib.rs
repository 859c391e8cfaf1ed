//! Shared library for cross-cutting concerns of the vault credential crates.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration with TLS and mutual TLS material
//! - Exponential backoff with a pinned retry ceiling
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{HttpConfig, TlsConfig, build_http_client};
pub use retry::BackoffPolicy;
pub use tracing_config::{TracingConfig, init_tracing};
