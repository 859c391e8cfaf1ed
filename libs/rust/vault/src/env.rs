//! Environment variable access.
//!
//! Authentication material comes from the process environment. Reading it
//! through a trait keeps the factory testable without mutating global state.

use secrecy::SecretString;
use std::collections::HashMap;

/// AppRole role id.
pub const HASHICORP_ROLE_ID: &str = "HASHICORP_ROLE_ID";
/// AppRole secret id.
pub const HASHICORP_SECRET_ID: &str = "HASHICORP_SECRET_ID";
/// Static Vault token.
pub const HASHICORP_TOKEN: &str = "HASHICORP_TOKEN";

/// Source of environment variables.
pub trait EnvironmentVariableProvider: Send + Sync {
    /// Value of the variable, `None` when unset.
    fn get_env(&self, name: &str) -> Option<String>;

    /// Value of the variable wrapped so that it is never printed.
    fn get_env_as_secret(&self, name: &str) -> Option<SecretString> {
        self.get_env(name).map(SecretString::from)
    }
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl EnvironmentVariableProvider for SystemEnvironment {
    fn get_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables, for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    /// Empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvironmentVariableProvider for MapEnvironment {
    fn get_env(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_map_environment() {
        let env = MapEnvironment::new().with(HASHICORP_TOKEN, "s.abc");
        assert_eq!(env.get_env(HASHICORP_TOKEN).as_deref(), Some("s.abc"));
        assert!(env.get_env(HASHICORP_ROLE_ID).is_none());
    }

    #[test]
    fn test_secret_accessor_redacts_debug() {
        let env = MapEnvironment::new().with(HASHICORP_SECRET_ID, "very-secret");
        let secret = env.get_env_as_secret(HASHICORP_SECRET_ID).unwrap();
        assert_eq!(secret.expose_secret(), "very-secret");
        assert!(!format!("{secret:?}").contains("very-secret"));
    }
}
