//! Session token cache.
//!
//! The current token lives in an [`ArcSwapOption`] so readers holding a valid
//! token never block. Refreshing goes through a mutex and re-checks expiry
//! once inside, so concurrent callers that all observed an expired token
//! trigger exactly one login.

use crate::auth::{Authenticator, LoginToken};
use crate::error::{VaultError, VaultResult};
use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Head-room subtracted from every lease.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// A token together with the moment it was issued.
#[derive(Debug)]
pub struct SessionToken {
    value: SecretString,
    issued_at: Instant,
    lease: Option<Duration>,
}

impl SessionToken {
    /// Token issued now.
    #[must_use]
    pub fn issued_now(login: LoginToken) -> Self {
        Self {
            value: login.token,
            issued_at: Instant::now(),
            lease: login.lease_duration,
        }
    }

    /// Token value.
    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    /// Lease; `None` for tokens that do not expire.
    #[must_use]
    pub const fn lease(&self) -> Option<Duration> {
        self.lease
    }

    /// Whether the token must be replaced at `now`.
    ///
    /// Compared in whole seconds.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        let Some(lease) = self.lease else {
            return false;
        };
        let elapsed = now.saturating_duration_since(self.issued_at).as_secs();
        elapsed >= lease.saturating_sub(SAFETY_MARGIN).as_secs()
    }
}

#[derive(Default)]
struct RefreshState {
    last_failure: Option<(u64, String)>,
}

/// Owns authentication and the cached session token.
pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    token: ArcSwapOption<SessionToken>,
    /// Completed login attempts
    attempts: AtomicU64,
    refresh: Mutex<RefreshState>,
}

impl SessionManager {
    /// Create a session manager; no login happens until the first request.
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            token: ArcSwapOption::empty(),
            attempts: AtomicU64::new(0),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    fn current_valid(&self) -> Option<Arc<SessionToken>> {
        self.token
            .load_full()
            .filter(|token| !token.is_expired_at(Instant::now()))
    }

    /// Valid session token, logging in when the cached one is absent or
    /// expired.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AuthenticationFailed`] if login fails. Callers
    /// that queued behind the failed attempt receive the same error.
    pub async fn get_session_token(&self) -> VaultResult<Arc<SessionToken>> {
        if let Some(token) = self.current_valid() {
            return Ok(token);
        }

        let observed_attempts = self.attempts.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;

        if let Some(token) = self.current_valid() {
            return Ok(token);
        }

        if let Some((attempt, message)) = &state.last_failure {
            if *attempt > observed_attempts {
                return Err(VaultError::auth_failed(message.clone()));
            }
        }

        let outcome = self.authenticator.login().await;
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        match outcome {
            Ok(login) => {
                let token = Arc::new(SessionToken::issued_now(login));
                self.token.store(Some(Arc::clone(&token)));
                state.last_failure = None;
                info!(
                    lease_secs = token.lease().map(|l| l.as_secs()),
                    "Successfully retrieved new vault token"
                );
                Ok(token)
            }
            Err(e) => {
                let message = match e {
                    VaultError::AuthenticationFailed(msg) => msg,
                    other => other.to_string(),
                };
                warn!(error = %message, "Vault login failed");
                state.last_failure = Some((attempt, message.clone()));
                Err(VaultError::auth_failed(message))
            }
        }
    }

    /// Drop the cached token so the next request logs in again.
    pub fn invalidate(&self) {
        self.token.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingAuthenticator {
        calls: AtomicUsize,
        lease: Option<Duration>,
        fail: bool,
    }

    impl CountingAuthenticator {
        fn new(lease: Option<Duration>, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                lease,
                fail,
            })
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn login(&self) -> VaultResult<LoginToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(VaultError::auth_failed("invalid role_id"));
            }
            Ok(LoginToken {
                token: SecretString::from(format!("s.token-{n}")),
                lease_duration: self.lease,
            })
        }
    }

    fn token_with_lease(lease: Option<Duration>, issued_at: Instant) -> SessionToken {
        SessionToken {
            value: SecretString::from("s.x"),
            issued_at,
            lease,
        }
    }

    #[test]
    fn test_expiry_respects_safety_margin() {
        let issued = Instant::now();
        let token = token_with_lease(Some(Duration::from_secs(60)), issued);
        assert!(!token.is_expired_at(issued + Duration::from_secs(54)));
        assert!(token.is_expired_at(issued + Duration::from_secs(55)));
    }

    #[test]
    fn test_static_token_never_expires() {
        let issued = Instant::now();
        let token = token_with_lease(None, issued);
        assert!(!token.is_expired_at(issued + Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn test_short_lease_is_always_expired() {
        let issued = Instant::now();
        let token = token_with_lease(Some(Duration::from_secs(3)), issued);
        assert!(token.is_expired_at(issued));
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let auth = CountingAuthenticator::new(Some(Duration::from_secs(3600)), false);
        let manager = SessionManager::new(auth.clone());

        let first = manager.get_session_token().await.unwrap();
        let second = manager.get_session_token().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_trigger_single_login() {
        let auth = CountingAuthenticator::new(Some(Duration::from_secs(3600)), false);
        let manager = Arc::new(SessionManager::new(auth.clone()));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_session_token().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_login_shared_by_waiters_then_retried() {
        let auth = CountingAuthenticator::new(None, true);
        let manager = Arc::new(SessionManager::new(auth.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_session_token().await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.to_string(), "Authentication failed: invalid role_id");
        }
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);

        assert!(manager.get_session_token().await.is_err());
        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_login() {
        let auth = CountingAuthenticator::new(None, false);
        let manager = SessionManager::new(auth.clone());

        manager.get_session_token().await.unwrap();
        manager.invalidate();
        manager.get_session_token().await.unwrap();

        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }
}
