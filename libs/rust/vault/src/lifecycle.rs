//! Database credential rotation.
//!
//! A single background task sleeps until shortly before the current lease
//! expires, fetches new credentials and pushes them into the connection pool.
//! Failures are retried with exponential backoff and never end the loop; only
//! [`DbCredentialsVaultLifecycleManager::stop`] does.

use crate::config::RotationTunables;
use crate::error::{VaultError, VaultResult};
use crate::pool::ConnectionPool;
use crate::provider::DatabaseCredentialProvider;
use rust_common::BackoffPolicy;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_SUMMARY_LEVELS: usize = 5;

/// Validated rotation timings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationSettings {
    backoff: BackoffPolicy,
    min_delay_before_next_run_secs: u64,
    delay_before_next_run_factor: f64,
    max_duration_before_ttl_expire_secs: u64,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            min_delay_before_next_run_secs: 10,
            delay_before_next_run_factor: 0.1,
            max_duration_before_ttl_expire_secs: 300,
        }
    }
}

/// Collects every violation so they can be reported together.
#[derive(Default)]
struct TunableValidator {
    errors: Vec<String>,
}

impl TunableValidator {
    fn positive<T>(
        &mut self,
        name: &str,
        raw: Option<&str>,
        type_name: &str,
        parse: impl Fn(&str) -> Option<T>,
        zero: T,
        default: T,
    ) -> T
    where
        T: PartialOrd + Copy,
    {
        let Some(raw) = raw else {
            return default;
        };
        let Some(value) = parse(raw) else {
            self.errors.push(format!(
                "The value \"{raw}\" of property [{name}] is not a valid [{type_name}] type."
            ));
            return default;
        };
        if value <= zero {
            self.errors.push(format!(
                "Configuration property \"{name}\" should have a value greater than zero (0)."
            ));
            return default;
        }
        value
    }

    fn seconds(&mut self, name: &str, raw: Option<&str>, default: u64) -> u64 {
        let fallback = i64::try_from(default).unwrap_or(i64::MAX);
        let value = self.positive(name, raw, "i64", |s| s.parse::<i64>().ok(), 0, fallback);
        u64::try_from(value).unwrap_or(default)
    }

    fn factor(&mut self, name: &str, raw: Option<&str>, default: f64) -> f64 {
        let parse = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite());
        self.positive(name, raw, "f64", parse, 0.0, default)
    }
}

impl RotationSettings {
    /// Validate raw tunables; absent values keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns one [`VaultError::Configuration`] listing every invalid value.
    pub fn from_tunables(tunables: &RotationTunables) -> VaultResult<Self> {
        let defaults = Self::default();
        let mut validator = TunableValidator::default();

        let retry_delay = validator.seconds(
            "retryDelayInSeconds",
            tunables.retry_delay_in_seconds.as_deref(),
            defaults.backoff.base().as_secs(),
        );
        let max_retry_delay = validator.seconds(
            "maxRetryDelayInSeconds",
            tunables.max_retry_delay_in_seconds.as_deref(),
            defaults.backoff.max().as_secs(),
        );
        let min_delay = validator.seconds(
            "minDelayBeforeNextRunInSeconds",
            tunables.min_delay_before_next_run_in_seconds.as_deref(),
            defaults.min_delay_before_next_run_secs,
        );
        let factor = validator.factor(
            "delayBeforeNextRunFactor",
            tunables.delay_before_next_run_factor.as_deref(),
            defaults.delay_before_next_run_factor,
        );
        let max_duration = validator.seconds(
            "maxDurationBeforeTtlExpireInSeconds",
            tunables.max_duration_before_ttl_expire_in_seconds.as_deref(),
            defaults.max_duration_before_ttl_expire_secs,
        );

        if !validator.errors.is_empty() {
            return Err(VaultError::config(validator.errors.join(" ")));
        }

        Ok(Self {
            backoff: BackoffPolicy::new(retry_delay, max_retry_delay),
            min_delay_before_next_run_secs: min_delay,
            delay_before_next_run_factor: factor,
            max_duration_before_ttl_expire_secs: max_duration,
        })
    }

    /// Retry backoff.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Delay before refreshing a lease of `ttl_secs`.
    ///
    /// Leaves `ceil(ttl * factor)` of head-room, capped at the configured
    /// maximum, and never goes below the minimum delay.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn next_run_delay(&self, ttl_secs: u64) -> Duration {
        let headroom = (ttl_secs as f64 * self.delay_before_next_run_factor).ceil() as u64;
        let headroom = headroom.min(self.max_duration_before_ttl_expire_secs);
        let delay = ttl_secs
            .saturating_sub(headroom)
            .max(self.min_delay_before_next_run_secs);
        Duration::from_secs(delay)
    }
}

/// Flatten an error chain into one line: at most five messages joined by
/// `". "`, with `"..."` appended when the chain is longer.
#[must_use]
pub fn nested_error_summary(err: &anyhow::Error) -> String {
    let messages: Vec<String> = err.chain().map(ToString::to_string).collect();
    let mut summary = messages
        .iter()
        .take(MAX_SUMMARY_LEVELS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(". ");
    if messages.len() > MAX_SUMMARY_LEVELS {
        summary.push_str("...");
    }
    summary
}

struct Rotation {
    provider: Arc<dyn DatabaseCredentialProvider>,
    pool: Arc<dyn ConnectionPool>,
    settings: RotationSettings,
    retry_count: AtomicU32,
    last_delay_secs: AtomicU64,
}

impl Rotation {
    async fn try_rotate(&self) -> anyhow::Result<u64> {
        let credentials = self.provider.get_db_credentials().await?;
        self.pool.set_username(&credentials.username)?;
        self.pool.set_password(&credentials.password)?;
        self.pool.soft_evict_idle_connections()?;
        Ok(credentials.lease_duration_secs)
    }

    async fn rotate(&self) -> Duration {
        info!("Checking for new db credentials from vault");

        let delay = match self.try_rotate().await {
            Ok(lease_secs) => {
                let delay = self.settings.next_run_delay(lease_secs);
                self.retry_count.store(0, Ordering::Release);
                info!(
                    next_run_secs = delay.as_secs(),
                    "Checking for new db credentials from vault was successful"
                );
                delay
            }
            Err(e) => {
                let mut attempt = self.retry_count.load(Ordering::Acquire);
                let delay = self.settings.backoff.delay_for_attempt(&mut attempt);
                self.retry_count.store(attempt + 1, Ordering::Release);
                error!(
                    retry_after_secs = delay.as_secs(),
                    error = %nested_error_summary(&e),
                    "Unexpected error while fetching new db credentials"
                );
                debug!(error = ?e, "Error details");
                delay
            }
        };

        self.last_delay_secs.store(delay.as_secs(), Ordering::Release);
        delay
    }

    async fn run(self: Arc<Self>, mut delay: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            delay = self.rotate().await;
        }
        info!("Component for managing life-cycle of db credentials in vault stopped");
    }
}

/// Keeps a connection pool supplied with unexpired database credentials.
pub struct DbCredentialsVaultLifecycleManager {
    rotation: Arc<Rotation>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DbCredentialsVaultLifecycleManager {
    /// Create a manager; nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        provider: Arc<dyn DatabaseCredentialProvider>,
        pool: Arc<dyn ConnectionPool>,
        settings: RotationSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            rotation: Arc::new(Rotation {
                provider,
                pool,
                settings,
                retry_count: AtomicU32::new(0),
                last_delay_secs: AtomicU64::new(0),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Schedule the first rotation before a lease of `initial_lease_secs`
    /// expires. Must be called from within a tokio runtime.
    pub fn start(&self, initial_lease_secs: u64) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            warn!("Db credentials life-cycle manager already started");
            return;
        }
        if *self.shutdown.borrow() {
            warn!("Db credentials life-cycle manager was stopped before it started");
            return;
        }

        info!("Component for managing life-cycle of db credentials in vault is starting");
        let delay = self.rotation.settings.next_run_delay(initial_lease_secs);
        self.rotation
            .last_delay_secs
            .store(delay.as_secs(), Ordering::Release);

        let rotation = Arc::clone(&self.rotation);
        *task = Some(tokio::spawn(rotation.run(delay, self.shutdown.subscribe())));

        let settings = &self.rotation.settings;
        info!(
            next_run_secs = delay.as_secs(),
            retry_delay_secs = settings.backoff.base().as_secs(),
            max_retry_delay_secs = settings.backoff.max().as_secs(),
            min_delay_before_next_run_secs = settings.min_delay_before_next_run_secs,
            delay_before_next_run_factor = settings.delay_before_next_run_factor,
            max_duration_before_ttl_expire_secs = settings.max_duration_before_ttl_expire_secs,
            "Component for managing life-cycle of db credentials in vault started"
        );
    }

    /// Prevent further rotations. A rotation already in progress completes.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the rotation task to exit after [`stop`](Self::stop).
    pub async fn wait(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Rotation task ended abnormally");
            }
        }
    }

    /// Run one rotation now and return the delay until the next one.
    pub async fn rotate(&self) -> Duration {
        self.rotation.rotate().await
    }

    /// Consecutive failed rotations.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.rotation.retry_count.load(Ordering::Acquire)
    }

    /// Delay most recently scheduled.
    #[must_use]
    pub fn last_delay(&self) -> Duration {
        Duration::from_secs(self.rotation.last_delay_secs.load(Ordering::Acquire))
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &RotationSettings {
        &self.rotation.settings
    }
}

impl Drop for DbCredentialsVaultLifecycleManager {
    fn drop(&mut self) {
        self.stop();
    }
}
