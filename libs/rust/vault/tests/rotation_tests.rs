//! Credential rotation driven through the pool bootstrap.

mod common;

use async_trait::async_trait;
use common::RecordingPool;
use secrecy::SecretString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use vault_credentials::{
    DatabaseCredentialProvider, DbCredentials, RotationSettings, RotationTunables,
    VaultBackedPool, VaultError, VaultResult,
};

/// Issues `user-N` / `pass-N` with a fixed lease until told to fail.
struct LeaseIssuer {
    lease_secs: u64,
    issued: AtomicU32,
    failing: AtomicBool,
}

impl LeaseIssuer {
    fn new(lease_secs: u64) -> Arc<Self> {
        Arc::new(Self {
            lease_secs,
            issued: AtomicU32::new(0),
            failing: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseCredentialProvider for LeaseIssuer {
    async fn get_db_credentials(&self) -> VaultResult<DbCredentials> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(VaultError::db_credentials(
                "Unexpected error reading db credentials from hashicorp vault",
                Some(VaultError::unavailable("connection refused")),
            ));
        }
        Ok(DbCredentials {
            username: format!("user-{n}"),
            password: SecretString::from(format!("pass-{n}")),
            lease_duration_secs: self.lease_secs,
        })
    }
}

fn build_pool(credentials: &DbCredentials) -> anyhow::Result<RecordingPool> {
    Ok(RecordingPool::with_username(&credentials.username))
}

#[tokio::test(start_paused = true)]
async fn test_pool_rotated_before_lease_expires() {
    let issuer = LeaseIssuer::new(100);
    let handle = VaultBackedPool::create(issuer.clone(), RotationSettings::default(), build_pool)
        .await
        .unwrap();

    assert_eq!(handle.pool().username(), "user-0");
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(90));

    tokio::time::sleep(Duration::from_secs(91)).await;
    assert_eq!(issuer.calls(), 2);
    assert_eq!(handle.pool().username(), "user-1");
    assert_eq!(handle.pool().password(), "pass-1");
    assert_eq!(handle.pool().evictions.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(issuer.calls(), 3);
    assert_eq!(handle.pool().username(), "user-2");

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(issuer.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failures_back_off_and_recover() {
    let issuer = LeaseIssuer::new(100);
    let handle = VaultBackedPool::create(issuer.clone(), RotationSettings::default(), build_pool)
        .await
        .unwrap();
    issuer.failing.store(true, Ordering::SeqCst);

    // First rotation at 90s, then retries after 2, 4, 8 and 16 seconds.
    tokio::time::sleep(Duration::from_secs(91)).await;
    assert_eq!(handle.lifecycle().retry_count(), 1);
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(handle.lifecycle().retry_count(), 3);
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(8));

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(handle.lifecycle().retry_count(), 4);
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(16));
    assert_eq!(handle.pool().username(), "user-0");

    issuer.failing.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(handle.lifecycle().retry_count(), 0);
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(90));
    assert_eq!(handle.pool().username(), "user-5");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pool_update_failure_is_retried() {
    let issuer = LeaseIssuer::new(3600);
    let handle = VaultBackedPool::create(issuer.clone(), RotationSettings::default(), build_pool)
        .await
        .unwrap();
    handle.pool().reject_password.store(true, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(3301)).await;
    assert_eq!(handle.lifecycle().retry_count(), 1);
    assert_eq!(handle.lifecycle().last_delay(), Duration::from_secs(2));
    assert_eq!(handle.pool().evictions.load(Ordering::SeqCst), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_initial_fetch_failure_aborts_creation() {
    let issuer = LeaseIssuer::new(100);
    issuer.failing.store(true, Ordering::SeqCst);

    let err = VaultBackedPool::create(issuer, RotationSettings::default(), build_pool)
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Unable to read initial database credentials");
    assert_eq!(
        err.root_cause().to_string(),
        "Vault unavailable: connection refused"
    );
}

#[tokio::test]
async fn test_pool_builder_failure_aborts_creation() {
    let err = VaultBackedPool::<RecordingPool>::create(
        LeaseIssuer::new(100),
        RotationSettings::default(),
        |_| anyhow::bail!("jdbc url rejected"),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.to_string(), "Unable to build connection pool");
}

#[test]
fn test_custom_tunables_shape_schedule() {
    let tunables: RotationTunables = serde_json::from_value(serde_json::json!({
        "minDelayBeforeNextRunInSeconds": "60",
        "delayBeforeNextRunFactor": "0.25",
        "maxDurationBeforeTtlExpireInSeconds": "120"
    }))
    .unwrap();
    let settings = RotationSettings::from_tunables(&tunables).unwrap();

    assert_eq!(settings.next_run_delay(200), Duration::from_secs(150));
    assert_eq!(settings.next_run_delay(1000), Duration::from_secs(880));
    assert_eq!(settings.next_run_delay(70), Duration::from_secs(60));
}
