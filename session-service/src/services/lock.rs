//! Short-lived distributed mutual exclusion on top of the key-value store.
//!
//! `SET key token NX PX ttl` to acquire, compare-and-delete to release. The
//! TTL bounds how long a crashed holder can wedge the lock.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::error::SessionError;
use crate::store::{Expiry, KeyValueStore, SetCondition, StoreResult};

/// Proof of ownership handed back by [`DistributedLock::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Retry policy for contended acquisition.
#[derive(Clone, Debug)]
pub struct LockConfig {
    pub ttl: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            max_retries: 5,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl LockConfig {
    /// Exponential backoff with up to 50% jitter.
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = (self.initial_backoff.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
        let capped = base.min(self.max_backoff.as_millis() as u64);
        let jitter = rand::thread_rng().gen_range(0..=capped / 2);
        Duration::from_millis(capped + jitter)
    }
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    config: LockConfig,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Single non-blocking attempt.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set(key, &token, Expiry::After(ttl), SetCondition::IfAbsent)
            .await?;
        Ok(acquired.then_some(LockToken(token)))
    }

    /// Release only if we still own the lock. Returns `false` when it had
    /// already expired or been taken over.
    pub async fn release(&self, key: &str, token: &LockToken) -> StoreResult<bool> {
        self.store.delete_if_equals(key, token.as_str()).await
    }

    /// Acquire with the configured TTL, backing off between attempts.
    /// Gives up with [`SessionError::Busy`] once retries are exhausted.
    pub async fn acquire_with_retry(&self, key: &str) -> Result<LockToken, SessionError> {
        let mut attempt = 0;
        loop {
            if let Some(token) = self.acquire(key, self.config.ttl).await? {
                return Ok(token);
            }

            if attempt >= self.config.max_retries {
                tracing::warn!(lock = %key, attempts = attempt + 1, "Lock contention exceeded retry budget");
                return Err(SessionError::Busy);
            }

            let backoff = self.config.backoff_duration(attempt);
            tracing::debug!(lock = %key, attempt = attempt + 1, backoff_ms = backoff.as_millis() as u64, "Lock held, backing off");
            sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lock(max_retries: u32) -> DistributedLock {
        DistributedLock::new(
            Arc::new(MemoryStore::new()),
            LockConfig {
                ttl: Duration::from_secs(5),
                max_retries,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        )
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let lock = lock(0);
        let token = lock
            .acquire("lock:a", Duration::from_secs(5))
            .await
            .unwrap()
            .expect("first acquire succeeds");

        assert!(lock.acquire("lock:a", Duration::from_secs(5)).await.unwrap().is_none());
        assert!(lock.release("lock:a", &token).await.unwrap());
        assert!(lock.acquire("lock:a", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_token_cannot_release_new_holder() {
        let lock = lock(0);
        let stale = lock
            .acquire("lock:a", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let current = lock
            .acquire("lock:a", Duration::from_secs(5))
            .await
            .unwrap()
            .expect("expired lock is free again");

        assert!(!lock.release("lock:a", &stale).await.unwrap());
        assert!(lock.release("lock:a", &current).await.unwrap());
    }

    #[tokio::test]
    async fn exhausted_retries_report_busy() {
        let lock = lock(2);
        let _held = lock.acquire_with_retry("lock:a").await.unwrap();

        let err = lock.acquire_with_retry("lock:a").await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
    }

    #[tokio::test]
    async fn retry_succeeds_once_holder_releases() {
        let lock = lock(10);
        let held = lock.acquire_with_retry("lock:a").await.unwrap();

        let contender = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire_with_retry("lock:a").await })
        };
        tokio::time::sleep(Duration::from_millis(3)).await;
        lock.release("lock:a", &held).await.unwrap();

        assert!(contender.await.unwrap().is_ok());
    }

    #[test]
    fn backoff_is_capped() {
        let config = LockConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            ..Default::default()
        };
        // cap 40ms plus at most 50% jitter
        assert!(config.backoff_duration(10) <= Duration::from_millis(60));
        assert!(config.backoff_duration(0) >= Duration::from_millis(10));
    }
}
