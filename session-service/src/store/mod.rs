//! Key-value store adapter.
//!
//! Every piece of cross-request state (sessions, token families, locks, the
//! audit stream) lives behind [`KeyValueStore`]. Production runs on Redis;
//! [`MemoryStore`] emulates the same semantics inside one process.

pub mod keys;
mod memory;
mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] ::redis::RedisError),

    #[error("wrong value type at key {0}")]
    WrongType(String),

    #[error("store state poisoned: {0}")]
    Poisoned(String),
}

/// TTL handling for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Persist without a TTL (clears any existing one).
    Never,
    /// Expire after the given duration.
    After(Duration),
    /// Keep whatever TTL the key already has.
    Keep,
}

/// Existence precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    Always,
    /// Only write when the key does not exist (`NX`).
    IfAbsent,
    /// Only write when the key already exists (`XX`).
    IfPresent,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Returns `false` when the condition prevented the write.
    async fn set(
        &self,
        key: &str,
        value: &str,
        expiry: Expiry,
        condition: SetCondition,
    ) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Atomically delete `key` only if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool>;

    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining TTL; `None` for missing or persistent keys.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;

    /// Members with `min <= score <= max`, lowest score first.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>>;

    /// Up to `limit` members, highest score first.
    async fn zrev_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Remove members with `min <= score <= max`; returns how many were removed.
    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}
