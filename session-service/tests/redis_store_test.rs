//! Runs the store contract against a live Redis. Requires `REDIS_URL`.

use session_service::{
    config::RedisConfig,
    services::{DistributedLock, LockConfig},
    store::{Expiry, KeyValueStore, RedisStore, SetCondition},
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn store() -> Arc<dyn KeyValueStore> {
    let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for Redis tests");
    Arc::new(
        RedisStore::new(&RedisConfig { url })
            .await
            .expect("Failed to connect to Redis"),
    )
}

#[tokio::test]
#[ignore = "requires a running Redis (set REDIS_URL)"]
async fn conditional_writes_follow_nx_and_xx() {
    let store = store().await;
    let key = format!("test:{}", Uuid::new_v4());

    assert!(!store.set(&key, "a", Expiry::Keep, SetCondition::IfPresent).await.unwrap());
    assert!(store
        .set(&key, "a", Expiry::After(Duration::from_secs(30)), SetCondition::IfAbsent)
        .await
        .unwrap());
    assert!(!store
        .set(&key, "b", Expiry::After(Duration::from_secs(30)), SetCondition::IfAbsent)
        .await
        .unwrap());
    assert!(store.set(&key, "c", Expiry::Keep, SetCondition::IfPresent).await.unwrap());

    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("c"));
    assert!(store.ttl(&key).await.unwrap().is_some());
    assert!(store.delete(&key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis (set REDIS_URL)"]
async fn lock_release_is_owner_only() {
    let store = store().await;
    let lock = DistributedLock::new(store.clone(), LockConfig::default());
    let key = format!("lock:test:{}", Uuid::new_v4());

    let token = lock
        .acquire(&key, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("lock should be free");
    assert!(lock.acquire(&key, Duration::from_secs(5)).await.unwrap().is_none());

    assert!(!store.delete_if_equals(&key, "someone-else").await.unwrap());
    assert!(lock.release(&key, &token).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis (set REDIS_URL)"]
async fn sorted_set_range_and_prune() {
    let store = store().await;
    let key = format!("test:z:{}", Uuid::new_v4());

    store.zadd(&key, 10, "old").await.unwrap();
    store.zadd(&key, 20, "mid").await.unwrap();
    store.zadd(&key, 30, "new").await.unwrap();

    assert_eq!(store.zrev_range(&key, 2).await.unwrap(), vec!["new", "mid"]);
    assert_eq!(
        store.zrange_by_score(&key, 15, 40, None).await.unwrap(),
        vec!["mid", "new"]
    );
    assert_eq!(store.zrem_range_by_score(&key, i64::MIN, 15).await.unwrap(), 1);
    store.delete(&key).await.unwrap();
}
