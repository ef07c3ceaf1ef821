use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{Expiry, KeyValueStore, SetCondition, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    SortedSet(BTreeSet<(i64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local store with Redis-like TTL semantics.
///
/// State is invisible to other instances, so this only suits tests and
/// single-instance development.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.lock()?.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        expiry: Expiry,
        condition: SetCondition,
    ) -> StoreResult<bool> {
        let mut entries = self.lock()?;
        let existing = entries.get(key);

        let allowed = match condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => existing.is_none(),
            SetCondition::IfPresent => existing.is_some(),
        };
        if !allowed {
            return Ok(false);
        }

        let expires_at = match expiry {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(Instant::now() + ttl),
            Expiry::Keep => existing.and_then(|e| e.expires_at),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut entries = self.lock()?;
        let matches = matches!(
            entries.get(key).map(|e| &e.value),
            Some(Value::Str(current)) if current == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.lock()?;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        let Value::Str(current) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let next = current.parse::<i64>().map_err(|_| wrong_type(key))? + 1;
        *current = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        match self.lock()?.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        let Value::Set(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        members.insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let now_empty = match entries.get_mut(key).map(|e| &mut e.value) {
            None => return Ok(()),
            Some(Value::Set(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(wrong_type(key)),
        };
        // Redis drops empty sets
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.lock()?.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(BTreeSet::new()),
            expires_at: None,
        });
        let Value::SortedSet(members) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        members.retain(|(_, m)| m != member);
        members.insert((score, member.to_string()));
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        match self.lock()?.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(members)) => Ok(members
                .iter()
                .filter(|(score, _)| *score >= min && *score <= max)
                .take(limit.unwrap_or(usize::MAX))
                .map(|(_, m)| m.clone())
                .collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zrev_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        match self.lock()?.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(members)) => Ok(members
                .iter()
                .rev()
                .take(limit)
                .map(|(_, m)| m.clone())
                .collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> StoreResult<u64> {
        let mut entries = self.lock()?;
        let (removed, now_empty) = match entries.get_mut(key).map(|e| &mut e.value) {
            None => return Ok(0),
            Some(Value::SortedSet(members)) => {
                let before = members.len();
                members.retain(|(score, _)| *score < min || *score > max);
                ((before - members.len()) as u64, members.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let store = MemoryStore::new();

        assert!(store
            .set("k", "a", Expiry::Never, SetCondition::IfAbsent)
            .await
            .unwrap());
        assert!(!store
            .set("k", "b", Expiry::Never, SetCondition::IfAbsent)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn set_if_present_does_not_create() {
        let store = MemoryStore::new();

        assert!(!store
            .set("k", "a", Expiry::Never, SetCondition::IfPresent)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set(
                "k",
                "v",
                Expiry::After(Duration::from_millis(20)),
                SetCondition::Always,
            )
            .await
            .unwrap();
        assert!(store.ttl("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keep_ttl_preserves_existing_expiry() {
        let store = MemoryStore::new();
        store
            .set(
                "k",
                "v1",
                Expiry::After(Duration::from_secs(60)),
                SetCondition::Always,
            )
            .await
            .unwrap();
        store
            .set("k", "v2", Expiry::Keep, SetCondition::Always)
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert!(store.ttl("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_if_equals_checks_value() {
        let store = MemoryStore::new();
        store
            .set("lock", "token-a", Expiry::Never, SetCondition::Always)
            .await
            .unwrap();

        assert!(!store.delete_if_equals("lock", "token-b").await.unwrap());
        assert!(store.delete_if_equals("lock", "token-a").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("seq").await.unwrap(), 1);
        assert_eq!(store.incr("seq").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sorted_set_ranges_and_pruning() {
        let store = MemoryStore::new();
        for (score, member) in [(10, "a"), (20, "b"), (30, "c")] {
            store.zadd("z", score, member).await.unwrap();
        }

        assert_eq!(store.zrev_range("z", 2).await.unwrap(), vec!["c", "b"]);
        assert_eq!(
            store.zrange_by_score("z", 15, 40, None).await.unwrap(),
            vec!["b", "c"]
        );
        assert_eq!(store.zrem_range_by_score("z", i64::MIN, 20).await.unwrap(), 2);
        assert_eq!(store.zrev_range("z", 10).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let store = MemoryStore::new();
        store.set_add("s", "m").await.unwrap();

        assert!(matches!(store.get("s").await, Err(StoreError::WrongType(_))));
    }
}
