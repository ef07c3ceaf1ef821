//! Security audit trail.
//!
//! Events are appended to the `audit:events` sorted set scored by creation
//! time in milliseconds. Writing is best effort: a failed append is logged
//! with the full event and never fails the request that produced it.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::error::SessionError;
use crate::models::AuditEvent;
use crate::store::{keys, KeyValueStore, StoreResult};

/// Upper bound on events scanned when filtering by user.
const USER_SCAN_LIMIT: usize = 5_000;

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn KeyValueStore>,
    retention: Duration,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KeyValueStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub async fn append(&self, mut event: AuditEvent) {
        match self.write(&mut event).await {
            Ok(()) => {
                tracing::debug!(
                    event_type = event.event_type.as_str(),
                    sequence = event.sequence,
                    "Audit event recorded"
                );
            }
            Err(e) => {
                let payload = serde_json::to_string(&event)
                    .unwrap_or_else(|_| format!("{:?}", event));
                tracing::error!(
                    error = %e,
                    event_type = event.event_type.as_str(),
                    event = %payload,
                    "Failed to write audit event"
                );
            }
        }
    }

    async fn write(&self, event: &mut AuditEvent) -> StoreResult<()> {
        event.sequence = self.store.incr(keys::AUDIT_SEQUENCE).await?;
        // Only fails for non-finite floats, which the model cannot hold.
        let member = serde_json::to_string(event).unwrap_or_default();
        self.store
            .zadd(keys::AUDIT_EVENTS, event.created_at.timestamp_millis(), &member)
            .await
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, SessionError> {
        let raw = self.store.zrev_range(keys::AUDIT_EVENTS, limit).await?;
        Ok(decode(raw))
    }

    /// Newest first, restricted to one user.
    pub async fn for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, SessionError> {
        let raw = self
            .store
            .zrev_range(keys::AUDIT_EVENTS, USER_SCAN_LIMIT)
            .await?;

        Ok(decode(raw)
            .into_iter()
            .filter(|event| event.user_id.as_deref() == Some(user_id))
            .take(limit)
            .collect())
    }

    /// Drop events older than the retention period. Returns how many went.
    pub async fn prune(&self) -> Result<u64, SessionError> {
        let retention = ChronoDuration::from_std(self.retention)
            .map_err(|e| SessionError::Internal(anyhow::anyhow!("Invalid retention: {}", e)))?;
        let cutoff = (Utc::now() - retention).timestamp_millis();

        let removed = self
            .store
            .zrem_range_by_score(keys::AUDIT_EVENTS, i64::MIN, cutoff)
            .await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned expired audit events");
        }
        Ok(removed)
    }
}

fn decode(raw: Vec<String>) -> Vec<AuditEvent> {
    let mut events: Vec<AuditEvent> = raw
        .iter()
        .filter_map(|member| match serde_json::from_str(member) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable audit event");
                None
            }
        })
        .collect();
    events.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.sequence.cmp(&a.sequence))
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditEventType;
    use crate::store::MemoryStore;

    fn audit_log() -> AuditLog {
        AuditLog::new(Arc::new(MemoryStore::new()), Duration::from_secs(90 * 24 * 3600))
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence() {
        let log = audit_log();
        log.append(AuditEvent::new(AuditEventType::Login).user("u1")).await;
        log.append(AuditEvent::new(AuditEventType::Logout).user("u1")).await;

        let events = log.recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::Logout);
        assert!(events[0].sequence > events[1].sequence);
    }

    #[tokio::test]
    async fn for_user_filters() {
        let log = audit_log();
        log.append(AuditEvent::new(AuditEventType::Login).user("alice")).await;
        log.append(AuditEvent::new(AuditEventType::Login).user("bob")).await;
        log.append(AuditEvent::new(AuditEventType::TokenReuseDetected).user("alice"))
            .await;

        let events = log.for_user("alice", 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.user_id.as_deref() == Some("alice")));

        assert_eq!(log.for_user("alice", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_drops_only_expired_events() {
        let log = audit_log();
        let mut old = AuditEvent::new(AuditEventType::Login);
        old.created_at = Utc::now() - ChronoDuration::days(91);
        log.append(old).await;
        log.append(AuditEvent::new(AuditEventType::Login)).await;

        assert_eq!(log.prune().await.unwrap(), 1);
        assert_eq!(log.recent(10).await.unwrap().len(), 1);
    }
}
