//! Server-side session records.
//!
//! A session is only valid while its token family is. Reads check the
//! family and delete sessions whose family is gone or revoked, so revoking a
//! family cascades lazily to every session bound to it.

use std::sync::Arc;
use std::time::Duration;

use super::error::SessionError;
use super::family::read_family;
use crate::models::{NewSession, Session};
use crate::store::{keys, Expiry, KeyValueStore, SetCondition};

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn create(&self, new: NewSession) -> Result<Session, SessionError> {
        let session = Session::new(new, self.ttl);

        let created = self
            .store
            .set(
                &keys::session(&session.session_id),
                &serde_json::to_string(&session)?,
                Expiry::After(self.ttl),
                SetCondition::IfAbsent,
            )
            .await?;
        if !created {
            return Err(SessionError::Internal(anyhow::anyhow!(
                "Session id collision: {}",
                session.session_id
            )));
        }

        self.index(&keys::user_sessions(&session.user_id), &session.session_id)
            .await?;
        self.index(&keys::family_sessions(&session.family_id), &session.session_id)
            .await?;

        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            family_id = %session.family_id,
            "Session created"
        );
        Ok(session)
    }

    /// Fetch a live session. Sessions whose family has been revoked or has
    /// expired are deleted on sight and reported as absent.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.read(session_id).await? else {
            return Ok(None);
        };

        let family_live = read_family(self.store.as_ref(), &session.family_id)
            .await?
            .is_some_and(|family| !family.revoked);
        if !family_live {
            tracing::debug!(
                session_id = %session_id,
                family_id = %session.family_id,
                "Dropping session bound to dead token family"
            );
            self.remove(&session).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Record activity and slide the expiry forward.
    ///
    /// Writes with `XX` so a concurrent invalidate is never undone by a
    /// touch that read the session just before it was deleted.
    pub async fn touch(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.get(session_id).await? else {
            return Ok(None);
        };

        let touched = session.touched(self.ttl);
        let written = self
            .store
            .set(
                &keys::session(session_id),
                &serde_json::to_string(&touched)?,
                Expiry::After(self.ttl),
                SetCondition::IfPresent,
            )
            .await?;
        if !written {
            return Ok(None);
        }

        // Indexes must outlive every session they list.
        self.store
            .expire(&keys::user_sessions(&touched.user_id), self.ttl)
            .await?;
        self.store
            .expire(&keys::family_sessions(&touched.family_id), self.ttl)
            .await?;
        Ok(Some(touched))
    }

    /// Returns `false` if the session did not exist.
    pub async fn invalidate(&self, session_id: &str) -> Result<bool, SessionError> {
        let Some(session) = self.read(session_id).await? else {
            return Ok(false);
        };
        self.remove(&session).await?;

        tracing::info!(session_id = %session_id, user_id = %session.user_id, "Session invalidated");
        Ok(true)
    }

    /// Returns how many sessions were removed.
    pub async fn invalidate_all_for_user(&self, user_id: &str) -> Result<usize, SessionError> {
        let index = keys::user_sessions(user_id);
        let session_ids = self.store.set_members(&index).await?;

        let mut removed = 0;
        for session_id in &session_ids {
            if self.invalidate(session_id).await? {
                removed += 1;
            }
        }
        self.store.delete(&index).await?;

        tracing::info!(user_id = %user_id, removed, "All sessions invalidated for user");
        Ok(removed)
    }

    pub async fn invalidate_for_family(&self, family_id: &str) -> Result<usize, SessionError> {
        let index = keys::family_sessions(family_id);
        let session_ids = self.store.set_members(&index).await?;

        let mut removed = 0;
        for session_id in &session_ids {
            if self.invalidate(session_id).await? {
                removed += 1;
            }
        }
        self.store.delete(&index).await?;
        Ok(removed)
    }

    /// Live sessions of a user, newest first. Stale index entries are pruned.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, SessionError> {
        let index = keys::user_sessions(user_id);
        let mut sessions = Vec::new();

        for session_id in self.store.set_members(&index).await? {
            match self.get(&session_id).await? {
                Some(session) => sessions.push(session),
                None => self.store.set_remove(&index, &session_id).await?,
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub async fn find_for_family(&self, family_id: &str) -> Result<Vec<Session>, SessionError> {
        let mut sessions = Vec::new();
        for session_id in self.store.set_members(&keys::family_sessions(family_id)).await? {
            if let Some(session) = self.read(&session_id).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn read(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        match self.store.get(&keys::session(session_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, session: &Session) -> Result<(), SessionError> {
        self.store.delete(&keys::session(&session.session_id)).await?;
        self.store
            .set_remove(&keys::user_sessions(&session.user_id), &session.session_id)
            .await?;
        self.store
            .set_remove(&keys::family_sessions(&session.family_id), &session.session_id)
            .await?;
        Ok(())
    }

    async fn index(&self, key: &str, session_id: &str) -> Result<(), SessionError> {
        self.store.set_add(key, session_id).await?;
        self.store.expire(key, self.ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RevokeReason, TokenFamily, AUTH_LEVEL_PASSWORD};
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<dyn KeyValueStore>, SessionStore, TokenFamily) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let family = TokenFamily::new("user-1");
        store
            .set(
                &keys::family(&family.family_id),
                &serde_json::to_string(&family).unwrap(),
                Expiry::Never,
                SetCondition::Always,
            )
            .await
            .unwrap();
        let sessions = SessionStore::new(store.clone(), Duration::from_secs(3600));
        (store, sessions, family)
    }

    fn new_session(family: &TokenFamily) -> NewSession {
        NewSession {
            user_id: family.user_id.clone(),
            family_id: family.family_id.clone(),
            ip_address: "10.0.0.1".to_string(),
            user_agent: "test".to_string(),
            auth_level: AUTH_LEVEL_PASSWORD,
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let (_, sessions, family) = setup().await;
        let created = sessions.create(new_session(&family)).await.unwrap();

        let fetched = sessions.get(&created.session_id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn touch_after_invalidate_does_not_resurrect() {
        let (_, sessions, family) = setup().await;
        let created = sessions.create(new_session(&family)).await.unwrap();

        assert!(sessions.invalidate(&created.session_id).await.unwrap());
        assert!(sessions.touch(&created.session_id).await.unwrap().is_none());
        assert!(sessions.get(&created.session_id).await.unwrap().is_none());
        assert!(!sessions.invalidate(&created.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn revoked_family_cascades_to_sessions() {
        let (store, sessions, mut family) = setup().await;
        let created = sessions.create(new_session(&family)).await.unwrap();

        family.revoke(RevokeReason::ReuseDetected, chrono::Utc::now());
        store
            .set(
                &keys::family(&family.family_id),
                &serde_json::to_string(&family).unwrap(),
                Expiry::Keep,
                SetCondition::Always,
            )
            .await
            .unwrap();

        assert!(sessions.get(&created.session_id).await.unwrap().is_none());
        assert!(store.get(&keys::session(&created.session_id)).await.unwrap().is_none());
        assert!(sessions.list_for_user("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidate_all_only_touches_one_user() {
        let (store, sessions, family) = setup().await;
        sessions.create(new_session(&family)).await.unwrap();
        sessions.create(new_session(&family)).await.unwrap();

        let other_family = TokenFamily::new("user-2");
        store
            .set(
                &keys::family(&other_family.family_id),
                &serde_json::to_string(&other_family).unwrap(),
                Expiry::Never,
                SetCondition::Always,
            )
            .await
            .unwrap();
        let other = sessions.create(new_session(&other_family)).await.unwrap();

        assert_eq!(sessions.invalidate_all_for_user("user-1").await.unwrap(), 2);
        assert!(sessions.list_for_user("user-1").await.unwrap().is_empty());
        assert!(sessions.get(&other.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_for_family_removes_bound_sessions() {
        let (_, sessions, family) = setup().await;
        let created = sessions.create(new_session(&family)).await.unwrap();
        assert_eq!(sessions.find_for_family(&family.family_id).await.unwrap().len(), 1);

        assert_eq!(sessions.invalidate_for_family(&family.family_id).await.unwrap(), 1);
        assert!(sessions.get(&created.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_keeps_both_indexes_alive() {
        let (store, _, family) = setup().await;
        let sessions = SessionStore::new(store.clone(), Duration::from_millis(400));
        let created = sessions.create(new_session(&family)).await.unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(sessions.touch(&created.session_id).await.unwrap().is_some());
        }

        let by_family = sessions.find_for_family(&family.family_id).await.unwrap();
        assert_eq!(by_family.len(), 1);
        assert_eq!(by_family[0].session_id, created.session_id);
        assert_eq!(sessions.list_for_user("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_session_expires() {
        let (store, _, family) = setup().await;
        let sessions = SessionStore::new(store.clone(), Duration::from_millis(200));
        let created = sessions.create(new_session(&family)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(sessions.touch(&created.session_id).await.unwrap().is_none());
        assert!(sessions.find_for_family(&family.family_id).await.unwrap().is_empty());
    }
}
