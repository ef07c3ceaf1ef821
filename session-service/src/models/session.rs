//! Session model - one authenticated client context.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assurance level recorded for a plain email/password login.
pub const AUTH_LEVEL_PASSWORD: u8 = 1;

/// Stored at `session:<session_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    /// Token family minted by the same login.
    pub family_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub auth_level: u8,
    /// Role flag snapshot taken at login.
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input for [`crate::services::SessionStore::create`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub family_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub auth_level: u8,
    pub is_admin: bool,
}

impl Session {
    pub fn new(new: NewSession, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            family_id: new.family_id,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            auth_level: new.auth_level,
            is_admin: new.is_admin,
            created_at: now,
            last_used_at: now,
            expires_at: now + Duration::from_std(ttl).unwrap_or(Duration::zero()),
        }
    }

    /// Record activity and push expiry out by `ttl`.
    pub fn touched(mut self, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        self.last_used_at = now;
        self.expires_at = now + Duration::from_std(ttl).unwrap_or(Duration::zero());
        self
    }
}

/// Session info for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(s: Session, current_session_id: &str) -> Self {
        Self {
            is_current: s.session_id == current_session_id,
            session_id: s.session_id,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            created_at: s.created_at,
            last_used_at: s.last_used_at,
            expires_at: s.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> NewSession {
        NewSession {
            user_id: "user-1".to_string(),
            family_id: "family-1".to_string(),
            ip_address: "127.0.0.1".to_string(),
            user_agent: "test-agent".to_string(),
            auth_level: AUTH_LEVEL_PASSWORD,
            is_admin: false,
        }
    }

    #[test]
    fn touched_only_moves_activity_fields() {
        let session = Session::new(new_session(), std::time::Duration::from_secs(60));
        let touched = session.clone().touched(std::time::Duration::from_secs(3600));

        assert_eq!(touched.session_id, session.session_id);
        assert_eq!(touched.family_id, session.family_id);
        assert_eq!(touched.created_at, session.created_at);
        assert!(touched.expires_at > session.expires_at);
        assert!(touched.last_used_at >= session.last_used_at);
    }

    #[test]
    fn session_info_marks_current() {
        let session = Session::new(new_session(), std::time::Duration::from_secs(60));
        let id = session.session_id.clone();

        assert!(SessionInfo::from_session(session.clone(), &id).is_current);
        assert!(!SessionInfo::from_session(session, "other").is_current);
    }
}
