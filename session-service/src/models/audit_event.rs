//! Audit event model - security and compliance logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Login,
    LoginFailed,
    TokenRefreshed,
    TokenReplayAccepted,
    TokenReuseDetected,
    RevokedFamilyUsed,
    FamilyRevoked,
    SessionRevoked,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Login => "login",
            AuditEventType::LoginFailed => "login_failed",
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::TokenReplayAccepted => "token_replay_accepted",
            AuditEventType::TokenReuseDetected => "token_reuse_detected",
            AuditEventType::RevokedFamilyUsed => "revoked_family_used",
            AuditEventType::FamilyRevoked => "family_revoked",
            AuditEventType::SessionRevoked => "session_revoked",
            AuditEventType::Logout => "logout",
        }
    }

    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::TokenReuseDetected => AuditSeverity::Critical,
            AuditEventType::LoginFailed
            | AuditEventType::TokenReplayAccepted
            | AuditEventType::RevokedFamilyUsed => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        }
    }
}

/// Immutable security fact. Serialized as one member of the `audit:events`
/// sorted set, scored by `created_at` in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// Assigned by the writer; breaks ties between events in the same millisecond.
    #[serde(default)]
    pub sequence: i64,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub family_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence: 0,
            event_type,
            severity: event_type.severity(),
            user_id: None,
            session_id: None,
            family_id: None,
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn family(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = Some(family_id.into());
        self
    }

    pub fn client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
