//! Token family - the lineage of refresh tokens descended from one login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a family was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Logout,
    ReuseDetected,
    SessionRevoked,
    SessionExpired,
    AccountInactive,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Logout => "logout",
            RevokeReason::ReuseDetected => "reuse_detected",
            RevokeReason::SessionRevoked => "session_revoked",
            RevokeReason::SessionExpired => "session_expired",
            RevokeReason::AccountInactive => "account_inactive",
        }
    }
}

/// Stored at `family:<family_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFamily {
    pub family_id: String,
    pub user_id: String,
    /// Generation of the newest refresh token; starts at 0.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    /// When `generation` was reached.
    pub rotated_at: DateTime<Utc>,
    /// Set once the previous generation has been redeemed inside the grace window.
    #[serde(default)]
    pub grace_consumed: bool,
    #[serde(default)]
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<RevokeReason>,
}

impl TokenFamily {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            family_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            generation: 0,
            created_at: now,
            rotated_at: now,
            grace_consumed: false,
            revoked: false,
            revoked_at: None,
            revoke_reason: None,
        }
    }

    /// Move to the next generation. Returns the new generation.
    pub fn advance(&mut self, now: DateTime<Utc>) -> u64 {
        self.generation += 1;
        self.rotated_at = now;
        self.grace_consumed = false;
        self.generation
    }

    pub fn revoke(&mut self, reason: RevokeReason, now: DateTime<Utc>) {
        if self.revoked {
            return;
        }
        self.revoked = true;
        self.revoked_at = Some(now);
        self.revoke_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_increments_by_one_and_resets_grace() {
        let mut family = TokenFamily::new("user-1");
        family.grace_consumed = true;

        let now = Utc::now();
        assert_eq!(family.advance(now), 1);
        assert_eq!(family.advance(now), 2);
        assert_eq!(family.rotated_at, now);
        assert!(!family.grace_consumed);
    }

    #[test]
    fn first_revocation_reason_sticks() {
        let mut family = TokenFamily::new("user-1");
        family.revoke(RevokeReason::ReuseDetected, Utc::now());
        family.revoke(RevokeReason::Logout, Utc::now());

        assert!(family.revoked);
        assert_eq!(family.revoke_reason, Some(RevokeReason::ReuseDetected));
    }
}
