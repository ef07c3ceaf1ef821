//! Key naming convention for everything the service persists.

pub fn session(session_id: &str) -> String {
    format!("session:{}", session_id)
}

pub fn family(family_id: &str) -> String {
    format!("family:{}", family_id)
}

pub fn family_sessions(family_id: &str) -> String {
    format!("family:{}:sessions", family_id)
}

pub fn family_lock(family_id: &str) -> String {
    format!("lock:family:{}", family_id)
}

/// Refresh tokens are only ever addressed by their SHA-256 hex digest.
pub fn refresh_token(token_hash: &str) -> String {
    format!("refresh:{}", token_hash)
}

pub fn user_sessions(user_id: &str) -> String {
    format!("user:{}:sessions", user_id)
}

pub fn user_families(user_id: &str) -> String {
    format!("user:{}:families", user_id)
}

pub const AUDIT_EVENTS: &str = "audit:events";
pub const AUDIT_SEQUENCE: &str = "audit:seq";
