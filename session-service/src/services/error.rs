use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;

/// Message returned for every security-path failure. Clients never learn
/// whether a token was replayed, revoked or simply expired.
pub const RELOGIN_MESSAGE: &str = "Session expired. Please log in again.";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Refresh token reuse detected")]
    TokenReuseDetected,

    #[error("Token family revoked")]
    FamilyRevoked,

    #[error("Token family is busy")]
    Busy,

    #[error("Invalid or expired refresh token")]
    InvalidToken,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is not active")]
    AccountInactive,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// Security-relevant outcomes that must reach the audit trail.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            SessionError::TokenReuseDetected | SessionError::FamilyRevoked
        )
    }

    /// Failures the client may simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::StoreUnavailable(_) | SessionError::Busy
        )
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Internal(anyhow::anyhow!("Corrupt session record: {}", err))
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::TokenReuseDetected
            | SessionError::FamilyRevoked
            | SessionError::InvalidToken
            | SessionError::SessionExpired => {
                AppError::Unauthorized(anyhow::anyhow!(RELOGIN_MESSAGE))
            }
            SessionError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            SessionError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account is not active"))
            }
            SessionError::SessionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Session not found"))
            }
            SessionError::Busy => AppError::ServiceUnavailable(
                "Another refresh is in progress. Please retry.".to_string(),
                Some(1),
            ),
            SessionError::StoreUnavailable(e) => {
                tracing::error!(error = %e, "Session store unavailable");
                AppError::ServiceUnavailable("Service unavailable".to_string(), None)
            }
            SessionError::Internal(e) => AppError::InternalError(e),
        }
    }
}
