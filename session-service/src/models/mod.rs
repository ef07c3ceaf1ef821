//! Records persisted by the session subsystem.

mod audit_event;
mod refresh_token;
mod session;
mod token_family;
mod user;

pub use audit_event::{AuditEvent, AuditEventType, AuditSeverity};
pub use refresh_token::{generate_refresh_token, hash_token, RefreshTokenRecord};
pub use session::{NewSession, Session, SessionInfo, AUTH_LEVEL_PASSWORD};
pub use token_family::{RevokeReason, TokenFamily};
pub use user::{User, UserStatus};
pub(crate) use user::UserRow;
