pub mod audit;
pub mod auth;
pub mod breach;
pub mod error;
pub mod family;
pub mod jwt;
pub mod lock;
pub mod sessions;
pub mod users;

pub use audit::AuditLog;
pub use auth::{AuthContext, ClientMeta, LogoutSummary, SessionManager};
pub use breach::{BreachDetector, BreachResult};
pub use error::{SessionError, RELOGIN_MESSAGE};
pub use family::{IssuedRefreshToken, Rotation, TokenFamilyTracker};
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use lock::{DistributedLock, LockConfig, LockToken};
pub use sessions::SessionStore;
pub use users::{InMemoryUserDirectory, PgUserDirectory, UserDirectory};
