//! Session lifecycle as seen by HTTP clients: login, refresh, logout.

use serde_json::json;
use std::sync::Arc;

use super::audit::AuditLog;
use super::breach::BreachDetector;
use super::error::SessionError;
use super::family::TokenFamilyTracker;
use super::jwt::{JwtService, TokenResponse};
use super::lock::{DistributedLock, LockConfig};
use super::sessions::SessionStore;
use super::users::UserDirectory;
use crate::config::SessionServiceConfig;
use crate::models::{
    AuditEvent, AuditEventType, NewSession, RefreshTokenRecord, RevokeReason, Session,
    SessionInfo, AUTH_LEVEL_PASSWORD,
};
use crate::store::KeyValueStore;
use crate::utils::password::{verify_password, Password};

/// Where a request came from, for session records and the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: String,
    pub user_agent: String,
}

/// Identity established from a valid access token and a live session.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub session_id: String,
    pub family_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct LogoutSummary {
    pub sessions_revoked: usize,
    pub families_revoked: usize,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    users: Arc<dyn UserDirectory>,
    families: TokenFamilyTracker,
    sessions: SessionStore,
    audit: AuditLog,
    jwt: JwtService,
}

impl SessionManager {
    pub fn new(
        config: &SessionServiceConfig,
        store: Arc<dyn KeyValueStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let settings = &config.session;
        let lock = DistributedLock::new(
            store.clone(),
            LockConfig {
                ttl: settings.lock_ttl(),
                max_retries: settings.lock_max_retries,
                initial_backoff: settings.lock_backoff(),
                ..LockConfig::default()
            },
        );

        Self {
            families: TokenFamilyTracker::new(
                store.clone(),
                lock,
                BreachDetector::new(settings.grace_window()),
                settings.refresh_token_ttl(),
            ),
            sessions: SessionStore::new(store.clone(), settings.session_ttl()),
            audit: AuditLog::new(store.clone(), settings.audit_retention()),
            jwt: JwtService::new(&config.jwt),
            store,
            users,
        }
    }

    pub fn families(&self) -> &TokenFamilyTracker {
        &self.families
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        self.store.ping().await?;
        Ok(())
    }

    pub async fn login(
        &self,
        email: &str,
        password: String,
        client: &ClientMeta,
    ) -> Result<TokenResponse, SessionError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            self.audit
                .append(
                    AuditEvent::new(AuditEventType::LoginFailed)
                        .client(&client.ip_address, &client.user_agent)
                        .metadata(json!({ "reason": "unknown_user" })),
                )
                .await;
            return Err(SessionError::InvalidCredentials);
        };

        if verify_password(&Password::new(password), &user.password_hash).is_err() {
            self.audit
                .append(
                    AuditEvent::new(AuditEventType::LoginFailed)
                        .user(&user.id)
                        .client(&client.ip_address, &client.user_agent)
                        .metadata(json!({ "reason": "bad_password" })),
                )
                .await;
            return Err(SessionError::InvalidCredentials);
        }

        if !user.is_active() {
            self.audit
                .append(
                    AuditEvent::new(AuditEventType::LoginFailed)
                        .user(&user.id)
                        .client(&client.ip_address, &client.user_agent)
                        .metadata(json!({ "reason": "inactive", "status": user.status })),
                )
                .await;
            return Err(SessionError::AccountInactive);
        }

        let issued = self.families.create_family(&user.id).await?;

        let session = match self
            .sessions
            .create(NewSession {
                user_id: user.id.clone(),
                family_id: issued.family_id.clone(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
                auth_level: AUTH_LEVEL_PASSWORD,
                is_admin: user.is_admin,
            })
            .await
        {
            Ok(session) => session,
            Err(e) => {
                // Do not leave a family behind without a session
                if let Err(revoke_err) = self
                    .families
                    .revoke_family(&issued.family_id, RevokeReason::SessionExpired)
                    .await
                {
                    tracing::warn!(error = %revoke_err, family_id = %issued.family_id, "Failed to revoke orphaned token family");
                }
                return Err(e);
            }
        };

        let access_token = self.jwt.generate_access_token(&session)?;

        self.audit
            .append(
                AuditEvent::new(AuditEventType::Login)
                    .user(&user.id)
                    .session(&session.session_id)
                    .family(&issued.family_id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;
        tracing::info!(user_id = %user.id, session_id = %session.session_id, "User logged in");

        Ok(self.token_response(access_token, issued.refresh_token, &session))
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientMeta,
    ) -> Result<TokenResponse, SessionError> {
        let record = self.families.resolve(refresh_token).await?;

        self.ensure_account_active(&record).await?;

        let rotation = match self.families.rotate(&record.family_id, record.generation).await {
            Ok(rotation) => rotation,
            Err(e) if e.is_security_event() => {
                self.record_security_failure(&e, &record, client).await;
                return Err(e);
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(error = %e, family_id = %record.family_id, "Refresh failed transiently");
                }
                return Err(e);
            }
        };

        let session = match self.live_session_for_family(&record.family_id).await? {
            Some(session) => session,
            None => {
                self.families
                    .revoke_family(&record.family_id, RevokeReason::SessionExpired)
                    .await?;
                return Err(SessionError::SessionExpired);
            }
        };

        let access_token = self.jwt.generate_access_token(&session)?;

        let event_type = if rotation.replayed {
            AuditEventType::TokenReplayAccepted
        } else {
            AuditEventType::TokenRefreshed
        };
        self.audit
            .append(
                AuditEvent::new(event_type)
                    .user(&session.user_id)
                    .session(&session.session_id)
                    .family(&record.family_id)
                    .client(&client.ip_address, &client.user_agent)
                    .metadata(json!({
                        "presented_generation": record.generation,
                        "generation": rotation.issued.generation,
                    })),
            )
            .await;

        Ok(self.token_response(access_token, rotation.issued.refresh_token, &session))
    }

    /// End every session and token family of the caller.
    pub async fn logout(
        &self,
        auth: &AuthContext,
        client: &ClientMeta,
    ) -> Result<LogoutSummary, SessionError> {
        let families = self
            .families
            .revoke_all_for_user(&auth.user_id, RevokeReason::Logout)
            .await?;
        let sessions_revoked = self.sessions.invalidate_all_for_user(&auth.user_id).await?;

        self.audit
            .append(
                AuditEvent::new(AuditEventType::Logout)
                    .user(&auth.user_id)
                    .session(&auth.session_id)
                    .client(&client.ip_address, &client.user_agent)
                    .metadata(json!({
                        "sessions_revoked": sessions_revoked,
                        "families_revoked": families.len(),
                    })),
            )
            .await;
        tracing::info!(user_id = %auth.user_id, sessions_revoked, "User logged out");

        Ok(LogoutSummary {
            sessions_revoked,
            families_revoked: families.len(),
        })
    }

    /// Revoke one of the caller's own sessions along with its token family.
    pub async fn revoke_session(
        &self,
        auth: &AuthContext,
        session_id: &str,
        client: &ClientMeta,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .filter(|s| s.user_id == auth.user_id)
            .ok_or(SessionError::SessionNotFound)?;

        self.families
            .revoke_family(&session.family_id, RevokeReason::SessionRevoked)
            .await?;
        self.sessions.invalidate(&session.session_id).await?;

        self.audit
            .append(
                AuditEvent::new(AuditEventType::SessionRevoked)
                    .user(&auth.user_id)
                    .session(&session.session_id)
                    .family(&session.family_id)
                    .client(&client.ip_address, &client.user_agent),
            )
            .await;
        Ok(())
    }

    pub async fn list_sessions(&self, auth: &AuthContext) -> Result<Vec<SessionInfo>, SessionError> {
        Ok(self
            .sessions
            .list_for_user(&auth.user_id)
            .await?
            .into_iter()
            .map(|s| SessionInfo::from_session(s, &auth.session_id))
            .collect())
    }

    /// Validate an access token and confirm its session is still alive.
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthContext, SessionError> {
        let claims = self
            .jwt
            .validate_access_token(access_token)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                SessionError::InvalidToken
            })?;

        let session = self
            .sessions
            .touch(&claims.sid)
            .await?
            .ok_or(SessionError::SessionExpired)?;

        if session.user_id != claims.sub {
            tracing::warn!(session_id = %claims.sid, "Access token subject does not own session");
            return Err(SessionError::InvalidToken);
        }

        Ok(AuthContext {
            user_id: session.user_id,
            session_id: session.session_id,
            family_id: session.family_id,
            is_admin: session.is_admin,
        })
    }

    pub async fn audit_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, SessionError> {
        match user_id {
            Some(user_id) => self.audit.for_user(user_id, limit).await,
            None => self.audit.recent(limit).await,
        }
    }

    /// A deactivated or deleted account cannot keep rotating tokens it
    /// obtained while it was active.
    async fn ensure_account_active(&self, record: &RefreshTokenRecord) -> Result<(), SessionError> {
        let user = self.users.find_by_id(&record.user_id).await?;
        let error = match user {
            Some(user) if user.is_active() => return Ok(()),
            Some(_) => SessionError::AccountInactive,
            None => SessionError::InvalidToken,
        };

        tracing::warn!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            "Refresh rejected for account that is no longer active"
        );
        self.families
            .revoke_family(&record.family_id, RevokeReason::AccountInactive)
            .await?;
        self.sessions.invalidate_for_family(&record.family_id).await?;
        Err(error)
    }

    async fn record_security_failure(
        &self,
        error: &SessionError,
        record: &RefreshTokenRecord,
        client: &ClientMeta,
    ) {
        let mut metadata = json!({ "presented_generation": record.generation });
        let event_type = match error {
            SessionError::TokenReuseDetected => {
                let sessions_revoked = match self.sessions.invalidate_for_family(&record.family_id).await {
                    Ok(count) => count,
                    Err(e) => {
                        tracing::error!(error = %e, family_id = %record.family_id, "Failed to invalidate sessions after reuse");
                        0
                    }
                };
                metadata["sessions_revoked"] = json!(sessions_revoked);
                AuditEventType::TokenReuseDetected
            }
            _ => AuditEventType::RevokedFamilyUsed,
        };

        self.audit
            .append(
                AuditEvent::new(event_type)
                    .user(&record.user_id)
                    .family(&record.family_id)
                    .client(&client.ip_address, &client.user_agent)
                    .metadata(metadata),
            )
            .await;
    }

    async fn live_session_for_family(&self, family_id: &str) -> Result<Option<Session>, SessionError> {
        for session in self.sessions.find_for_family(family_id).await? {
            if let Some(touched) = self.sessions.touch(&session.session_id).await? {
                return Ok(Some(touched));
            }
        }
        Ok(None)
    }

    fn token_response(&self, access_token: String, refresh_token: String, session: &Session) -> TokenResponse {
        TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            session_id: session.session_id.clone(),
        }
    }
}
