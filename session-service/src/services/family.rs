//! Refresh-token families.
//!
//! Every login starts a family at generation 0. Each successful refresh
//! advances the generation by one and mints a new opaque token bound to it.
//! All mutations of a family happen under `lock:family:<id>` so two
//! concurrent rotations can never both advance from the same generation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::breach::{BreachDetector, BreachResult};
use super::error::SessionError;
use super::lock::{DistributedLock, LockToken};
use crate::models::{generate_refresh_token, hash_token, RefreshTokenRecord, RevokeReason, TokenFamily};
use crate::store::{keys, Expiry, KeyValueStore, SetCondition};

/// Plaintext refresh token handed to the client. Only its hash is stored.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub family_id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub generation: u64,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a successful [`TokenFamilyTracker::rotate`].
#[derive(Debug, Clone)]
pub struct Rotation {
    pub issued: IssuedRefreshToken,
    /// The previous generation was honoured once inside the grace window.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct TokenFamilyTracker {
    store: Arc<dyn KeyValueStore>,
    lock: DistributedLock,
    detector: BreachDetector,
    refresh_ttl: Duration,
}

impl TokenFamilyTracker {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        detector: BreachDetector,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            detector,
            refresh_ttl,
        }
    }

    /// Start a new family for a fresh login.
    pub async fn create_family(&self, user_id: &str) -> Result<IssuedRefreshToken, SessionError> {
        let family = TokenFamily::new(user_id);
        let json = serde_json::to_string(&family)?;

        let created = self
            .store
            .set(
                &keys::family(&family.family_id),
                &json,
                Expiry::After(self.refresh_ttl),
                SetCondition::IfAbsent,
            )
            .await?;
        if !created {
            return Err(SessionError::Internal(anyhow::anyhow!(
                "Token family id collision: {}",
                family.family_id
            )));
        }

        let user_families = keys::user_families(user_id);
        self.store.set_add(&user_families, &family.family_id).await?;
        self.store.expire(&user_families, self.refresh_ttl).await?;

        let issued = self.issue(&family, family.generation).await?;

        tracing::info!(user_id = %user_id, family_id = %family.family_id, "Token family created");
        Ok(issued)
    }

    /// Look up what a presented refresh token points at.
    ///
    /// Tokens of superseded generations still resolve until they expire;
    /// that is what makes reuse detectable.
    pub async fn resolve(&self, refresh_token: &str) -> Result<RefreshTokenRecord, SessionError> {
        let raw = self
            .store
            .get(&keys::refresh_token(&hash_token(refresh_token)))
            .await?
            .ok_or(SessionError::InvalidToken)?;

        let record: RefreshTokenRecord = serde_json::from_str(&raw)?;
        if record.is_expired() {
            return Err(SessionError::InvalidToken);
        }
        Ok(record)
    }

    /// Redeem `presented_generation` of a family for a new refresh token.
    ///
    /// A breach revokes the family before returning
    /// [`SessionError::TokenReuseDetected`]; the caller is responsible for
    /// tearing down sessions bound to it.
    pub async fn rotate(
        &self,
        family_id: &str,
        presented_generation: u64,
    ) -> Result<Rotation, SessionError> {
        let lock_key = keys::family_lock(family_id);
        let token = self.lock.acquire_with_retry(&lock_key).await?;

        let result = self.rotate_locked(family_id, presented_generation).await;
        self.release(&lock_key, &token).await;
        result
    }

    async fn rotate_locked(
        &self,
        family_id: &str,
        presented_generation: u64,
    ) -> Result<Rotation, SessionError> {
        let mut family = read_family(self.store.as_ref(), family_id)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        if family.revoked {
            tracing::warn!(
                family_id = %family_id,
                user_id = %family.user_id,
                presented_generation,
                "Refresh attempted on revoked token family"
            );
            return Err(SessionError::FamilyRevoked);
        }

        let now = Utc::now();
        match self.detector.check(&family, presented_generation, now) {
            BreachResult::Ok => {
                let generation = family.advance(now);
                self.write_family(&family, Expiry::After(self.refresh_ttl), SetCondition::Always)
                    .await?;
                // Keep the family reachable from logout for as long as it lives.
                self.store
                    .expire(&keys::user_families(&family.user_id), self.refresh_ttl)
                    .await?;
                let issued = self.issue(&family, generation).await?;

                tracing::debug!(family_id = %family_id, generation, "Token family rotated");
                Ok(Rotation {
                    issued,
                    replayed: false,
                })
            }
            BreachResult::GraceReplay => {
                // Sibling of the current generation; does not advance.
                family.grace_consumed = true;
                if !self
                    .write_family(&family, Expiry::Keep, SetCondition::IfPresent)
                    .await?
                {
                    return Err(SessionError::InvalidToken);
                }
                let issued = self.issue(&family, family.generation).await?;

                tracing::warn!(
                    family_id = %family_id,
                    user_id = %family.user_id,
                    presented_generation,
                    current_generation = family.generation,
                    "Previous refresh generation honoured inside grace window"
                );
                Ok(Rotation {
                    issued,
                    replayed: true,
                })
            }
            BreachResult::Breach => {
                family.revoke(RevokeReason::ReuseDetected, now);
                self.write_family(&family, Expiry::Keep, SetCondition::IfPresent)
                    .await?;

                tracing::error!(
                    family_id = %family_id,
                    user_id = %family.user_id,
                    presented_generation,
                    current_generation = family.generation,
                    "Refresh token reuse detected, token family revoked"
                );
                Err(SessionError::TokenReuseDetected)
            }
        }
    }

    /// Revoke a family. Returns `false` when it was missing or already revoked.
    pub async fn revoke_family(
        &self,
        family_id: &str,
        reason: RevokeReason,
    ) -> Result<bool, SessionError> {
        let lock_key = keys::family_lock(family_id);
        let token = self.lock.acquire_with_retry(&lock_key).await?;

        let result = self.revoke_locked(family_id, reason).await;
        self.release(&lock_key, &token).await;
        result
    }

    async fn revoke_locked(
        &self,
        family_id: &str,
        reason: RevokeReason,
    ) -> Result<bool, SessionError> {
        let Some(mut family) = read_family(self.store.as_ref(), family_id).await? else {
            return Ok(false);
        };
        if family.revoked {
            return Ok(false);
        }

        family.revoke(reason, Utc::now());
        // Revoked families are kept until natural expiry so late reuse is still recognised.
        // XX: a family that expired after the read must not come back without a TTL.
        let written = self
            .write_family(&family, Expiry::Keep, SetCondition::IfPresent)
            .await?;
        self.store
            .set_remove(&keys::user_families(&family.user_id), family_id)
            .await?;
        if !written {
            tracing::debug!(family_id = %family_id, "Token family expired before revocation");
            return Ok(false);
        }

        tracing::info!(
            family_id = %family_id,
            user_id = %family.user_id,
            reason = reason.as_str(),
            "Token family revoked"
        );
        Ok(true)
    }

    /// Revoke every live family of a user. Returns the ids actually revoked.
    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        reason: RevokeReason,
    ) -> Result<Vec<String>, SessionError> {
        let family_ids = self.store.set_members(&keys::user_families(user_id)).await?;

        let mut revoked = Vec::new();
        for family_id in family_ids {
            if self.revoke_family(&family_id, reason).await? {
                revoked.push(family_id);
            } else {
                self.store
                    .set_remove(&keys::user_families(user_id), &family_id)
                    .await?;
            }
        }
        Ok(revoked)
    }

    pub async fn get_family(&self, family_id: &str) -> Result<Option<TokenFamily>, SessionError> {
        read_family(self.store.as_ref(), family_id).await
    }

    pub async fn is_active(&self, family_id: &str) -> Result<bool, SessionError> {
        Ok(self
            .get_family(family_id)
            .await?
            .is_some_and(|family| !family.revoked))
    }

    async fn issue(
        &self,
        family: &TokenFamily,
        generation: u64,
    ) -> Result<IssuedRefreshToken, SessionError> {
        let refresh_token = generate_refresh_token();
        let issued_at = Utc::now();
        let expires_at = issued_at
            + ChronoDuration::from_std(self.refresh_ttl).unwrap_or(ChronoDuration::zero());

        let record = RefreshTokenRecord {
            family_id: family.family_id.clone(),
            user_id: family.user_id.clone(),
            generation,
            issued_at,
            expires_at,
        };
        self.store
            .set(
                &keys::refresh_token(&hash_token(&refresh_token)),
                &serde_json::to_string(&record)?,
                Expiry::After(self.refresh_ttl),
                SetCondition::Always,
            )
            .await?;

        Ok(IssuedRefreshToken {
            family_id: family.family_id.clone(),
            user_id: family.user_id.clone(),
            refresh_token,
            generation,
            expires_at,
        })
    }

    /// Returns `false` when `condition` prevented the write.
    async fn write_family(
        &self,
        family: &TokenFamily,
        expiry: Expiry,
        condition: SetCondition,
    ) -> Result<bool, SessionError> {
        Ok(self
            .store
            .set(
                &keys::family(&family.family_id),
                &serde_json::to_string(family)?,
                expiry,
                condition,
            )
            .await?)
    }

    async fn release(&self, lock_key: &str, token: &LockToken) {
        match self.lock.release(lock_key, token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(lock = %lock_key, "Lock expired before release");
            }
            Err(e) => {
                tracing::warn!(lock = %lock_key, error = %e, "Failed to release lock");
            }
        }
    }
}

pub(crate) async fn read_family(
    store: &dyn KeyValueStore,
    family_id: &str,
) -> Result<Option<TokenFamily>, SessionError> {
    match store.get(&keys::family(family_id)).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}
