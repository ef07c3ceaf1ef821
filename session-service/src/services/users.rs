//! Read-only access to the identity store.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{User, UserRow};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error>;
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error>;
}

/// Users owned by the relational store.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn convert(row: Option<UserRow>) -> Result<Option<User>, anyhow::Error> {
        row.map(|row| User::try_from(row).map_err(|e| anyhow::anyhow!(e)))
            .transpose()
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, status, password_hash, is_admin FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database error: {}", e))?;

        Self::convert(row)
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        // Non-UUID ids cannot exist in the table
        let Ok(id) = uuid::Uuid::parse_str(user_id) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, status, password_hash, is_admin FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database error: {}", e))?;

        Self::convert(row)
    }
}

/// Process-local directory for tests and development.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) -> Result<(), anyhow::Error> {
        self.users
            .write()
            .map_err(|e| anyhow::anyhow!("User directory poisoned: {}", e))?
            .insert(user.id.clone(), user);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let users = self
            .users
            .read()
            .map_err(|e| anyhow::anyhow!("User directory poisoned: {}", e))?;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        let users = self
            .users
            .read()
            .map_err(|e| anyhow::anyhow!("User directory poisoned: {}", e))?;
        Ok(users.get(user_id).cloned())
    }
}
