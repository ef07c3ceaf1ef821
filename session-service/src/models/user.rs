use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The relational store has used both cases for this column
        match s.to_lowercase().as_str() {
            "pending" => Ok(UserStatus::Pending),
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

/// Identity record owned by the relational store; read-only here.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub status: UserStatus,
    pub password_hash: String,
    pub is_admin: bool,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: uuid::Uuid,
    pub email: String,
    pub status: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl TryFrom<UserRow> for User {
    type Error = String;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.to_string(),
            email: row.email,
            status: row.status.parse()?,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
        })
    }
}
