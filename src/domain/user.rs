use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Account role; stored and serialized lowercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(ValidationError::Rejected("Invalid role".to_string())),
        }
    }
}

/// Soft-delete and audit columns shared by every persisted entity
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub modify_by: Option<i64>,
    pub modify_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn new(created_by: Option<i64>) -> Self {
        Self {
            is_active: true,
            is_deleted: false,
            created_by,
            created_at: Utc::now(),
            modify_by: None,
            modify_at: None,
            deleted_by: None,
            deleted_at: None,
        }
    }

    /// Records a modification by `actor` at the current instant.
    pub fn touch(&mut self, actor: Option<i64>) {
        self.modify_by = actor;
        self.modify_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub username: String,
    pub email_id: String,
    pub password_hash: String,
    pub is_verify: bool,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
    pub lifecycle: Lifecycle,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted
    }

    /// Active and not soft-deleted
    pub fn can_sign_in(&self) -> bool {
        self.is_active() && !self.is_deleted()
    }
}

/// Insert payload for a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub username: String,
    pub email_id: String,
    pub password_hash: String,
    pub is_verify: bool,
    pub role: Role,
    pub created_by: Option<i64>,
}

/// Body of `GET /auth/me`
#[derive(Debug, Serialize)]
pub struct AuthUserResponse {
    pub id: i64,
    pub name: Option<String>,
    pub username: String,
    pub email_id: String,
    pub role: Role,
    pub is_verify: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for AuthUserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email_id: user.email_id.clone(),
            role: user.role,
            is_verify: user.is_verify,
            last_login: user.last_login,
        }
    }
}

/// User representation for the `/users` endpoints
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: Option<String>,
    pub username: String,
    pub email_id: String,
    pub is_verify: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub role: Role,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modify_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email_id: user.email_id.clone(),
            is_verify: user.is_verify,
            last_login: user.last_login,
            role: user.role,
            is_active: user.lifecycle.is_active,
            is_deleted: user.lifecycle.is_deleted,
            created_at: user.lifecycle.created_at,
            modify_at: user.lifecycle.modify_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" user ".parse::<Role>().unwrap(), Role::User);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_lifecycle_touch() {
        let mut lifecycle = Lifecycle::new(None);
        assert!(lifecycle.is_active);
        assert!(lifecycle.modify_at.is_none());

        lifecycle.touch(Some(3));
        assert_eq!(lifecycle.modify_by, Some(3));
        assert!(lifecycle.modify_at.is_some());
    }
}
