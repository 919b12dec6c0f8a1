use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{RefreshTokenLedger, UserFilter, UserStore};
use crate::domain::{Lifecycle, NewRefreshToken, NewUser, RefreshTokenRecord, Role, User};
use crate::error::AppError;
use crate::validators::{MAX_NAME_LENGTH, MAX_USERNAME_LENGTH};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<i64, RefreshTokenRecord>,
    next_user_id: i64,
    next_token_id: i64,
}

impl State {
    fn user_mut(&mut self, id: i64) -> Result<&mut User, AppError> {
        self.users
            .get_mut(&id)
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| AppError::not_found("User"))
    }

    fn insert_token(&mut self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let collides = self
            .tokens
            .values()
            .any(|t| t.jti == token.jti || t.token_hash == token.token_hash);
        if collides {
            return Err(AppError::conflict("Refresh token conflict"));
        }

        self.next_token_id += 1;
        let record = RefreshTokenRecord {
            id: self.next_token_id,
            user_id: token.user_id,
            jti: token.jti,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked_at: None,
            replaced_by_jti: None,
            created_at: Utc::now(),
        };
        self.tokens.insert(record.id, record.clone());
        Ok(record)
    }
}

/// Mutex-guarded store for tests and database-less local runs
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
    }

    /// Every ledger row owned by `user_id`, oldest first.
    pub fn refresh_tokens_for(&self, user_id: i64) -> Result<Vec<RefreshTokenRecord>, AppError> {
        Ok(self
            .state()?
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

fn matches_filter(user: &User, filter: &UserFilter) -> bool {
    if !filter.include_deleted && user.is_deleted() {
        return false;
    }
    if let Some(role) = filter.role {
        if user.role != role {
            return false;
        }
    }
    if let Some(active) = filter.is_active {
        if user.is_active() != active {
            return false;
        }
    }
    if let Some(search) = filter.search.as_deref() {
        let needle = search.trim().to_lowercase();
        let hit = user
            .name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false)
            || user.username.to_lowercase().contains(&needle)
            || user.email_id.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let name_too_long = user
            .name
            .as_deref()
            .map_or(false, |n| n.chars().count() > MAX_NAME_LENGTH);
        if name_too_long || user.username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(AppError::Internal("value too long for users column".to_string()));
        }

        let mut state = self.state()?;

        if state.users.values().any(|u| u.email_id == user.email_id) {
            return Err(AppError::conflict("Email already registered"));
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(AppError::conflict("Username already taken"));
        }

        state.next_user_id += 1;
        let created = User {
            id: state.next_user_id,
            name: user.name,
            username: user.username,
            email_id: user.email_id,
            password_hash: user.password_hash,
            is_verify: user.is_verify,
            role: user.role,
            last_login: None,
            lifecycle: Lifecycle::new(user.created_by),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email_id: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email_id == email_id)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self
            .state()?
            .users
            .get(&id)
            .filter(|u| !u.is_deleted())
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        Ok(self.state()?.users.values().any(|u| u.username == username))
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.state()?;
        state.user_mut(id)?.last_login = Some(at);
        Ok(())
    }

    async fn update_role(&self, id: i64, role: Role, actor: i64) -> Result<User, AppError> {
        let mut state = self.state()?;
        let user = state.user_mut(id)?;
        user.role = role;
        user.lifecycle.touch(Some(actor));
        Ok(user.clone())
    }

    async fn set_active(&self, id: i64, active: bool, actor: i64) -> Result<User, AppError> {
        let mut state = self.state()?;
        let user = state.user_mut(id)?;
        user.lifecycle.is_active = active;
        user.lifecycle.touch(Some(actor));
        Ok(user.clone())
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        let user = state.user_mut(id)?;
        user.password_hash = password_hash.to_string();
        user.lifecycle.touch(Some(id));
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<(i64, Vec<User>), AppError> {
        let state = self.state()?;
        let matching: Vec<&User> = state
            .users
            .values()
            .filter(|u| matches_filter(u, filter))
            .collect();

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((total, page))
    }
}

#[async_trait]
impl RefreshTokenLedger for InMemoryStore {
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        self.state()?.insert_token(token)
    }

    async fn record_rotation(
        &self,
        token: NewRefreshToken,
        predecessor: &RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, AppError> {
        // The lock spans the check, the insert and the revoke.
        let mut state = self.state()?;

        let still_open = state
            .tokens
            .get(&predecessor.id)
            .map(|t| t.revoked_at.is_none())
            .unwrap_or(false);
        if !still_open {
            return Err(AppError::conflict("Refresh token already rotated"));
        }

        let record = state.insert_token(token)?;
        if let Some(old) = state.tokens.get_mut(&predecessor.id) {
            old.revoked_at = Some(Utc::now());
            old.replaced_by_jti = Some(record.jti.clone());
        }
        Ok(record)
    }

    async fn find(&self, user_id: i64, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self
            .state()?
            .tokens
            .values()
            .find(|t| t.user_id == user_id && t.jti == jti)
            .cloned())
    }

    async fn revoke(
        &self,
        token: &RefreshTokenRecord,
        replaced_by_jti: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.tokens.get_mut(&token.id) {
            Some(row) if row.revoked_at.is_none() => {
                row.revoked_at = Some(Utc::now());
                if let Some(jti) = replaced_by_jti {
                    row.replaced_by_jti = Some(jti.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
