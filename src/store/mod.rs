/// Persistence seam
///
/// The relational store is reached only through these traits. `PgStore` is the
/// production implementation; `InMemoryStore` enforces the same uniqueness and
/// atomicity rules without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NewRefreshToken, NewUser, RefreshTokenRecord, Role, User};
use crate::error::AppError;

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Filters for the admin user listing
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            role: None,
            is_active: None,
            search: None,
            include_deleted: false,
            limit: 20,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with a conflict when the email or username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Includes disabled and soft-deleted rows; callers decide what to do with them.
    async fn find_user_by_email(&self, email_id: &str) -> Result<Option<User>, AppError>;

    /// Non-deleted users only.
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn update_role(&self, id: i64, role: Role, actor: i64) -> Result<User, AppError>;

    async fn set_active(&self, id: i64, active: bool, actor: i64) -> Result<User, AppError>;

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError>;

    /// Returns the total match count and the requested page, ordered by id.
    async fn list_users(&self, filter: &UserFilter) -> Result<(i64, Vec<User>), AppError>;
}

/// Refresh token ledger
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Fails with a conflict if `jti` or `token_hash` already exist.
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError>;

    /// Inserts `token` and revokes `predecessor` (linking it to the new jti) as one
    /// atomic unit. If the predecessor was revoked in the meantime nothing is written
    /// and a conflict is returned.
    async fn record_rotation(
        &self,
        token: NewRefreshToken,
        predecessor: &RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, AppError>;

    async fn find(&self, user_id: i64, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Sets `revoked_at` if it is still unset. Returns whether this call revoked the row.
    async fn revoke(
        &self,
        token: &RefreshTokenRecord,
        replaced_by_jti: Option<&str>,
    ) -> Result<bool, AppError>;
}

pub trait Store: UserStore + RefreshTokenLedger {}

impl<T: UserStore + RefreshTokenLedger> Store for T {}
