use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};

use super::{RefreshTokenLedger, UserFilter, UserStore};
use crate::domain::{Lifecycle, NewRefreshToken, NewUser, RefreshTokenRecord, Role, User};
use crate::error::AppError;

const USER_COLUMNS: &str = "id, name, username, email_id, password_hash, is_verify, role, \
    last_login, is_active, is_deleted, created_by, created_at, modify_by, modify_at, \
    deleted_by, deleted_at";

const TOKEN_COLUMNS: &str =
    "id, user_id, jti, token_hash, expires_at, revoked_at, replaced_by_jti, created_at";

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            username: row.try_get("username")?,
            email_id: row.try_get("email_id")?,
            password_hash: row.try_get("password_hash")?,
            is_verify: row.try_get("is_verify")?,
            role,
            last_login: row.try_get("last_login")?,
            lifecycle: Lifecycle {
                is_active: row.try_get("is_active")?,
                is_deleted: row.try_get("is_deleted")?,
                created_by: row.try_get("created_by")?,
                created_at: row.try_get("created_at")?,
                modify_by: row.try_get("modify_by")?,
                modify_at: row.try_get("modify_at")?,
                deleted_by: row.try_get("deleted_by")?,
                deleted_at: row.try_get("deleted_at")?,
            },
        })
    }
}

impl<'r> FromRow<'r, PgRow> for RefreshTokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RefreshTokenRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            jti: row.try_get("jti")?,
            token_hash: row.try_get("token_hash")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
            replaced_by_jti: row.try_get("replaced_by_jti")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Substring pattern for `ILIKE ... ESCAPE '\'`; `%`, `_` and `\` match literally.
fn search_pattern(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(|s| {
        let mut pattern = String::with_capacity(s.len() + 2);
        pattern.push('%');
        for c in s.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, username, email_id, password_hash, is_verify, role, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email_id)
        .bind(&user.password_hash)
        .bind(user.is_verify)
        .bind(user.role.as_str())
        .bind(user.created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_user_by_email(&self, email_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email_id = $1",
            USER_COLUMNS
        ))
        .bind(email_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND is_deleted = FALSE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_role(&self, id: i64, role: Role, actor: i64) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET role = $1, modify_by = $2, modify_at = $3
            WHERE id = $4 AND is_deleted = FALSE
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .bind(actor)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
    }

    async fn set_active(&self, id: i64, active: bool, actor: i64) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET is_active = $1, modify_by = $2, modify_at = $3
            WHERE id = $4 AND is_deleted = FALSE
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(active)
        .bind(actor)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET password_hash = $1, modify_by = $2, modify_at = $3
            WHERE id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(password_hash)
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User"));
        }
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<(i64, Vec<User>), AppError> {
        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL
                   OR name ILIKE $3 ESCAPE '\'
                   OR username ILIKE $3 ESCAPE '\'
                   OR email_id ILIKE $3 ESCAPE '\')
              AND ($4 OR is_deleted = FALSE)
        "#;

        let role = filter.role.map(|r| r.as_str());
        let pattern = search_pattern(filter.search.as_deref());

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM users {}", WHERE))
            .bind(role)
            .bind(filter.is_active)
            .bind(&pattern)
            .bind(filter.include_deleted)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users {} ORDER BY id ASC LIMIT $5 OFFSET $6",
            USER_COLUMNS, WHERE
        ))
        .bind(role)
        .bind(filter.is_active)
        .bind(&pattern)
        .bind(filter.include_deleted)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((total, items))
    }
}

#[async_trait]
impl RefreshTokenLedger for PgStore {
    async fn record(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(token.user_id)
        .bind(&token.jti)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_rotation(
        &self,
        token: NewRefreshToken,
        predecessor: &RefreshTokenRecord,
    ) -> Result<RefreshTokenRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(token.user_id)
        .bind(&token.jti)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_one(&mut tx)
        .await?;

        // A concurrent rotation of the same predecessor blocks on the row lock here and
        // then sees revoked_at already set.
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = $1, replaced_by_jti = $2
            WHERE id = $3 AND revoked_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(&record.jti)
        .bind(predecessor.id)
        .execute(&mut tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(AppError::conflict("Refresh token already rotated"));
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn find(&self, user_id: i64, jti: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {} FROM refresh_tokens WHERE user_id = $1 AND jti = $2",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(
        &self,
        token: &RefreshTokenRecord,
        replaced_by_jti: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1, replaced_by_jti = COALESCE($2, replaced_by_jti)
            WHERE id = $3 AND revoked_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(replaced_by_jti)
        .bind(token.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
