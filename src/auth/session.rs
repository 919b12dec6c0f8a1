/// Session Issuer
///
/// Login, refresh-token rotation and logout. Every successful path ends in
/// `issue`, which mints an access/refresh pair and records the refresh token in
/// the ledger, revoking its predecessor in the same atomic step when rotating.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::AuditLog;
use crate::auth::jwt::{hash_token, TokenCodec};
use crate::auth::password::{verify_against_dummy, verify_password};
use crate::domain::{NewRefreshToken, RefreshTokenRecord, User};
use crate::error::{AppError, AuthError};
use crate::store::{RefreshTokenLedger, Store, UserStore};

const RESOURCE: &str = "session";

/// Token pair handed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds
    pub expires_in: i64,
    /// Seconds
    pub refresh_expires_in: i64,
}

#[derive(Clone)]
pub struct SessionIssuer {
    codec: TokenCodec,
    store: Arc<dyn Store>,
}

impl SessionIssuer {
    pub fn new(codec: TokenCodec, store: Arc<dyn Store>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Exchange email and password for a fresh token pair
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown email or a wrong password
    /// - `AccountDisabled` for an inactive or soft-deleted account
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AppError> {
        let user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                verify_against_dummy(password);
                AuditLog::failure("LOGIN", RESOURCE, "Unknown email").emit();
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !user.can_sign_in() {
            AuditLog::failure("LOGIN", RESOURCE, "Account disabled")
                .with_user_id(user.id)
                .emit();
            return Err(AuthError::AccountDisabled.into());
        }

        if !verify_password(password, &user.password_hash) {
            AuditLog::failure("LOGIN", RESOURCE, "Wrong password")
                .with_user_id(user.id)
                .emit();
            return Err(AuthError::InvalidCredentials.into());
        }

        self.store.touch_last_login(user.id, Utc::now()).await?;

        let tokens = self.issue(&user, None).await?;
        AuditLog::success("LOGIN", RESOURCE, "User logged in")
            .with_user_id(user.id)
            .emit();
        Ok(tokens)
    }

    /// Rotate a refresh token into a new pair
    ///
    /// # Errors
    /// - `TokenInvalid` when the token does not decode, is not a refresh token, has
    ///   no ledger row, was revoked, has expired, does not hash to the recorded
    ///   digest, or belongs to a user that no longer exists
    /// - `AccountDisabled` when the owner is inactive
    /// - a conflict when a concurrent rotation of the same token won the race
    pub async fn refresh(&self, raw_token: &str) -> Result<TokenResponse, AppError> {
        let claims = self.codec.decode(raw_token).ok_or(AuthError::TokenInvalid)?;
        let (user_id, jti) = claims.refresh_subject().ok_or(AuthError::TokenInvalid)?;

        let stored = match self.store.find(user_id, jti).await? {
            Some(row) => row,
            None => {
                AuditLog::failure("REFRESH", RESOURCE, "Refresh token not in ledger")
                    .with_user_id(user_id)
                    .emit();
                return Err(AuthError::TokenInvalid.into());
            }
        };

        if stored.is_revoked() {
            // Reuse of a rotated or logged-out token. Rejected, nothing else revoked.
            AuditLog::failure("REFRESH_TOKEN_REUSE", RESOURCE, "Revoked refresh token presented")
                .with_user_id(user_id)
                .with_resource_id(&stored.jti)
                .emit();
            return Err(AuthError::TokenInvalid.into());
        }

        if !stored.is_usable_at(Utc::now(), &hash_token(raw_token)) {
            AuditLog::failure("REFRESH", RESOURCE, "Refresh token expired or hash mismatch")
                .with_user_id(user_id)
                .with_resource_id(&stored.jti)
                .emit();
            return Err(AuthError::TokenInvalid.into());
        }

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if !user.is_active() {
            AuditLog::failure("REFRESH", RESOURCE, "Account disabled")
                .with_user_id(user.id)
                .emit();
            return Err(AuthError::AccountDisabled.into());
        }

        let tokens = self.issue(&user, Some(&stored)).await?;
        AuditLog::success("REFRESH", RESOURCE, "Refresh token rotated")
            .with_user_id(user.id)
            .with_resource_id(&stored.jti)
            .emit();
        Ok(tokens)
    }

    /// Revoke a refresh token
    ///
    /// Idempotent: a well-formed refresh token that is unknown or already revoked
    /// still succeeds. Only a token that fails to decode is an error.
    pub async fn logout(&self, raw_token: &str) -> Result<(), AppError> {
        let claims = self.codec.decode(raw_token).ok_or(AuthError::TokenInvalid)?;
        let (user_id, jti) = claims.refresh_subject().ok_or(AuthError::TokenInvalid)?;

        if let Some(row) = self.store.find(user_id, jti).await? {
            if !row.is_revoked() && self.store.revoke(&row, None).await? {
                AuditLog::success("LOGOUT", RESOURCE, "Refresh token revoked")
                    .with_user_id(user_id)
                    .with_resource_id(&row.jti)
                    .emit();
                return Ok(());
            }
        }

        tracing::debug!(user_id = user_id, "Logout with unknown or already revoked token");
        Ok(())
    }

    async fn issue(
        &self,
        user: &User,
        rotate_from: Option<&RefreshTokenRecord>,
    ) -> Result<TokenResponse, AppError> {
        let access_token = self.codec.encode_access(user.id, user.role)?;
        let refresh = self.codec.encode_refresh(user.id)?;

        let entry = NewRefreshToken {
            user_id: user.id,
            jti: refresh.jti,
            token_hash: hash_token(&refresh.token),
            expires_at: refresh.expires_at,
        };

        match rotate_from {
            Some(predecessor) => self.store.record_rotation(entry, predecessor).await?,
            None => self.store.record(entry).await?,
        };

        Ok(TokenResponse {
            access_token,
            refresh_token: refresh.token,
            token_type: "bearer".to_string(),
            expires_in: self.codec.access_ttl().num_seconds(),
            refresh_expires_in: self.codec.refresh_ttl().num_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::configuration::JwtSettings;
    use crate::domain::{NewUser, Role};
    use crate::store::{InMemoryStore, RefreshTokenLedger, UserStore};
    use chrono::Duration;

    const EMAIL: &str = "alice@x.com";
    const PASSWORD: &str = "Str0ng!pass";

    fn codec() -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            secret: "session-test-secret-session-test-secret".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        })
        .unwrap()
    }

    async fn setup() -> (Arc<InMemoryStore>, SessionIssuer, User) {
        let store = Arc::new(InMemoryStore::new());
        let user = store
            .create_user(NewUser {
                name: Some("Alice".to_string()),
                username: "alice".to_string(),
                email_id: EMAIL.to_string(),
                password_hash: hash_password(PASSWORD).unwrap(),
                is_verify: true,
                role: Role::User,
                created_by: None,
            })
            .await
            .unwrap();
        let issuer = SessionIssuer::new(codec(), store.clone());
        (store, issuer, user)
    }

    fn jti_of(issuer: &SessionIssuer, token: &str) -> String {
        issuer
            .codec()
            .decode(token)
            .and_then(|c| c.jti)
            .expect("refresh token carries a jti")
    }

    #[tokio::test]
    async fn test_login_issues_pair_and_records_ledger_row() {
        let (store, issuer, user) = setup().await;

        let tokens = issuer.login(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(tokens.token_type, "bearer");
        assert_eq!(tokens.expires_in, 30 * 60);
        assert_eq!(tokens.refresh_expires_in, 7 * 86_400);

        let access = issuer.codec().decode(&tokens.access_token).unwrap();
        assert_eq!(access.access_subject(), Some(user.id));
        assert!(issuer.codec().decode(&tokens.refresh_token).unwrap().is_refresh());

        let rows = store.refresh_tokens_for(user.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_hash, hash_token(&tokens.refresh_token));
        assert_ne!(rows[0].token_hash, tokens.refresh_token);

        let reloaded = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.last_login.is_some());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (_store, issuer, _user) = setup().await;

        let unknown = issuer.login("nobody@x.com", PASSWORD).await.unwrap_err();
        let wrong = issuer.login(EMAIL, "Wr0ng!pass").await.unwrap_err();

        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_login() {
        let (store, issuer, user) = setup().await;
        store.set_active(user.id, false, user.id).await.unwrap();

        let err = issuer.login(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn test_rotation_chain_and_reuse_rejected() {
        let (store, issuer, user) = setup().await;

        let first = issuer.login(EMAIL, PASSWORD).await.unwrap();
        let second = issuer.refresh(&first.refresh_token).await.unwrap();
        let third = issuer.refresh(&second.refresh_token).await.unwrap();

        let first_jti = jti_of(&issuer, &first.refresh_token);
        let second_jti = jti_of(&issuer, &second.refresh_token);
        let third_jti = jti_of(&issuer, &third.refresh_token);

        let original = store.find(user.id, &first_jti).await.unwrap().unwrap();
        assert!(original.is_revoked());
        assert_eq!(original.replaced_by_jti.as_deref(), Some(second_jti.as_str()));

        let middle = store.find(user.id, &second_jti).await.unwrap().unwrap();
        assert_eq!(middle.replaced_by_jti.as_deref(), Some(third_jti.as_str()));

        let err = issuer.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));

        // Reuse does not take down the live end of the chain
        assert!(issuer.refresh(&third.refresh_token).await.is_ok());
        assert_eq!(store.refresh_tokens_for(user.id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token_and_garbage() {
        let (_store, issuer, _user) = setup().await;
        let tokens = issuer.login(EMAIL, PASSWORD).await.unwrap();

        for bad in [tokens.access_token.as_str(), "garbage", ""] {
            let err = issuer.refresh(bad).await.unwrap_err();
            assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
        }
    }

    #[tokio::test]
    async fn test_refresh_rejects_hash_mismatch() {
        let (store, issuer, user) = setup().await;

        // Validly signed, but the ledger holds a different digest for this jti
        let issued = issuer.codec().encode_refresh(user.id).unwrap();
        store
            .record(NewRefreshToken {
                user_id: user.id,
                jti: issued.jti.clone(),
                token_hash: hash_token("some other token"),
                expires_at: issued.expires_at,
            })
            .await
            .unwrap();

        let err = issuer.refresh(&issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_ledger_row() {
        let (store, issuer, user) = setup().await;

        let issued = issuer.codec().encode_refresh(user.id).unwrap();
        store
            .record(NewRefreshToken {
                user_id: user.id,
                jti: issued.jti.clone(),
                token_hash: hash_token(&issued.token),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();

        let err = issuer.refresh(&issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_refresh_for_disabled_user_is_forbidden() {
        let (store, issuer, user) = setup().await;
        let tokens = issuer.login(EMAIL, PASSWORD).await.unwrap();
        store.set_active(user.id, false, user.id).await.unwrap();

        let err = issuer.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (store, issuer, user) = setup().await;
        let tokens = issuer.login(EMAIL, PASSWORD).await.unwrap();
        let jti = jti_of(&issuer, &tokens.refresh_token);

        issuer.logout(&tokens.refresh_token).await.unwrap();
        let revoked_at = store.find(user.id, &jti).await.unwrap().unwrap().revoked_at;
        assert!(revoked_at.is_some());

        issuer.logout(&tokens.refresh_token).await.unwrap();
        let row = store.find(user.id, &jti).await.unwrap().unwrap();
        assert_eq!(row.revoked_at, revoked_at);
        assert!(row.replaced_by_jti.is_none());

        let err = issuer.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_logout_rejects_undecodable_token() {
        let (_store, issuer, _user) = setup().await;

        let err = issuer.logout("not-a-token").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));

        // Well-formed but never recorded: silent success
        let stray = issuer.codec().encode_refresh(1).unwrap();
        assert!(issuer.logout(&stray.token).await.is_ok());
    }
}
