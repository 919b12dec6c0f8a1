/// Authorization Guard
///
/// Resolves a bearer access token to an active user and applies role filters.
/// Access tokens are stateless: no ledger lookup happens here.

use crate::auth::jwt::TokenCodec;
use crate::domain::{Role, User};
use crate::error::{AppError, AuthError};
use crate::store::{Store, UserStore};

/// Extract the credential from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Validate an access token and load its user
///
/// # Errors
/// - `TokenInvalid` (401): undecodable, not an access token, no `user_id`, or the
///   user is unknown or soft-deleted
/// - `AccountDisabled` (403): the user exists but is inactive
pub async fn authenticate(
    codec: &TokenCodec,
    store: &dyn Store,
    token: &str,
) -> Result<User, AppError> {
    let claims = codec.decode(token).ok_or_else(|| {
        tracing::debug!("Access token failed to decode");
        AppError::Auth(AuthError::TokenInvalid)
    })?;

    let user_id = claims.access_subject().ok_or_else(|| {
        tracing::debug!(token_type = ?claims.token_type, "Token is not a usable access token");
        AppError::Auth(AuthError::TokenInvalid)
    })?;

    let user = store.find_user_by_id(user_id).await?.ok_or_else(|| {
        tracing::debug!(user_id = user_id, "Access token subject not found");
        AppError::Auth(AuthError::TokenInvalid)
    })?;

    if !user.is_active() {
        return Err(AppError::Auth(AuthError::AccountDisabled));
    }

    Ok(user)
}

/// Pass `user` through only if its role is in `allowed`.
pub fn require_role<'a>(user: &'a User, allowed: &[Role]) -> Result<&'a User, AppError> {
    if allowed.contains(&user.role) {
        Ok(user)
    } else {
        tracing::warn!(user_id = user.id, role = %user.role, "Role not permitted");
        Err(AppError::Auth(AuthError::InsufficientPermissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use crate::domain::NewUser;
    use crate::store::{InMemoryStore, UserStore};
    use std::sync::Arc;

    fn codec() -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            secret: "guard-test-secret-guard-test-secret".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        })
        .unwrap()
    }

    async fn seed(store: &InMemoryStore, role: Role) -> User {
        store
            .create_user(NewUser {
                name: Some("Alice".to_string()),
                username: "alice".to_string(),
                email_id: "alice@x.com".to_string(),
                password_hash: "unused".to_string(),
                is_verify: true,
                role,
                created_by: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("BearerToken"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn test_authenticate_resolves_active_user() {
        let store = Arc::new(InMemoryStore::new());
        let user = seed(&store, Role::User).await;
        let codec = codec();

        let token = codec.encode_access(user.id, user.role).unwrap();
        let resolved = authenticate(&codec, store.as_ref(), &token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_token() {
        let store = Arc::new(InMemoryStore::new());
        let user = seed(&store, Role::User).await;
        let codec = codec();

        let refresh = codec.encode_refresh(user.id).unwrap();
        let err = authenticate(&codec, store.as_ref(), &refresh.token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_user() {
        let store = InMemoryStore::new();
        let codec = codec();

        let token = codec.encode_access(999, Role::User).unwrap();
        let err = authenticate(&codec, &store, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_authenticate_forbids_disabled_user() {
        let store = InMemoryStore::new();
        let user = seed(&store, Role::User).await;
        store.set_active(user.id, false, user.id).await.unwrap();
        let codec = codec();

        let token = codec.encode_access(user.id, user.role).unwrap();
        let err = authenticate(&codec, &store, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn test_require_role() {
        let store = InMemoryStore::new();
        let user = seed(&store, Role::User).await;

        assert!(require_role(&user, &[Role::User, Role::Admin]).is_ok());
        let err = require_role(&user, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InsufficientPermissions)));
    }
}
