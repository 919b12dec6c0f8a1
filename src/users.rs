/// User service
///
/// Registration and account administration on top of `UserStore`. Handlers stay
/// thin: they deserialize, call in here, and serialize the result.

use serde::Serialize;

use crate::audit::AuditLog;
use crate::auth::{ensure_strong_password, hash_password, verify_password};
use crate::domain::{NewUser, Role, User, UserResponse};
use crate::error::AppError;
use crate::store::{Store, UserFilter, UserStore};
use crate::validators::{is_valid_email, is_valid_name, normalize_username_seed, validate_password_shape};

const RESOURCE: &str = "user";
pub const MAX_PAGE_SIZE: i64 = 100;

/// Self-service sign-up
///
/// The account is created verified with role `user`. Only the password shape is
/// checked here; the strength policy applies to admin-created accounts and to
/// password changes.
pub async fn register(
    store: &dyn Store,
    name: &str,
    email_id: &str,
    password: &str,
) -> Result<User, AppError> {
    let name = is_valid_name(name)?;
    let email_id = is_valid_email(email_id)?;
    validate_password_shape(password)?;

    if store.find_user_by_email(&email_id).await?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }

    let username = generate_unique_username(store, &name).await?;
    let user = store
        .create_user(NewUser {
            name: Some(name),
            username,
            email_id,
            password_hash: hash_password(password)?,
            is_verify: true,
            role: Role::User,
            created_by: None,
        })
        .await?;

    AuditLog::success("REGISTER", RESOURCE, "User registered")
        .with_user_id(user.id)
        .emit();
    Ok(user)
}

/// First free username derived from `seed`: `alice`, then `alice2`, `alice3`...
pub async fn generate_unique_username(store: &dyn Store, seed: &str) -> Result<String, AppError> {
    let base = normalize_username_seed(seed);
    let mut candidate = base.clone();
    let mut counter = 1;

    while store.username_exists(&candidate).await? {
        counter += 1;
        candidate = format!("{}{}", base, counter);
    }
    Ok(candidate)
}

/// Payload of `POST /users`
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AdminCreateUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub email_id: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_verified")]
    pub is_verify: bool,
}

fn default_role() -> String {
    Role::User.as_str().to_string()
}

fn default_verified() -> bool {
    true
}

pub async fn create_user_by_admin(
    store: &dyn Store,
    admin_id: i64,
    input: AdminCreateUser,
) -> Result<User, AppError> {
    let role: Role = input.role.parse()?;
    let email_id = is_valid_email(&input.email_id)?;
    let name = match input.name.as_deref() {
        Some(name) => Some(is_valid_name(name)?),
        None => None,
    };
    ensure_strong_password(&input.password)?;

    if store.find_user_by_email(&email_id).await?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }

    let username = match input.username.as_deref() {
        Some(explicit) => {
            let username = normalize_username_seed(explicit);
            if store.username_exists(&username).await? {
                return Err(AppError::conflict("Username already taken"));
            }
            username
        }
        None => {
            let seed = name
                .as_deref()
                .unwrap_or_else(|| email_id.split('@').next().unwrap_or_default());
            generate_unique_username(store, seed).await?
        }
    };

    let user = store
        .create_user(NewUser {
            name,
            username,
            email_id,
            password_hash: hash_password(&input.password)?,
            is_verify: input.is_verify,
            role,
            created_by: Some(admin_id),
        })
        .await?;

    AuditLog::success("CREATE", RESOURCE, "User created by admin")
        .with_user_id(admin_id)
        .with_resource_id(user.id)
        .emit();
    Ok(user)
}

pub async fn change_password(
    store: &dyn Store,
    user: &User,
    old_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if !verify_password(old_password, &user.password_hash) {
        AuditLog::failure("PASSWORD_CHANGE", RESOURCE, "Old password did not verify")
            .with_user_id(user.id)
            .emit();
        return Err(AppError::rejected("Old password is incorrect"));
    }
    if old_password == new_password {
        return Err(AppError::rejected(
            "New password must be different from old password",
        ));
    }
    ensure_strong_password(new_password)?;

    store
        .update_password_hash(user.id, &hash_password(new_password)?)
        .await?;

    AuditLog::success("PASSWORD_CHANGE", RESOURCE, "Password changed")
        .with_user_id(user.id)
        .emit();
    Ok(())
}

/// A non-deleted user, or 404.
pub async fn get_user(store: &dyn Store, id: i64) -> Result<User, AppError> {
    store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn update_role(
    store: &dyn Store,
    id: i64,
    role: &str,
    admin_id: i64,
) -> Result<User, AppError> {
    let role: Role = role.parse()?;
    let before = get_user(store, id).await?;
    let user = store.update_role(id, role, admin_id).await?;

    AuditLog::success("ROLE_CHANGE", RESOURCE, "Role updated")
        .with_user_id(admin_id)
        .with_resource_id(id)
        .with_state_change(before.role.as_str(), user.role.as_str())
        .emit();
    Ok(user)
}

pub async fn disable_user(store: &dyn Store, id: i64, admin_id: i64) -> Result<User, AppError> {
    let target = get_user(store, id).await?;
    if target.id == admin_id {
        return Err(AppError::rejected("Admin cannot disable self"));
    }

    let user = store.set_active(id, false, admin_id).await?;
    AuditLog::success("DISABLE", RESOURCE, "User disabled")
        .with_user_id(admin_id)
        .with_resource_id(id)
        .emit();
    Ok(user)
}

pub async fn enable_user(store: &dyn Store, id: i64, admin_id: i64) -> Result<User, AppError> {
    get_user(store, id).await?;

    let user = store.set_active(id, true, admin_id).await?;
    AuditLog::success("ENABLE", RESOURCE, "User enabled")
        .with_user_id(admin_id)
        .with_resource_id(id)
        .emit();
    Ok(user)
}

/// One page of the admin listing
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<UserResponse>,
}

pub async fn list_users(store: &dyn Store, filter: UserFilter) -> Result<UserListResponse, AppError> {
    if !(1..=MAX_PAGE_SIZE).contains(&filter.limit) {
        return Err(AppError::rejected(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if filter.offset < 0 {
        return Err(AppError::rejected("offset must not be negative"));
    }

    let (total, users) = store.list_users(&filter).await?;
    Ok(UserListResponse {
        total,
        limit: filter.limit,
        offset: filter.offset,
        items: users.iter().map(UserResponse::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::store::{InMemoryStore, UserStore};
    use crate::validators::{MAX_NAME_LENGTH, MAX_USERNAME_LENGTH};

    async fn admin(store: &InMemoryStore) -> User {
        store
            .create_user(NewUser {
                name: Some("Root".to_string()),
                username: "root".to_string(),
                email_id: "root@x.com".to_string(),
                password_hash: hash_password("R00t!pass").unwrap(),
                is_verify: true,
                role: Role::Admin,
                created_by: None,
            })
            .await
            .unwrap()
    }

    fn admin_input(email: &str) -> AdminCreateUser {
        AdminCreateUser {
            name: None,
            username: None,
            email_id: email.to_string(),
            password: "Str0ng!pass".to_string(),
            role: "user".to_string(),
            is_verify: true,
        }
    }

    #[tokio::test]
    async fn test_register_creates_verified_user() {
        let store = InMemoryStore::new();
        let user = register(&store, "Alice Smith", "alice@x.com", "weakpassword")
            .await
            .unwrap();

        assert_eq!(user.username, "alice_smith");
        assert_eq!(user.role, Role::User);
        assert!(user.is_verify);
        assert!(verify_password("weakpassword", &user.password_hash));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let store = InMemoryStore::new();
        register(&store, "Alice", "alice@x.com", "Str0ng!pass").await.unwrap();

        let err = register(&store, "Alice Two", "alice@x.com", "Str0ng!pass")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_unique_username_counter_starts_at_two() {
        let store = InMemoryStore::new();
        register(&store, "Alice", "a1@x.com", "Str0ng!pass").await.unwrap();
        let second = register(&store, "alice", "a2@x.com", "Str0ng!pass").await.unwrap();
        let third = register(&store, "ALICE", "a3@x.com", "Str0ng!pass").await.unwrap();

        assert_eq!(second.username, "alice2");
        assert_eq!(third.username, "alice3");
    }

    #[tokio::test]
    async fn test_longest_name_registers_with_username_within_column() {
        let store = InMemoryStore::new();
        let name = "a".repeat(MAX_NAME_LENGTH);

        let first = register(&store, &name, "a1@x.com", "Str0ng!pass").await.unwrap();
        let second = register(&store, &name, "a2@x.com", "Str0ng!pass").await.unwrap();

        assert_eq!(first.name.as_deref(), Some(name.as_str()));
        assert!(first.username.len() <= MAX_USERNAME_LENGTH);
        assert_eq!(second.username, format!("{}2", first.username));
        assert!(second.username.len() <= MAX_USERNAME_LENGTH);
    }

    #[tokio::test]
    async fn test_admin_create_enforces_strength_and_uniqueness() {
        let store = InMemoryStore::new();
        let root = admin(&store).await;

        let mut weak = admin_input("bob@x.com");
        weak.password = "weakpassword".to_string();
        let err = create_user_by_admin(&store, root.id, weak).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::WeakPassword)));

        let bob = create_user_by_admin(&store, root.id, admin_input("bob@x.com"))
            .await
            .unwrap();
        assert_eq!(bob.username, "bob");
        assert_eq!(bob.lifecycle.created_by, Some(root.id));

        let err = create_user_by_admin(&store, root.id, admin_input("bob@x.com"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let mut taken = admin_input("carol@x.com");
        taken.username = Some("Bob".to_string());
        let err = create_user_by_admin(&store, root.id, taken).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_admin_create_rejects_unknown_role() {
        let store = InMemoryStore::new();
        let root = admin(&store).await;

        let mut input = admin_input("dave@x.com");
        input.role = "owner".to_string();
        let err = create_user_by_admin(&store, root.id, input).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid role");
    }

    #[tokio::test]
    async fn test_change_password_rules() {
        let store = InMemoryStore::new();
        let user = register(&store, "Alice", "alice@x.com", "Str0ng!pass").await.unwrap();

        let err = change_password(&store, &user, "Wr0ng!pass", "N3w!passw0rd")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Old password is incorrect");

        let err = change_password(&store, &user, "Str0ng!pass", "Str0ng!pass")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "New password must be different from old password");

        let err = change_password(&store, &user, "Str0ng!pass", "weakpassword")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::WeakPassword)));

        change_password(&store, &user, "Str0ng!pass", "N3w!passw0rd").await.unwrap();
        let reloaded = get_user(&store, user.id).await.unwrap();
        assert!(verify_password("N3w!passw0rd", &reloaded.password_hash));
    }

    #[tokio::test]
    async fn test_admin_cannot_disable_self() {
        let store = InMemoryStore::new();
        let root = admin(&store).await;

        let err = disable_user(&store, root.id, root.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Admin cannot disable self");
    }

    #[tokio::test]
    async fn test_disable_enable_and_role_change() {
        let store = InMemoryStore::new();
        let root = admin(&store).await;
        let user = register(&store, "Alice", "alice@x.com", "Str0ng!pass").await.unwrap();

        let disabled = disable_user(&store, user.id, root.id).await.unwrap();
        assert!(!disabled.is_active());
        assert_eq!(disabled.lifecycle.modify_by, Some(root.id));

        let enabled = enable_user(&store, user.id, root.id).await.unwrap();
        assert!(enabled.is_active());

        let promoted = update_role(&store, user.id, "admin", root.id).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);

        assert!(update_role(&store, user.id, "root", root.id).await.is_err());
        let err = update_role(&store, 999, "user", root.id).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn test_list_users_validates_paging() {
        let store = InMemoryStore::new();
        admin(&store).await;

        let page = list_users(&store, UserFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.limit, 20);

        let too_big = UserFilter { limit: 101, ..Default::default() };
        assert!(list_users(&store, too_big).await.is_err());
        let negative = UserFilter { offset: -1, ..Default::default() };
        assert!(list_users(&store, negative).await.is_err());
    }
}
