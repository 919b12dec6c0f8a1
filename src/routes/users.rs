/// User Routes
///
/// `/users/me` and `/users/change-password` for any signed-in user, the rest for
/// admins only (the scope is wrapped in `RoleGuard`).

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::domain::{Role, User, UserResponse};
use crate::error::AppError;
use crate::store::{Store, UserFilter};
use crate::users::{self, AdminCreateUser};

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct RoleUpdateRequest {
    pub role: String,
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListUsersQuery {
    fn into_filter(self) -> Result<UserFilter, AppError> {
        let defaults = UserFilter::default();
        let role = match self.role.as_deref() {
            Some(role) => Some(role.parse::<Role>()?),
            None => None,
        };

        Ok(UserFilter {
            role,
            is_active: self.is_active,
            search: self.search.filter(|s| !s.trim().is_empty()),
            include_deleted: self.include_deleted,
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

/// GET /users/me
pub async fn me(user: web::ReqData<User>) -> HttpResponse {
    HttpResponse::Ok().json(UserResponse::from(&*user))
}

/// PUT /users/change-password
pub async fn change_password(
    user: web::ReqData<User>,
    form: web::Json<ChangePasswordRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    users::change_password(store.get_ref(), &user, &form.old_password, &form.new_password).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Password updated successfully" })))
}

/// GET /users
pub async fn list(
    query: web::Query<ListUsersQuery>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let filter = query.into_inner().into_filter()?;
    let page = users::list_users(store.get_ref(), filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /users
pub async fn create(
    admin: web::ReqData<User>,
    form: web::Json<AdminCreateUser>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let user = users::create_user_by_admin(store.get_ref(), admin.id, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(&user)))
}

/// GET /users/{id}
pub async fn get(
    path: web::Path<i64>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let user = users::get_user(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// PATCH /users/{id}/role
pub async fn update_role(
    admin: web::ReqData<User>,
    path: web::Path<i64>,
    form: web::Json<RoleUpdateRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let user = users::update_role(store.get_ref(), path.into_inner(), &form.role, admin.id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// PATCH /users/{id}/disable
pub async fn disable(
    admin: web::ReqData<User>,
    path: web::Path<i64>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let user = users::disable_user(store.get_ref(), path.into_inner(), admin.id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}

/// PATCH /users/{id}/enable
pub async fn enable(
    admin: web::ReqData<User>,
    path: web::Path<i64>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let user = users::enable_user(store.get_ref(), path.into_inner(), admin.id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}
