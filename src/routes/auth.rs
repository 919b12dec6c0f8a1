/// Authentication Routes
///
/// Registration, login, token refresh, logout and current user information.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::SessionIssuer;
use crate::domain::{AuthUserResponse, User};
use crate::error::{AppError, ErrorContext};
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use crate::users;
use crate::validators::{is_valid_email, validate_password_shape};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email_id: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct OtpVerifyRequest {
    pub email_id: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email_id: String,
    pub password: String,
}

/// Body of `/auth/refresh` and `/auth/logout`
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn message(text: &str) -> serde_json::Value {
    serde_json::json!({ "message": text })
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid name, email or password length
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user = users::register(store.get_ref(), &form.name, &form.email_id, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(message("User registered successfully")))
}

/// POST /auth/verify-otp
///
/// Accounts are created verified, so this only checks the body shape.
pub async fn verify_otp(form: web::Json<OtpVerifyRequest>) -> Result<HttpResponse, AppError> {
    is_valid_email(&form.email_id)?;
    if form.otp.chars().count() != 6 {
        return Err(AppError::rejected("otp must be 6 characters"));
    }

    Ok(HttpResponse::Ok().json(message("OTP verification skipped for now")))
}

/// POST /auth/login
///
/// Rate limited per client IP.
///
/// # Errors
/// - 401: unknown email or wrong password (same message for both)
/// - 403: account disabled
/// - 429: too many attempts from this address
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionIssuer>,
    limiter: web::Data<RateLimiter>,
) -> Result<HttpResponse, AppError> {
    let client_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    limiter.check(&client_ip).await?;

    let email_id = is_valid_email(&form.email_id)?;
    validate_password_shape(&form.password)?;

    let tokens = sessions.login(&email_id, &form.password).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/refresh
///
/// Rotates the presented refresh token. The old token is revoked and linked to
/// its successor; presenting it again is rejected.
///
/// # Errors
/// - 401: invalid, expired, revoked or tampered refresh token
/// - 403: account disabled
/// - 409: the same token was rotated concurrently
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionIssuer>,
) -> Result<HttpResponse, AppError> {
    let tokens = sessions.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/logout
pub async fn logout(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionIssuer>,
) -> Result<HttpResponse, AppError> {
    sessions.logout(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(message("Logged out successfully")))
}

/// GET /auth/me
///
/// **Requires a valid access token**; the user is injected by `JwtMiddleware`.
pub async fn get_current_user(user: web::ReqData<User>) -> HttpResponse {
    HttpResponse::Ok().json(AuthUserResponse::from(&*user))
}
