/// Middleware module
///
/// Bearer-token authentication and role filtering for protected scopes.

mod jwt_middleware;
mod role_guard;

pub use jwt_middleware::JwtMiddleware;
pub use role_guard::RoleGuard;
