/// Domain records
///
/// Plain data shared by the store, the session core and the HTTP layer.

mod refresh_token;
mod user;

pub use refresh_token::{NewRefreshToken, RefreshTokenRecord};
pub use user::{AuthUserResponse, Lifecycle, NewUser, Role, User, UserResponse};
