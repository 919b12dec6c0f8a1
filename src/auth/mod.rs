/// Authentication module
///
/// Password verification, token encoding, session issuance with refresh-token
/// rotation, and the guard that resolves bearer tokens to users.

mod claims;
mod guard;
mod jwt;
mod password;
mod session;

pub use claims::{AccessClaims, RefreshClaims, TokenClaims, ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE};
pub use guard::{authenticate, bearer_token, require_role};
pub use jwt::{hash_token, IssuedRefreshToken, TokenCodec};
pub use password::{
    ensure_strong_password, hash_password, is_strong_password, verify_against_dummy,
    verify_password, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH,
};
pub use session::{SessionIssuer, TokenResponse};
