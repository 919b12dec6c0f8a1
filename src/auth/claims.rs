/// JWT claim sets
///
/// Access and refresh tokens are flat claim maps distinguished by `type`.

use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims written into an access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub user_id: i64,
    pub role: String,
    #[serde(rename = "type")]
    pub token_type: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Claims written into a refresh token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub user_id: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub exp: i64,
}

/// Any signed claim set accepted by the decoder
///
/// Every field except `exp` is optional so a validly signed but incomplete token
/// decodes, and callers reject it explicitly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TokenClaims {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    pub exp: i64,
}

impl TokenClaims {
    pub fn is_access(&self) -> bool {
        self.token_type.as_deref() == Some(ACCESS_TOKEN_TYPE)
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some(REFRESH_TOKEN_TYPE)
    }

    /// User id of an access token, or `None` for anything else.
    pub fn access_subject(&self) -> Option<i64> {
        if self.is_access() {
            self.user_id
        } else {
            None
        }
    }

    /// `(user_id, jti)` of a refresh token, or `None` for anything else.
    pub fn refresh_subject(&self) -> Option<(i64, &str)> {
        if !self.is_refresh() {
            return None;
        }
        match (self.user_id, self.jti.as_deref()) {
            (Some(user_id), Some(jti)) if !jti.is_empty() => Some((user_id, jti)),
            _ => None,
        }
    }
}
