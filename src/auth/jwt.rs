/// Token Codec
///
/// Encodes and decodes signed access/refresh tokens with the configured HMAC
/// secret, and computes the digest the ledger stores in place of a refresh token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::claims::{
    AccessClaims, RefreshClaims, TokenClaims, ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE,
};
use crate::configuration::JwtSettings;
use crate::domain::Role;
use crate::error::{AppError, ConfigError};

/// A freshly signed refresh token plus what the ledger needs to record it
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from configuration
    ///
    /// # Errors
    /// Returns a config error for an empty secret, a non-HMAC algorithm, or a
    /// lifetime that is non-positive or pushes expiry past the representable range.
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()).into());
        }

        let algorithm = match config.algorithm.trim().to_uppercase().as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "jwt.algorithm must be an HMAC algorithm, got {}",
                    other
                ))
                .into())
            }
        };

        let access_ttl = config.access_token_ttl().ok_or_else(|| {
            ConfigError::InvalidValue(
                "jwt.access_token_expire_minutes must be positive and in range".to_string(),
            )
        })?;
        let refresh_ttl = config.refresh_token_ttl().ok_or_else(|| {
            ConfigError::InvalidValue(
                "jwt.refresh_token_expire_days must be positive and in range".to_string(),
            )
        })?;

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for `user_id` using the configured lifetime.
    pub fn encode_access(&self, user_id: i64, role: Role) -> Result<String, AppError> {
        self.sign_access(user_id, role, self.access_ttl)
    }

    fn sign_access(&self, user_id: i64, role: Role, ttl: Duration) -> Result<String, AppError> {
        let claims = AccessClaims {
            user_id,
            role: role.as_str().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            exp: expiry_after(ttl)?.timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Sign a refresh token with a fresh random `jti`, using the configured lifetime.
    pub fn encode_refresh(&self, user_id: i64) -> Result<IssuedRefreshToken, AppError> {
        let exp = expiry_after(self.refresh_ttl)?.timestamp();
        // Whole seconds, so the ledger expiry equals the signed `exp` exactly.
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| AppError::Internal("Refresh expiry out of range".to_string()))?;
        let jti = Uuid::new_v4().to_string();

        let claims = RefreshClaims {
            user_id,
            jti: jti.clone(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            exp,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedRefreshToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Verify signature and expiry.
    ///
    /// Never fails loudly: a bad signature, malformed structure or an `exp` at or
    /// before the current second all yield `None`.
    pub fn decode(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        match decode::<TokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) if data.claims.exp > Utc::now().timestamp() => Some(data.claims),
            Ok(_) => {
                tracing::debug!("JWT rejected: expired");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "JWT rejected");
                None
            }
        }
    }
}

fn expiry_after(ttl: Duration) -> Result<DateTime<Utc>, AppError> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))
}

/// SHA-256 hex digest of the exact token string; unsalted and deterministic.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
