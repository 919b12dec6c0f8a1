use chrono::{DateTime, Utc};

/// One issued refresh credential as kept by the ledger
///
/// Rows are mutated at most once (revocation) and never deleted, so following
/// `replaced_by_jti` reconstructs the rotation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub jti: String,
    /// SHA-256 of the exact signed token string
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_jti: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// A token is expired from its `expires_at` instant onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn matches_hash(&self, presented_hash: &str) -> bool {
        self.token_hash == presented_hash
    }

    /// Not revoked, not expired, and the presented token hashes to the stored digest.
    pub fn is_usable_at(&self, now: DateTime<Utc>, presented_hash: &str) -> bool {
        !self.is_revoked() && !self.is_expired_at(now) && self.matches_hash(presented_hash)
    }
}

/// Insert payload for a ledger row
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub jti: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
