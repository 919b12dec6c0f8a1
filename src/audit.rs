/// Audit trail
///
/// Security-relevant events (logins, rotations, revocations, admin changes) are
/// written as structured `tracing` events. Failures go out at WARN, everything
/// else at INFO. Secrets and token material never appear in an entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "SUCCESS"),
            AuditStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// One audit trail entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub log_id: String,
    pub timestamp: DateTime<Utc>,
    /// LOGIN, REFRESH, LOGOUT, REGISTER, ROLE_CHANGE ...
    pub action: &'static str,
    pub resource_type: &'static str,
    pub resource_id: Option<String>,
    pub user_id: Option<i64>,
    pub status: AuditStatus,
    pub message: String,
    pub previous_state: Option<String>,
    pub new_state: Option<String>,
}

impl AuditLog {
    pub fn new(
        action: &'static str,
        resource_type: &'static str,
        status: AuditStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            resource_type,
            resource_id: None,
            user_id: None,
            status,
            message: message.into(),
            previous_state: None,
            new_state: None,
        }
    }

    pub fn success(action: &'static str, resource_type: &'static str, message: impl Into<String>) -> Self {
        Self::new(action, resource_type, AuditStatus::Success, message)
    }

    pub fn failure(action: &'static str, resource_type: &'static str, message: impl Into<String>) -> Self {
        Self::new(action, resource_type, AuditStatus::Failure, message)
    }

    pub fn with_resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_state_change(mut self, previous: impl Into<String>, new: impl Into<String>) -> Self {
        self.previous_state = Some(previous.into());
        self.new_state = Some(new.into());
        self
    }

    pub fn emit(&self) {
        match self.status {
            AuditStatus::Failure => tracing::warn!(
                log_id = %self.log_id,
                action = self.action,
                resource_type = self.resource_type,
                resource_id = ?self.resource_id,
                user_id = ?self.user_id,
                status = %self.status,
                message = %self.message,
                "Audit log entry"
            ),
            AuditStatus::Success => tracing::info!(
                log_id = %self.log_id,
                action = self.action,
                resource_type = self.resource_type,
                resource_id = ?self.resource_id,
                user_id = ?self.user_id,
                status = %self.status,
                message = %self.message,
                previous_state = ?self.previous_state,
                new_state = ?self.new_state,
                "Audit log entry"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log_creation() {
        let entry = AuditLog::failure("LOGIN", "session", "Invalid credentials")
            .with_resource_id("alice@x.com")
            .with_user_id(4);

        assert_eq!(entry.action, "LOGIN");
        assert_eq!(entry.status, AuditStatus::Failure);
        assert_eq!(entry.resource_id.as_deref(), Some("alice@x.com"));
        assert_eq!(entry.user_id, Some(4));
        entry.emit();
    }

    #[test]
    fn test_state_change_serializes_with_uppercase_status() {
        let entry = AuditLog::success("ROLE_CHANGE", "user", "Role updated")
            .with_state_change("user", "admin");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["previous_state"], "user");
        assert_eq!(json["new_state"], "admin");
    }
}
