use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit entry. There is no update or delete path for these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An entry to be appended. `created_at` is stamped at insert time.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    ExtractionCompleted,
    ExtractionFailed,
    Retry,
    Edit,
    Approve,
    Delete,
    Login,
    Logout,
    CreateUser,
    RoleChange,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::ExtractionCompleted => "extraction_completed",
            Self::ExtractionFailed => "extraction_failed",
            Self::Retry => "retry",
            Self::Edit => "edit",
            Self::Approve => "approve",
            Self::Delete => "delete",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::CreateUser => "create_user",
            Self::RoleChange => "role_change",
        }
    }
}
