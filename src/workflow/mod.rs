//! Use cases over documents and invoices.
//!
//! Each operation takes the borrowed collaborators it needs (connection,
//! object store, vision client) plus the acting user, checks the capability
//! before touching anything, and reports which cached views it made stale.

pub mod delete;
pub mod extract;
pub mod review;
pub mod upload;
pub mod users;

use std::fmt;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::authorization::{self, Capability, PermissionDenied};
use crate::db::{self, DatabaseError};
use crate::extraction::ExtractionError;
use crate::lifecycle::LifecycleError;
use crate::models::enums::Role;
use crate::models::{AuditAction, NewAuditEntry};

pub use delete::{delete_document, delete_invoice, DeleteOutcome};
pub use extract::{begin_extraction, complete_extraction, retry_extraction, ExtractionOutcome};
pub use review::{approve_invoice, edit_invoice};
pub use upload::{upload_document, validate_pdf, UploadFile};
pub use users::{bootstrap_admin, change_role, create_user, NewUser};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn require(&self, capability: Capability) -> Result<(), PermissionDenied> {
        authorization::require(self.role, capability)
    }
}

/// A cached view that a mutation made stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Document(Uuid),
    Invoice(Uuid),
    Documents,
    Invoices,
    DashboardStats,
    AuditLog,
    Users,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(id) => write!(f, "document:{id}"),
            Self::Invoice(id) => write!(f, "invoice:{id}"),
            Self::Documents => f.write_str("documents"),
            Self::Invoices => f.write_str("invoices"),
            Self::DashboardStats => f.write_str("dashboard_stats"),
            Self::AuditLog => f.write_str("audit_log"),
            Self::Users => f.write_str("users"),
        }
    }
}

impl Serialize for CacheScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Permission(#[from] PermissionDenied),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Persistence failed at step {step}: {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl WorkflowError {
    pub fn persistence(
        step: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Persistence {
            step,
            source: source.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<LifecycleError> for WorkflowError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(id) => Self::not_found("Document", id),
            e @ LifecycleError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
            LifecycleError::Database(e) => Self::persistence("status_update", e),
        }
    }
}

/// Reads outside a named step. Not-found rows surface as `NotFound`.
impl From<DatabaseError> for WorkflowError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            other => Self::persistence("query", other),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Audit
// ═══════════════════════════════════════════════════════════

/// Append an audit entry on the caller's connection or transaction.
pub(crate) fn audit(
    conn: &Connection,
    action: AuditAction,
    entity_type: &'static str,
    entity_id: Option<String>,
    user_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) -> Result<(), WorkflowError> {
    let entry = NewAuditEntry {
        action,
        entity_type,
        entity_id,
        user_id,
        details,
    };
    db::insert_audit_entry(conn, &entry, &Utc::now())
        .map(|_| ())
        .map_err(|e| WorkflowError::persistence("audit", e))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{insert_user, open_memory_database, set_role};
    use crate::storage::LocalObjectStore;

    pub(crate) struct Fixture {
        pub conn: Connection,
        pub store: LocalObjectStore,
        pub _dir: tempfile::TempDir,
    }

    pub(crate) fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            conn: open_memory_database().unwrap(),
            store: LocalObjectStore::new(dir.path().join("documents")).unwrap(),
            _dir: dir,
        }
    }

    pub(crate) fn actor(conn: &Connection, role: Role) -> Actor {
        let user = insert_user(
            conn,
            &format!("{}@example.com", Uuid::new_v4()),
            None,
            b"h",
            b"s",
        )
        .unwrap();
        set_role(conn, &user.id, role).unwrap();
        Actor {
            user_id: user.id,
            role,
        }
    }

    pub(crate) fn pdf(name: &str) -> UploadFile {
        UploadFile {
            filename: name.into(),
            content_type: Some("application/pdf".into()),
            bytes: b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF".to_vec(),
        }
    }
}
