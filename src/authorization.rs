//! Role-based access policy.
//!
//! Each role maps to a fixed capability set. The mapping is an exhaustive
//! `match` so adding a role or capability forces every decision to be revisited.
//! Anything not granted is denied.

use crate::models::enums::Role;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadRecords,
    UploadDocument,
    EditInvoice,
    ApproveInvoice,
    RetryExtraction,
    DeleteRecords,
    ManageUsers,
    ViewAuditLog,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Self::ReadRecords,
        Self::UploadDocument,
        Self::EditInvoice,
        Self::ApproveInvoice,
        Self::RetryExtraction,
        Self::DeleteRecords,
        Self::ManageUsers,
        Self::ViewAuditLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadRecords => "read_records",
            Self::UploadDocument => "upload_document",
            Self::EditInvoice => "edit_invoice",
            Self::ApproveInvoice => "approve_invoice",
            Self::RetryExtraction => "retry_extraction",
            Self::DeleteRecords => "delete_records",
            Self::ManageUsers => "manage_users",
            Self::ViewAuditLog => "view_audit_log",
        }
    }
}

/// Refusal carrying what was asked for and who asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Role {role} lacks capability {}", capability.as_str())]
pub struct PermissionDenied {
    pub role: Role,
    pub capability: Capability,
}

// ═══════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════

pub fn has_capability(role: Role, capability: Capability) -> bool {
    use Capability::*;
    match role {
        Role::Viewer => match capability {
            ReadRecords => true,
            UploadDocument | EditInvoice | ApproveInvoice | RetryExtraction | DeleteRecords
            | ManageUsers | ViewAuditLog => false,
        },
        Role::Reviewer => match capability {
            ReadRecords | UploadDocument | EditInvoice | ApproveInvoice | RetryExtraction => true,
            DeleteRecords | ManageUsers | ViewAuditLog => false,
        },
        Role::Admin => match capability {
            ReadRecords | UploadDocument | EditInvoice | ApproveInvoice | RetryExtraction
            | DeleteRecords | ManageUsers | ViewAuditLog => true,
        },
    }
}

/// Gate a mutation. Call before any write so a refusal leaves no trace.
pub fn require(role: Role, capability: Capability) -> Result<(), PermissionDenied> {
    if has_capability(role, capability) {
        Ok(())
    } else {
        tracing::debug!(role = %role, capability = capability.as_str(), "Capability denied");
        Err(PermissionDenied { role, capability })
    }
}

pub fn capabilities(role: Role) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|&c| has_capability(role, c))
        .collect()
}
