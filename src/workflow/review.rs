use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::{audit, Actor, CacheScope, WorkflowError};
use crate::authorization::Capability;
use crate::db;
use crate::lifecycle::{self, LifecycleError, Transition};
use crate::models::{AuditAction, InvoicePatch, InvoiceWithDocument};

/// Reviewer sign-off on an invoice whose document is in `needs_review`.
///
/// One transaction: the document moves to `approved` with overall confidence
/// 100, and the invoice gets 100/100/100 plus the reviewer pair. Field values
/// are left exactly as stored.
pub fn approve_invoice(
    conn: &Connection,
    actor: &Actor,
    invoice_id: &Uuid,
) -> Result<(InvoiceWithDocument, Vec<CacheScope>), WorkflowError> {
    actor.require(Capability::ApproveInvoice)?;

    let invoice = db::get_invoice(conn, invoice_id)?
        .ok_or_else(|| WorkflowError::not_found("Invoice", invoice_id))?;
    let now = Utc::now();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    lifecycle::apply(&tx, &invoice.document_id, Transition::Approve).map_err(|e| match e {
        LifecycleError::Database(e) => WorkflowError::persistence("document_update", e),
        other => other.into(),
    })?;
    let updated = db::mark_invoice_reviewed(&tx, invoice_id, &actor.user_id, &now)
        .map_err(|e| WorkflowError::persistence("invoice_update", e))?;
    if !updated {
        return Err(WorkflowError::not_found("Invoice", invoice_id));
    }
    audit(
        &tx,
        AuditAction::Approve,
        "energy_invoice",
        Some(invoice_id.to_string()),
        Some(actor.user_id),
        Some(json!({ "document_id": invoice.document_id })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    tracing::info!(invoice_id = %invoice_id, document_id = %invoice.document_id, "Invoice approved");

    let refreshed = db::get_invoice_with_document(conn, invoice_id)?
        .ok_or_else(|| WorkflowError::not_found("Invoice", invoice_id))?;
    Ok((
        refreshed,
        vec![
            CacheScope::Invoice(*invoice_id),
            CacheScope::Invoices,
            CacheScope::Document(invoice.document_id),
            CacheScope::Documents,
            CacheScope::DashboardStats,
            CacheScope::AuditLog,
        ],
    ))
}

/// Reviewer correction of extracted values. Does not touch document status
/// or confidences.
pub fn edit_invoice(
    conn: &Connection,
    actor: &Actor,
    invoice_id: &Uuid,
    patch: &InvoicePatch,
) -> Result<(InvoiceWithDocument, Vec<CacheScope>), WorkflowError> {
    actor.require(Capability::EditInvoice)?;

    if patch.is_empty() {
        return Err(WorkflowError::Validation("No fields to update".into()));
    }
    if let Some(kwh) = patch.kwh_used {
        if !kwh.is_finite() || kwh < 0.0 {
            return Err(WorkflowError::Validation("kWh used must be zero or more".into()));
        }
    }

    let current = db::get_invoice(conn, invoice_id)?
        .ok_or_else(|| WorkflowError::not_found("Invoice", invoice_id))?;
    let start = patch.billing_period_start.or(current.billing_period_start);
    let end = patch.billing_period_end.or(current.billing_period_end);
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(WorkflowError::Validation(
                "Billing period start must not be after its end".into(),
            ));
        }
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    db::update_invoice_fields(&tx, invoice_id, patch, &Utc::now())
        .map_err(|e| WorkflowError::persistence("invoice_update", e))?;
    audit(
        &tx,
        AuditAction::Edit,
        "energy_invoice",
        Some(invoice_id.to_string()),
        Some(actor.user_id),
        Some(json!({ "fields": changed_fields(patch) })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    let refreshed = db::get_invoice_with_document(conn, invoice_id)?
        .ok_or_else(|| WorkflowError::not_found("Invoice", invoice_id))?;
    Ok((
        refreshed,
        vec![
            CacheScope::Invoice(*invoice_id),
            CacheScope::Invoices,
            CacheScope::AuditLog,
        ],
    ))
}

fn changed_fields(patch: &InvoicePatch) -> Vec<&'static str> {
    [
        ("invoice_date", patch.invoice_date.is_some()),
        ("billing_period_start", patch.billing_period_start.is_some()),
        ("billing_period_end", patch.billing_period_end.is_some()),
        ("reading_type", patch.reading_type.is_some()),
        ("kwh_used", patch.kwh_used.is_some()),
        ("reviewer_notes", patch.reviewer_notes.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::MockVisionClient;
    use crate::models::enums::{DocumentStatus, DocumentType, ReadingType, Role};
    use crate::workflow::test_support::{actor, fixture, pdf, Fixture};
    use crate::workflow::{begin_extraction, complete_extraction, upload_document};
    use chrono::NaiveDate;

    /// An invoice produced by extraction with the given confidences.
    fn extracted(fx: &Fixture, conf: [u8; 3]) -> (Uuid, Uuid) {
        let uploader = actor(&fx.conn, Role::Reviewer);
        let (doc, _) =
            upload_document(&fx.conn, &fx.store, &uploader, &pdf("bill.pdf"), DocumentType::Energy)
                .unwrap();
        begin_extraction(&fx.conn, &doc.id).unwrap();
        let client = MockVisionClient::with_confidences(conf[0], conf[1], conf[2]);
        let outcome = complete_extraction(&fx.conn, &fx.store, &client, &doc.id, None).unwrap();
        (doc.id, outcome.invoice_id)
    }

    #[test]
    fn approval_forces_full_confidence() {
        let fx = fixture();
        let (doc_id, invoice_id) = extracted(&fx, [40, 75, 60]);
        let reviewer = actor(&fx.conn, Role::Reviewer);
        let before = db::get_invoice(&fx.conn, &invoice_id).unwrap().unwrap();

        let (after, scopes) = approve_invoice(&fx.conn, &reviewer, &invoice_id).unwrap();
        assert_eq!(after.document.status, DocumentStatus::Approved);
        assert_eq!(after.document.overall_confidence, Some(100));
        assert_eq!(after.invoice.field_confidences(), [Some(100); 3]);
        assert_eq!(after.invoice.reviewed_by, Some(reviewer.user_id));
        assert!(after.invoice.reviewed_at.is_some());
        assert_eq!(after.invoice.kwh_used, before.kwh_used);
        assert_eq!(after.invoice.invoice_date, before.invoice_date);
        assert!(scopes.contains(&CacheScope::Document(doc_id)));
        assert!(scopes.contains(&CacheScope::DashboardStats));
    }

    #[test]
    fn viewer_approval_changes_nothing() {
        let fx = fixture();
        let (doc_id, invoice_id) = extracted(&fx, [70, 70, 70]);
        let viewer = actor(&fx.conn, Role::Viewer);

        let err = approve_invoice(&fx.conn, &viewer, &invoice_id).unwrap_err();
        assert!(matches!(err, WorkflowError::Permission(_)));

        let doc = db::get_document(&fx.conn, &doc_id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::NeedsReview);
        assert_eq!(doc.overall_confidence, Some(70));
        let invoice = db::get_invoice(&fx.conn, &invoice_id).unwrap().unwrap();
        assert!(invoice.reviewed_by.is_none());
        assert_eq!(invoice.field_confidences(), [Some(70); 3]);
    }

    #[test]
    fn approving_an_auto_approved_invoice_is_rejected_atomically() {
        let fx = fixture();
        let (_, invoice_id) = extracted(&fx, [95, 95, 95]);
        let reviewer = actor(&fx.conn, Role::Reviewer);

        let err = approve_invoice(&fx.conn, &reviewer, &invoice_id).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
        let invoice = db::get_invoice(&fx.conn, &invoice_id).unwrap().unwrap();
        assert!(invoice.reviewed_by.is_none());
        assert!(invoice.reviewed_at.is_none());
    }

    #[test]
    fn approve_missing_invoice_is_not_found() {
        let fx = fixture();
        let reviewer = actor(&fx.conn, Role::Reviewer);
        let err = approve_invoice(&fx.conn, &reviewer, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[test]
    fn edit_then_approve() {
        let fx = fixture();
        let (doc_id, invoice_id) = extracted(&fx, [70, 70, 70]);
        let reviewer = actor(&fx.conn, Role::Reviewer);

        let patch = InvoicePatch {
            kwh_used: Some(398.0),
            reading_type: Some(ReadingType::CustomerRead),
            ..Default::default()
        };
        let (edited, scopes) = edit_invoice(&fx.conn, &reviewer, &invoice_id, &patch).unwrap();
        assert_eq!(edited.invoice.kwh_used, Some(398.0));
        assert_eq!(edited.invoice.reading_type, ReadingType::CustomerRead);
        assert_eq!(edited.document.status, DocumentStatus::NeedsReview);
        assert!(!scopes.contains(&CacheScope::Document(doc_id)));

        let (approved, _) = approve_invoice(&fx.conn, &reviewer, &invoice_id).unwrap();
        assert_eq!(approved.invoice.kwh_used, Some(398.0));
        assert_eq!(approved.document.status, DocumentStatus::Approved);
    }

    #[test]
    fn edit_validates_input() {
        let fx = fixture();
        let (_, invoice_id) = extracted(&fx, [70, 70, 70]);
        let reviewer = actor(&fx.conn, Role::Reviewer);

        let empty = InvoicePatch::default();
        assert!(matches!(
            edit_invoice(&fx.conn, &reviewer, &invoice_id, &empty),
            Err(WorkflowError::Validation(_))
        ));

        let negative = InvoicePatch { kwh_used: Some(-1.0), ..Default::default() };
        assert!(matches!(
            edit_invoice(&fx.conn, &reviewer, &invoice_id, &negative),
            Err(WorkflowError::Validation(_))
        ));

        // Stored period is 2026-02-01..2026-02-28; moving the start past the end fails.
        let inverted = InvoicePatch {
            billing_period_start: NaiveDate::from_ymd_opt(2026, 3, 15),
            ..Default::default()
        };
        assert!(matches!(
            edit_invoice(&fx.conn, &reviewer, &invoice_id, &inverted),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn edit_is_audited_with_field_names() {
        let fx = fixture();
        let (_, invoice_id) = extracted(&fx, [70, 70, 70]);
        let reviewer = actor(&fx.conn, Role::Reviewer);
        let patch = InvoicePatch {
            reviewer_notes: Some("checked against meter photo".into()),
            ..Default::default()
        };
        edit_invoice(&fx.conn, &reviewer, &invoice_id, &patch).unwrap();

        let log = db::list_audit_entries(&fx.conn, 1, 0).unwrap();
        assert_eq!(log[0].action, "edit");
        assert_eq!(log[0].user_id, Some(reviewer.user_id));
        assert_eq!(log[0].details.as_ref().unwrap()["fields"][0], "reviewer_notes");
    }
}
