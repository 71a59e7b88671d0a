use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{audit, Actor, CacheScope, WorkflowError};
use crate::authorization::Capability;
use crate::confidence::overall_confidence;
use crate::db;
use crate::extraction::{self, ExtractionError, ExtractionFields, VisionClient};
use crate::lifecycle::{self, LifecycleError, Transition};
use crate::models::enums::{DocumentStatus, DocumentType};
use crate::models::{AuditAction, Document, EnergyInvoice};
use crate::storage::{storage_path, ObjectStore};

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub document_id: Uuid,
    pub invoice_id: Uuid,
    pub status: DocumentStatus,
    pub overall_confidence: Option<u8>,
    pub invalidates: Vec<CacheScope>,
}

/// Flip an energy document to `processing`. Must complete before the model is
/// called so an interrupted run stays visible as `processing`.
pub fn begin_extraction(conn: &Connection, document_id: &Uuid) -> Result<Document, WorkflowError> {
    let document = db::get_document(conn, document_id)?
        .ok_or_else(|| WorkflowError::not_found("Document", document_id))?;
    if document.document_type != DocumentType::Energy {
        return Err(WorkflowError::Validation(format!(
            "Extraction is only available for energy documents, not {}",
            document.document_type
        )));
    }

    let status = lifecycle::apply(conn, document_id, Transition::StartExtraction)?;
    Ok(Document { status, overall_confidence: None, ..document })
}

/// Run extraction for a document already in `processing` and record the result.
///
/// Fail-closed: any download, provider, parse or write failure moves the
/// document to `failed` with no invoice row, then the error is returned.
pub fn complete_extraction(
    conn: &Connection,
    store: &dyn ObjectStore,
    client: &dyn VisionClient,
    document_id: &Uuid,
    triggered_by: Option<Uuid>,
) -> Result<ExtractionOutcome, WorkflowError> {
    let document = db::get_document(conn, document_id)?
        .ok_or_else(|| WorkflowError::not_found("Document", document_id))?;
    if document.status != DocumentStatus::Processing {
        return Err(WorkflowError::InvalidTransition(format!(
            "Document {document_id} is {}, not processing",
            document.status
        )));
    }

    let fields = match fetch_and_extract(store, client, &document) {
        Ok(fields) => fields,
        Err(e) => {
            mark_failed(conn, document_id, triggered_by, e.kind());
            return Err(e.into());
        }
    };

    match record_success(conn, &document, &fields, triggered_by) {
        Ok(outcome) => Ok(outcome),
        Err(WorkflowError::InvalidTransition(msg)) => {
            // Someone else moved the document on; nothing of ours was written.
            tracing::warn!(document_id = %document_id, "Extraction result discarded: {msg}");
            Err(WorkflowError::InvalidTransition(msg))
        }
        Err(e) => {
            mark_failed(conn, document_id, triggered_by, "persistence");
            Err(e)
        }
    }
}

/// User-triggered retry from `failed` or `uploaded`. Waits for the result.
pub fn retry_extraction(
    conn: &Connection,
    store: &dyn ObjectStore,
    client: &dyn VisionClient,
    actor: &Actor,
    document_id: &Uuid,
) -> Result<ExtractionOutcome, WorkflowError> {
    actor.require(Capability::RetryExtraction)?;

    // The flip and its audit row land together or not at all.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    begin_extraction(&tx, document_id)?;
    audit(
        &tx,
        AuditAction::Retry,
        "document",
        Some(document_id.to_string()),
        Some(actor.user_id),
        None,
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    complete_extraction(conn, store, client, document_id, Some(actor.user_id))
}

fn fetch_and_extract(
    store: &dyn ObjectStore,
    client: &dyn VisionClient,
    document: &Document,
) -> Result<ExtractionFields, ExtractionError> {
    let reference = document
        .file_url
        .as_deref()
        .ok_or_else(|| ExtractionError::Download("document has no stored file".into()))?;
    let key = storage_path(reference).map_err(|e| ExtractionError::Download(e.to_string()))?;
    let bytes = store
        .get(&key)
        .map_err(|e| ExtractionError::Download(e.to_string()))?;

    tracing::info!(document_id = %document.id, size = bytes.len(), "Sending document for extraction");
    extraction::extract(client, &document.filename, &bytes)
}

fn record_success(
    conn: &Connection,
    document: &Document,
    fields: &ExtractionFields,
    triggered_by: Option<Uuid>,
) -> Result<ExtractionOutcome, WorkflowError> {
    let overall = overall_confidence(&fields.confidences().map(Some));
    let now = Utc::now();
    let invoice = EnergyInvoice {
        id: Uuid::new_v4(),
        document_id: document.id,
        invoice_date: fields.invoice_date,
        billing_period_start: fields.billing_period_start,
        billing_period_end: fields.billing_period_end,
        reading_type: fields.reading_type,
        kwh_used: fields.kwh_used,
        confidence_invoice_date: Some(fields.confidence_invoice_date),
        confidence_reading_type: Some(fields.confidence_reading_type),
        confidence_kwh: Some(fields.confidence_kwh),
        reviewer_notes: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: now,
        updated_at: now,
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    let status = lifecycle::apply(&tx, &document.id, Transition::CompleteExtraction { overall })
        .map_err(|e| match e {
            LifecycleError::Database(e) => WorkflowError::persistence("document_update", e),
            other => other.into(),
        })?;
    db::update_supplier_name(&tx, &document.id, &fields.supplier_name)
        .map_err(|e| WorkflowError::persistence("document_update", e))?;
    db::insert_invoice(&tx, &invoice).map_err(|e| WorkflowError::persistence("insert_invoice", e))?;
    audit(
        &tx,
        AuditAction::ExtractionCompleted,
        "document",
        Some(document.id.to_string()),
        triggered_by,
        Some(json!({
            "invoice_id": invoice.id,
            "overall_confidence": overall,
            "status": status,
        })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    tracing::info!(
        document_id = %document.id,
        invoice_id = %invoice.id,
        overall_confidence = ?overall,
        status = %status,
        "Extraction completed"
    );

    Ok(ExtractionOutcome {
        document_id: document.id,
        invoice_id: invoice.id,
        status,
        overall_confidence: overall,
        invalidates: vec![
            CacheScope::Document(document.id),
            CacheScope::Documents,
            CacheScope::Invoice(invoice.id),
            CacheScope::Invoices,
            CacheScope::DashboardStats,
            CacheScope::AuditLog,
        ],
    })
}

/// Best effort: the original error is what the caller sees, so failures here
/// are logged rather than returned.
fn mark_failed(conn: &Connection, document_id: &Uuid, triggered_by: Option<Uuid>, kind: &str) {
    tracing::warn!(document_id = %document_id, error_kind = kind, "Extraction failed");
    if let Err(e) = lifecycle::apply(conn, document_id, Transition::FailExtraction) {
        tracing::error!(document_id = %document_id, error = %e, "Could not mark document failed");
        return;
    }
    if let Err(e) = audit(
        conn,
        AuditAction::ExtractionFailed,
        "document",
        Some(document_id.to_string()),
        triggered_by,
        Some(json!({ "error_kind": kind })),
    ) {
        tracing::error!(document_id = %document_id, error = %e, "Could not audit extraction failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::MockVisionClient;
    use crate::models::enums::Role;
    use crate::workflow::test_support::{actor, fixture, pdf, Fixture};
    use crate::workflow::upload_document;

    fn uploaded_energy(fx: &Fixture) -> (Actor, Document) {
        let reviewer = actor(&fx.conn, Role::Reviewer);
        let (doc, _) =
            upload_document(&fx.conn, &fx.store, &reviewer, &pdf("bill.pdf"), DocumentType::Energy)
                .unwrap();
        (reviewer, doc)
    }

    fn run(fx: &Fixture, doc: &Document, client: &MockVisionClient) -> Result<ExtractionOutcome, WorkflowError> {
        let processing = begin_extraction(&fx.conn, &doc.id).unwrap();
        assert_eq!(processing.status, DocumentStatus::Processing);
        complete_extraction(&fx.conn, &fx.store, client, &doc.id, None)
    }

    fn stored(fx: &Fixture, id: &Uuid) -> Document {
        db::get_document(&fx.conn, id).unwrap().unwrap()
    }

    #[test]
    fn high_confidence_is_auto_approved() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let outcome = run(&fx, &doc, &MockVisionClient::with_confidences(90, 90, 90)).unwrap();

        assert_eq!(outcome.status, DocumentStatus::Approved);
        assert_eq!(outcome.overall_confidence, Some(90));
        let d = stored(&fx, &doc.id);
        assert_eq!(d.status, DocumentStatus::Approved);
        assert_eq!(d.overall_confidence, Some(90));
        assert_eq!(d.supplier_name.as_deref(), Some("Northern Power"));

        let invoice = db::get_invoice_by_document(&fx.conn, &doc.id).unwrap().unwrap();
        assert_eq!(invoice.id, outcome.invoice_id);
        assert_eq!(invoice.kwh_used, Some(412.5));
        assert!(invoice.reviewed_by.is_none());
    }

    #[test]
    fn exactly_85_is_not_review() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let outcome = run(&fx, &doc, &MockVisionClient::with_confidences(70, 90, 95)).unwrap();
        assert_eq!(outcome.overall_confidence, Some(85));
        assert_eq!(outcome.status, DocumentStatus::Approved);
    }

    #[test]
    fn low_confidence_needs_review() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let outcome = run(&fx, &doc, &MockVisionClient::with_confidences(70, 70, 70)).unwrap();
        assert_eq!(outcome.overall_confidence, Some(70));
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::NeedsReview);
    }

    #[test]
    fn rate_limit_fails_closed() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let err = run(&fx, &doc, &MockVisionClient::status(429, "")).unwrap_err();

        assert!(matches!(err, WorkflowError::Extraction(ExtractionError::RateLimited)));
        let d = stored(&fx, &doc.id);
        assert_eq!(d.status, DocumentStatus::Failed);
        assert!(d.overall_confidence.is_none());
        assert!(db::get_invoice_by_document(&fx.conn, &doc.id).unwrap().is_none());

        let log = db::list_audit_entries(&fx.conn, 10, 0).unwrap();
        assert_eq!(log[0].action, "extraction_failed");
        assert_eq!(log[0].details.as_ref().unwrap()["error_kind"], "rate_limited");
    }

    #[test]
    fn unparseable_reply_fails_without_fabricating_data() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let err = run(&fx, &doc, &MockVisionClient::content("Sorry, I can't read that.")).unwrap_err();
        assert!(matches!(err, WorkflowError::Extraction(ExtractionError::Parse(_))));
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Failed);
        assert!(db::get_invoice_by_document(&fx.conn, &doc.id).unwrap().is_none());
    }

    #[test]
    fn missing_file_is_a_download_failure() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        fx.store.delete(doc.file_url.as_deref().unwrap()).unwrap();

        let client = MockVisionClient::with_confidences(90, 90, 90);
        let err = run(&fx, &doc, &client).unwrap_err();
        assert!(matches!(err, WorkflowError::Extraction(ExtractionError::Download(_))));
        assert_eq!(client.calls(), 0);
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Failed);
    }

    #[test]
    fn legacy_url_reference_is_resolved() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let key = doc.file_url.clone().unwrap();
        fx.conn
            .execute(
                "UPDATE documents SET file_url = ?2 WHERE id = ?1",
                rusqlite::params![
                    doc.id.to_string(),
                    format!("https://x.example.co/storage/v1/object/public/documents/{key}")
                ],
            )
            .unwrap();
        let outcome = run(&fx, &doc, &MockVisionClient::with_confidences(95, 95, 95)).unwrap();
        assert_eq!(outcome.status, DocumentStatus::Approved);
    }

    #[test]
    fn retry_after_failure_succeeds() {
        let fx = fixture();
        let (reviewer, doc) = uploaded_energy(&fx);
        run(&fx, &doc, &MockVisionClient::status(502, "bad gateway")).unwrap_err();

        let client = MockVisionClient::with_confidences(60, 70, 80);
        let outcome = retry_extraction(&fx.conn, &fx.store, &client, &reviewer, &doc.id).unwrap();
        assert_eq!(outcome.status, DocumentStatus::NeedsReview);
        assert_eq!(outcome.overall_confidence, Some(70));
    }

    #[test]
    fn retry_while_processing_is_rejected() {
        let fx = fixture();
        let (reviewer, doc) = uploaded_energy(&fx);
        begin_extraction(&fx.conn, &doc.id).unwrap();

        let client = MockVisionClient::with_confidences(90, 90, 90);
        let err = retry_extraction(&fx.conn, &fx.store, &client, &reviewer, &doc.id).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
        assert_eq!(client.calls(), 0);
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Processing);
    }

    #[test]
    fn retry_audit_failure_leaves_status_untouched() {
        let fx = fixture();
        let (reviewer, doc) = uploaded_energy(&fx);
        run(&fx, &doc, &MockVisionClient::status(502, "bad gateway")).unwrap_err();
        fx.conn
            .execute_batch(
                "CREATE TRIGGER block_retry_audit BEFORE INSERT ON audit_log
                 WHEN NEW.action = 'retry'
                 BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
            )
            .unwrap();

        let client = MockVisionClient::with_confidences(90, 90, 90);
        let err = retry_extraction(&fx.conn, &fx.store, &client, &reviewer, &doc.id).unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence { step: "audit", .. }));
        assert_eq!(client.calls(), 0);
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Failed);
    }

    #[test]
    fn viewer_cannot_retry() {
        let fx = fixture();
        let (_, doc) = uploaded_energy(&fx);
        let viewer = actor(&fx.conn, Role::Viewer);
        let client = MockVisionClient::with_confidences(90, 90, 90);
        let err = retry_extraction(&fx.conn, &fx.store, &client, &viewer, &doc.id).unwrap_err();
        assert!(matches!(err, WorkflowError::Permission(_)));
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Uploaded);
    }

    #[test]
    fn transport_documents_are_not_extracted() {
        let fx = fixture();
        let reviewer = actor(&fx.conn, Role::Reviewer);
        let (doc, _) =
            upload_document(&fx.conn, &fx.store, &reviewer, &pdf("manifest.pdf"), DocumentType::Transport)
                .unwrap();
        let err = begin_extraction(&fx.conn, &doc.id).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(stored(&fx, &doc.id).status, DocumentStatus::Uploaded);
    }
}
