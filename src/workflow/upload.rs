use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::{audit, Actor, CacheScope, WorkflowError};
use crate::authorization::Capability;
use crate::config::MAX_UPLOAD_BYTES;
use crate::db;
use crate::models::enums::{DocumentStatus, DocumentType};
use crate::models::{AuditAction, Document};
use crate::storage::ObjectStore;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// One file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Accept PDFs only: declared as PDF, within the size cap, and carrying the
/// PDF header bytes.
pub fn validate_pdf(file: &UploadFile) -> Result<(), WorkflowError> {
    let name = file.filename.trim();
    if name.is_empty() {
        return Err(WorkflowError::Validation("Filename is required".into()));
    }

    let declared_pdf = match file.content_type.as_deref() {
        Some(ct) => ct
            .split(';')
            .next()
            .is_some_and(|base| base.trim().eq_ignore_ascii_case("application/pdf")),
        None => name.to_ascii_lowercase().ends_with(".pdf"),
    };
    if !declared_pdf {
        return Err(WorkflowError::Validation(format!(
            "{name}: only PDF files are accepted"
        )));
    }

    if file.bytes.is_empty() {
        return Err(WorkflowError::Validation(format!("{name}: file is empty")));
    }
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(WorkflowError::Validation(format!(
            "{name}: file exceeds the {} MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    if !file.bytes.starts_with(PDF_MAGIC) {
        return Err(WorkflowError::Validation(format!(
            "{name}: content is not a PDF"
        )));
    }
    Ok(())
}

/// Store the file, then record the document as `uploaded`.
///
/// Extraction is not started here; energy documents are handed to
/// [`super::begin_extraction`] by the caller.
pub fn upload_document(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    file: &UploadFile,
    document_type: DocumentType,
) -> Result<(Document, Vec<CacheScope>), WorkflowError> {
    actor.require(Capability::UploadDocument)?;
    validate_pdf(file)?;

    let id = Uuid::new_v4();
    let key = format!("{}.pdf", Uuid::new_v4());
    store
        .put(&key, &file.bytes)
        .map_err(|e| WorkflowError::persistence("store_file", e))?;

    let document = Document {
        id,
        filename: file.filename.trim().to_string(),
        file_url: Some(key.clone()),
        document_type,
        supplier_name: None,
        status: DocumentStatus::Uploaded,
        overall_confidence: None,
        uploaded_at: Utc::now(),
        uploaded_by: Some(actor.user_id),
    };

    if let Err(e) = record_upload(conn, actor, &document) {
        if let Err(cleanup) = store.delete(&key) {
            tracing::warn!(key = %key, error = %cleanup, "Orphaned upload left in storage");
        }
        return Err(e);
    }

    tracing::info!(
        document_id = %document.id,
        document_type = %document_type,
        size = file.bytes.len(),
        "Document uploaded"
    );
    Ok((
        document,
        vec![CacheScope::Documents, CacheScope::DashboardStats, CacheScope::AuditLog],
    ))
}

fn record_upload(conn: &Connection, actor: &Actor, document: &Document) -> Result<(), WorkflowError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    db::insert_document(&tx, document).map_err(|e| WorkflowError::persistence("insert_document", e))?;
    audit(
        &tx,
        AuditAction::Upload,
        "document",
        Some(document.id.to_string()),
        Some(actor.user_id),
        Some(json!({
            "filename": document.filename,
            "document_type": document.document_type,
        })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;
    use crate::storage::ObjectStore;
    use crate::workflow::test_support::{actor, fixture, pdf};

    #[test]
    fn upload_stores_file_and_creates_uploaded_document() {
        let fx = fixture();
        let reviewer = actor(&fx.conn, Role::Reviewer);

        let (doc, scopes) =
            upload_document(&fx.conn, &fx.store, &reviewer, &pdf("bill.pdf"), DocumentType::Energy)
                .unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.uploaded_by, Some(reviewer.user_id));
        assert!(scopes.contains(&CacheScope::Documents));

        let key = doc.file_url.as_deref().unwrap();
        assert!(key.ends_with(".pdf"));
        assert!(fx.store.get(key).unwrap().starts_with(PDF_MAGIC));

        let stored = db::get_document(&fx.conn, &doc.id).unwrap().unwrap();
        assert_eq!(stored.filename, "bill.pdf");

        let log = db::list_audit_entries(&fx.conn, 10, 0).unwrap();
        assert_eq!(log[0].action, "upload");
        assert_eq!(log[0].details.as_ref().unwrap()["document_type"], "energy");
    }

    #[test]
    fn viewer_cannot_upload() {
        let fx = fixture();
        let viewer = actor(&fx.conn, Role::Viewer);
        let err =
            upload_document(&fx.conn, &fx.store, &viewer, &pdf("bill.pdf"), DocumentType::Energy)
                .unwrap_err();
        assert!(matches!(err, WorkflowError::Permission(_)));
        assert!(db::list_documents(&fx.conn, None).unwrap().is_empty());
    }

    #[test]
    fn non_pdf_is_rejected() {
        let mut png = pdf("photo.png");
        png.content_type = Some("image/png".into());
        assert!(matches!(validate_pdf(&png), Err(WorkflowError::Validation(_))));

        let mut fake = pdf("fake.pdf");
        fake.bytes = b"GIF89a".to_vec();
        assert!(matches!(validate_pdf(&fake), Err(WorkflowError::Validation(_))));

        let mut undeclared = pdf("notes.txt");
        undeclared.content_type = None;
        assert!(matches!(validate_pdf(&undeclared), Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn extension_is_enough_without_content_type() {
        let mut file = pdf("BILL.PDF");
        file.content_type = None;
        assert!(validate_pdf(&file).is_ok());

        file.content_type = Some("application/pdf; charset=binary".into());
        assert!(validate_pdf(&file).is_ok());
    }

    #[test]
    fn size_limit_is_enforced() {
        let mut big = pdf("big.pdf");
        big.bytes.resize(MAX_UPLOAD_BYTES + 1, b' ');
        assert!(matches!(validate_pdf(&big), Err(WorkflowError::Validation(_))));

        let mut empty = pdf("empty.pdf");
        empty.bytes.clear();
        assert!(matches!(validate_pdf(&empty), Err(WorkflowError::Validation(_))));
    }
}
