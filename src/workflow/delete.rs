use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{audit, Actor, CacheScope, WorkflowError};
use crate::authorization::Capability;
use crate::db;
use crate::models::{AuditAction, Document};
use crate::storage::{storage_path, ObjectStore, StorageError};

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub document_id: Uuid,
    pub invoice_id: Option<Uuid>,
    /// False when the rows are gone but the stored file could not be removed.
    pub file_removed: bool,
    pub invalidates: Vec<CacheScope>,
}

/// Delete an invoice together with its document and stored file.
pub fn delete_invoice(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    invoice_id: &Uuid,
) -> Result<DeleteOutcome, WorkflowError> {
    actor.require(Capability::DeleteRecords)?;
    let invoice = db::get_invoice(conn, invoice_id)?
        .ok_or_else(|| WorkflowError::not_found("Invoice", invoice_id))?;
    let document = db::get_document(conn, &invoice.document_id)?
        .ok_or_else(|| WorkflowError::not_found("Document", invoice.document_id))?;
    cascade(conn, store, actor, &document, Some(invoice.id))
}

/// Delete a document, its invoice if any, and its stored file.
pub fn delete_document(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    document_id: &Uuid,
) -> Result<DeleteOutcome, WorkflowError> {
    actor.require(Capability::DeleteRecords)?;
    let document = db::get_document(conn, document_id)?
        .ok_or_else(|| WorkflowError::not_found("Document", document_id))?;
    let invoice_id = db::get_invoice_by_document(conn, document_id)?.map(|i| i.id);
    cascade(conn, store, actor, &document, invoice_id)
}

/// Invoice row, then document row, then file. The rows are removed before the
/// file so a storage failure never leaves a row pointing at nothing.
fn cascade(
    conn: &Connection,
    store: &dyn ObjectStore,
    actor: &Actor,
    document: &Document,
    invoice_id: Option<Uuid>,
) -> Result<DeleteOutcome, WorkflowError> {
    if let Some(invoice_id) = invoice_id {
        db::delete_invoice(conn, &invoice_id)
            .map_err(|e| WorkflowError::persistence("delete_invoice", e))?;
    }

    if let Err(e) = db::delete_document(conn, &document.id) {
        if invoice_id.is_some() {
            tracing::error!(
                document_id = %document.id,
                error = %e,
                "Partial delete: invoice removed but document row remains"
            );
        }
        return Err(WorkflowError::persistence("delete_document", e));
    }

    let file_removed = match remove_file(store, document) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                document_id = %document.id,
                error = %e,
                "Partial delete: rows removed but stored file remains"
            );
            false
        }
    };

    if let Err(e) = audit(
        conn,
        AuditAction::Delete,
        "document",
        Some(document.id.to_string()),
        Some(actor.user_id),
        Some(json!({
            "filename": document.filename,
            "invoice_id": invoice_id,
            "file_removed": file_removed,
        })),
    ) {
        tracing::error!(document_id = %document.id, error = %e, "Could not audit delete");
    }

    tracing::info!(document_id = %document.id, file_removed, "Document deleted");

    let mut invalidates = vec![CacheScope::Document(document.id), CacheScope::Documents];
    if let Some(id) = invoice_id {
        invalidates.push(CacheScope::Invoice(id));
        invalidates.push(CacheScope::Invoices);
    }
    invalidates.push(CacheScope::DashboardStats);
    invalidates.push(CacheScope::AuditLog);

    Ok(DeleteOutcome {
        document_id: document.id,
        invoice_id,
        file_removed,
        invalidates,
    })
}

/// An object that is already gone counts as removed.
fn remove_file(store: &dyn ObjectStore, document: &Document) -> Result<(), StorageError> {
    let Some(reference) = document.file_url.as_deref() else {
        return Ok(());
    };
    let key = storage_path(reference)?;
    match store.delete(&key) {
        Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::MockVisionClient;
    use crate::models::enums::{DocumentType, Role};
    use crate::workflow::test_support::{actor, fixture, pdf, Fixture};
    use crate::workflow::{begin_extraction, complete_extraction, upload_document};

    fn extracted(fx: &Fixture) -> (Document, Uuid) {
        let uploader = actor(&fx.conn, Role::Reviewer);
        let (doc, _) =
            upload_document(&fx.conn, &fx.store, &uploader, &pdf("bill.pdf"), DocumentType::Energy)
                .unwrap();
        begin_extraction(&fx.conn, &doc.id).unwrap();
        let client = MockVisionClient::with_confidences(70, 70, 70);
        let outcome = complete_extraction(&fx.conn, &fx.store, &client, &doc.id, None).unwrap();
        (doc, outcome.invoice_id)
    }

    #[test]
    fn invoice_delete_cascades_to_document_and_file() {
        let fx = fixture();
        let (doc, invoice_id) = extracted(&fx);
        let admin = actor(&fx.conn, Role::Admin);

        let outcome = delete_invoice(&fx.conn, &fx.store, &admin, &invoice_id).unwrap();
        assert!(outcome.file_removed);
        assert_eq!(outcome.invoice_id, Some(invoice_id));
        assert!(db::get_invoice(&fx.conn, &invoice_id).unwrap().is_none());
        assert!(db::get_document(&fx.conn, &doc.id).unwrap().is_none());
        assert!(matches!(
            fx.store.get(doc.file_url.as_deref().unwrap()),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn reviewer_cannot_delete() {
        let fx = fixture();
        let (doc, invoice_id) = extracted(&fx);
        let reviewer = actor(&fx.conn, Role::Reviewer);

        let err = delete_invoice(&fx.conn, &fx.store, &reviewer, &invoice_id).unwrap_err();
        assert!(matches!(err, WorkflowError::Permission(_)));
        assert!(db::get_document(&fx.conn, &doc.id).unwrap().is_some());
        assert!(fx.store.get(doc.file_url.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn document_without_invoice_is_deleted() {
        let fx = fixture();
        let admin = actor(&fx.conn, Role::Admin);
        let (doc, _) =
            upload_document(&fx.conn, &fx.store, &admin, &pdf("manifest.pdf"), DocumentType::Transport)
                .unwrap();

        let outcome = delete_document(&fx.conn, &fx.store, &admin, &doc.id).unwrap();
        assert!(outcome.invoice_id.is_none());
        assert!(!outcome.invalidates.contains(&CacheScope::Invoices));
        assert!(db::get_document(&fx.conn, &doc.id).unwrap().is_none());
    }

    #[test]
    fn unrecognised_reference_reports_file_not_removed() {
        let fx = fixture();
        let (doc, invoice_id) = extracted(&fx);
        fx.conn
            .execute(
                "UPDATE documents SET file_url = 'https://elsewhere.example/x.pdf' WHERE id = ?1",
                rusqlite::params![doc.id.to_string()],
            )
            .unwrap();
        let admin = actor(&fx.conn, Role::Admin);

        let outcome = delete_invoice(&fx.conn, &fx.store, &admin, &invoice_id).unwrap();
        assert!(!outcome.file_removed);
        assert!(db::get_document(&fx.conn, &doc.id).unwrap().is_none());

        let log = db::list_audit_entries(&fx.conn, 1, 0).unwrap();
        assert_eq!(log[0].action, "delete");
        assert_eq!(log[0].details.as_ref().unwrap()["file_removed"], false);
    }

    #[test]
    fn already_missing_file_counts_as_removed() {
        let fx = fixture();
        let (doc, invoice_id) = extracted(&fx);
        fx.store.delete(doc.file_url.as_deref().unwrap()).unwrap();
        let admin = actor(&fx.conn, Role::Admin);
        let outcome = delete_invoice(&fx.conn, &fx.store, &admin, &invoice_id).unwrap();
        assert!(outcome.file_removed);
    }
}
