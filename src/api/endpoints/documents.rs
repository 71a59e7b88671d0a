//! Document endpoints: list, detail, upload, retry, preview, delete.
//!
//! `POST /api/documents` receives base64-encoded PDFs in a JSON body and
//! processes them strictly one after another. Energy documents are flipped
//! to `processing` before the response is sent; the model call then runs
//! detached on the blocking pool and outlives the request.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_id, with_db, Mutation};
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::core_state::CoreState;
use crate::db;
use crate::models::enums::{DocumentStatus, DocumentType};
use crate::models::{Document, EnergyInvoice};
use crate::storage::{storage_path, SignedUrl, StorageError};
use crate::workflow::{self, CacheScope, DeleteOutcome, ExtractionOutcome, UploadFile};

// ═══════════════════════════════════════════════════════════
// Read
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub invoice: Option<EnergyInvoice>,
}

/// `GET /api/documents[?status=]`: newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let status = query
        .status
        .as_deref()
        .map(DocumentStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let documents = with_db(&ctx, move |_, conn| Ok(db::list_documents(conn, status)?)).await?;
    Ok(Json(documents))
}

/// `GET /api/documents/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDetail>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let id = parse_id(&id)?;

    let detail = with_db(&ctx, move |_, conn| {
        let document = db::get_document(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;
        let invoice = db::get_invoice_by_document(conn, &id)?;
        Ok(DocumentDetail { document, invoice })
    })
    .await?;
    Ok(Json(detail))
}

/// `GET /api/documents/:id/preview-url`: signed, short-lived link to the PDF.
pub async fn preview_url(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<SignedUrl>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let id = parse_id(&id)?;

    let signed = with_db(&ctx, move |core, conn| {
        let document = db::get_document(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;
        let reference = document
            .file_url
            .ok_or_else(|| ApiError::NotFound("Document has no stored file".into()))?;
        let key = storage_path(&reference).map_err(|e| match e {
            StorageError::UnrecognisedReference(_) => {
                tracing::warn!(document_id = %id, "Unrecognised storage reference");
                ApiError::NotFound("Stored file not found".into())
            }
            other => ApiError::Internal(other.to_string()),
        })?;
        Ok(core.signer.sign(&key, Utc::now()))
    })
    .await?;
    Ok(Json(signed))
}

// ═══════════════════════════════════════════════════════════
// Upload
// ═══════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct UploadRequest {
    pub document_type: DocumentType,
    pub files: Vec<UploadPayload>,
}

#[derive(Deserialize)]
pub struct UploadPayload {
    pub filename: String,
    pub content_type: Option<String>,
    /// Base64, or a `data:` URL carrying base64.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<FileResult>,
}

/// `POST /api/documents`
///
/// Each file succeeds or fails on its own. The request fails only when no
/// file was accepted, with the first file's error.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<Mutation<UploadResponse>>, ApiError> {
    let actor = caller.actor();
    actor.require(Capability::UploadDocument)?;
    if request.files.is_empty() {
        return Err(ApiError::Validation("No files in upload".into()));
    }

    let document_type = request.document_type;
    let (results, invalidates, first_error, to_extract) = with_db(&ctx, move |core, conn| {
        let mut results = Vec::with_capacity(request.files.len());
        let mut invalidates: Vec<CacheScope> = Vec::new();
        let mut first_error: Option<ApiError> = None;
        let mut to_extract = Vec::new();

        for payload in request.files {
            let filename = payload.filename.clone();
            match upload_one(core, conn, &actor, payload, document_type) {
                Ok((document, scopes)) => {
                    if document.status == DocumentStatus::Processing {
                        to_extract.push(document.id);
                    }
                    for scope in scopes {
                        if !invalidates.contains(&scope) {
                            invalidates.push(scope);
                        }
                    }
                    results.push(FileResult {
                        filename,
                        document: Some(document),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(filename = %filename, error = %e, "Upload rejected");
                    results.push(FileResult {
                        filename,
                        document: None,
                        error: Some(e.to_string()),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }
        Ok((results, invalidates, first_error, to_extract))
    })
    .await?;

    if results.iter().all(|r| r.document.is_none()) {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    for document_id in to_extract {
        spawn_extraction(ctx.core.clone(), document_id, Some(actor.user_id));
    }

    Ok(Json(Mutation::new(UploadResponse { results }, invalidates)))
}

fn upload_one(
    core: &CoreState,
    conn: &rusqlite::Connection,
    actor: &workflow::Actor,
    payload: UploadPayload,
    document_type: DocumentType,
) -> Result<(Document, Vec<CacheScope>), ApiError> {
    let bytes = decode_base64(&payload.data)
        .map_err(|e| ApiError::Validation(format!("{}: invalid file data: {e}", payload.filename)))?;
    let file = UploadFile {
        filename: payload.filename,
        content_type: payload.content_type,
        bytes,
    };
    let (mut document, scopes) =
        workflow::upload_document(conn, core.store.as_ref(), actor, &file, document_type)?;

    if document_type == DocumentType::Energy {
        match workflow::begin_extraction(conn, &document.id) {
            Ok(processing) => document = processing,
            Err(e) => {
                tracing::warn!(document_id = %document.id, error = %e, "Could not start extraction");
            }
        }
    }
    Ok((document, scopes))
}

/// Run extraction for a `processing` document without waiting for it.
fn spawn_extraction(core: Arc<CoreState>, document_id: Uuid, triggered_by: Option<Uuid>) {
    tokio::task::spawn_blocking(move || {
        let result = core.open_db().map_err(|e| e.to_string()).and_then(|conn| {
            workflow::complete_extraction(
                &conn,
                core.store.as_ref(),
                core.client.as_ref(),
                &document_id,
                triggered_by,
            )
            .map_err(|e| e.to_string())
        });
        match result {
            Ok(outcome) => tracing::info!(
                document_id = %document_id,
                status = %outcome.status,
                "Background extraction finished"
            ),
            Err(e) => tracing::warn!(document_id = %document_id, error = %e, "Background extraction failed"),
        }
    });
}

/// Accepts plain base64 or a `data:<mime>;base64,<payload>` URL.
fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    base64::engine::general_purpose::STANDARD.decode(encoded.trim())
}

// ═══════════════════════════════════════════════════════════
// Retry / delete
// ═══════════════════════════════════════════════════════════

/// `POST /api/documents/:id/retry`: waits for the extraction result.
pub async fn retry(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<ExtractionOutcome>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let outcome = with_db(&ctx, move |core, conn| {
        Ok(workflow::retry_extraction(
            conn,
            core.store.as_ref(),
            core.client.as_ref(),
            &actor,
            &id,
        )?)
    })
    .await?;
    Ok(Json(outcome))
}

/// `DELETE /api/documents/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let outcome = with_db(&ctx, move |core, conn| {
        Ok(workflow::delete_document(conn, core.store.as_ref(), &actor, &id)?)
    })
    .await?;
    Ok(Json(outcome))
}
