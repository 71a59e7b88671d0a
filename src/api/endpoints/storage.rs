//! Signed file access, mounted outside `/api`.
//!
//! `GET /storage/documents/*key?expires=&signature=` serves the stored PDF
//! when the signature matches and has not expired. No bearer token: the
//! signature is the credential.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::storage::{validate_key, SignatureError, StorageError};

#[derive(Deserialize)]
pub struct SignatureQuery {
    pub expires: i64,
    pub signature: String,
}

pub async fn serve(
    State(ctx): State<ApiContext>,
    Path(key): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = key.trim_start_matches('/').to_string();
    validate_key(&key).map_err(|_| ApiError::NotFound("File not found".into()))?;

    ctx.core
        .signer
        .verify(&key, query.expires, &query.signature, Utc::now())
        .map_err(|e| match e {
            SignatureError::Expired => ApiError::Forbidden("Link has expired".into()),
            _ => ApiError::Forbidden("Invalid signature".into()),
        })?;

    let core = ctx.core.clone();
    let lookup = key.clone();
    let bytes = tokio::task::spawn_blocking(move || core.store.get(&lookup))
        .await?
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::NotFound("File not found".into()),
            other => ApiError::Internal(other.to_string()),
        })?;

    let mime = mime_guess::from_path(&key)
        .first_raw()
        .unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, "inline".to_string()),
            (header::CACHE_CONTROL, "private, no-store".to_string()),
        ],
        bytes,
    ))
}
