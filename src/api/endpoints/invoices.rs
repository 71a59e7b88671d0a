//! Energy invoice endpoints: list, detail, CSV export, edit, approve, delete.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;

use super::{parse_id, with_db, Mutation};
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::db;
use crate::export;
use crate::models::{InvoicePatch, InvoiceWithDocument};
use crate::workflow::{self, DeleteOutcome};

/// `GET /api/invoices`: newest first, each with its document.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<Json<Vec<InvoiceWithDocument>>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let invoices = with_db(&ctx, |_, conn| Ok(db::list_invoices_with_documents(conn)?)).await?;
    Ok(Json(invoices))
}

/// `GET /api/invoices/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceWithDocument>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let id = parse_id(&id)?;
    let invoice = with_db(&ctx, move |_, conn| {
        db::get_invoice_with_document(conn, &id)?
            .ok_or_else(|| ApiError::NotFound("Invoice not found".into()))
    })
    .await?;
    Ok(Json(invoice))
}

/// `GET /api/invoices/export.csv`
pub async fn export_csv(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<impl IntoResponse, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let invoices = with_db(&ctx, |_, conn| Ok(db::list_invoices_with_documents(conn)?)).await?;

    let body = export::invoices_csv(&invoices);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::export_filename(Utc::now().date_naive())
    );
    tracing::info!(rows = invoices.len(), user_id = %caller.user_id, "Invoice export");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// `PATCH /api/invoices/:id`
pub async fn edit(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(patch): Json<InvoicePatch>,
) -> Result<Json<Mutation<InvoiceWithDocument>>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let (invoice, invalidates) =
        with_db(&ctx, move |_, conn| Ok(workflow::edit_invoice(conn, &actor, &id, &patch)?)).await?;
    Ok(Json(Mutation::new(invoice, invalidates)))
}

/// `POST /api/invoices/:id/approve`
pub async fn approve(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<Mutation<InvoiceWithDocument>>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let (invoice, invalidates) =
        with_db(&ctx, move |_, conn| Ok(workflow::approve_invoice(conn, &actor, &id)?)).await?;
    Ok(Json(Mutation::new(invoice, invalidates)))
}

/// `DELETE /api/invoices/:id`: removes the invoice, its document and the file.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let outcome = with_db(&ctx, move |core, conn| {
        Ok(workflow::delete_invoice(conn, core.store.as_ref(), &actor, &id)?)
    })
    .await?;
    Ok(Json(outcome))
}
