//! Audit log reader.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::with_db;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::config::AUDIT_PAGE_LIMIT;
use crate::db;
use crate::models::AuditEntry;

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub limit: u32,
    pub offset: u32,
}

/// `GET /api/audit-log?limit=&offset=`: newest first, at most 100 per page.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<AuditPage>, ApiError> {
    authorization::require(caller.role, Capability::ViewAuditLog)?;
    let limit = page.limit.unwrap_or(AUDIT_PAGE_LIMIT).clamp(1, AUDIT_PAGE_LIMIT);
    let offset = page.offset.unwrap_or(0);

    let entries = with_db(&ctx, move |_, conn| Ok(db::list_audit_entries(conn, limit, offset)?)).await?;
    Ok(Json(AuditPage {
        entries,
        limit,
        offset,
    }))
}
