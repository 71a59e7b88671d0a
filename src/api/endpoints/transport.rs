//! Transport reference data (read-only).

use axum::extract::State;
use axum::{Extension, Json};

use super::with_db;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::db;
use crate::models::TransportRecord;

/// `GET /api/transport-records`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<Json<Vec<TransportRecord>>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let records = with_db(&ctx, |_, conn| Ok(db::list_transport_records(conn)?)).await?;
    Ok(Json(records))
}
