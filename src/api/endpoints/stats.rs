//! Dashboard counters.

use axum::extract::State;
use axum::{Extension, Json};

use super::with_db;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::db::{self, DashboardStats};

/// `GET /api/stats`
pub async fn dashboard(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<Json<DashboardStats>, ApiError> {
    authorization::require(caller.role, Capability::ReadRecords)?;
    let stats = with_db(&ctx, |_, conn| Ok(db::dashboard_stats(conn)?)).await?;
    Ok(Json(stats))
}
