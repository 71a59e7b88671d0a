//! HTTP router.
//!
//! Returns a composable `Router`. JSON routes are nested under `/api/`;
//! signed file access lives at `/storage/documents/*key`.
//!
//! Middleware stack on protected routes (outermost → innermost):
//! 1. Auth validator → 2. Access logger

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::MAX_REQUEST_BODY_BYTES;
use crate::core_state::CoreState;

/// Build the service router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/auth/me", get(endpoints::auth::me))
        .route(
            "/documents",
            get(endpoints::documents::list).post(endpoints::documents::upload),
        )
        .route(
            "/documents/:id",
            get(endpoints::documents::detail).delete(endpoints::documents::delete),
        )
        .route("/documents/:id/retry", post(endpoints::documents::retry))
        .route(
            "/documents/:id/preview-url",
            get(endpoints::documents::preview_url),
        )
        .route("/invoices", get(endpoints::invoices::list))
        .route("/invoices/export.csv", get(endpoints::invoices::export_csv))
        .route(
            "/invoices/:id",
            get(endpoints::invoices::detail)
                .patch(endpoints::invoices::edit)
                .delete(endpoints::invoices::delete),
        )
        .route("/invoices/:id/approve", post(endpoints::invoices::approve))
        .route("/transport-records", get(endpoints::transport::list))
        .route("/stats", get(endpoints::stats::dashboard))
        .route("/audit-log", get(endpoints::audit::list))
        .route(
            "/users",
            get(endpoints::users::list).post(endpoints::users::create),
        )
        .route("/users/:id/role", put(endpoints::users::set_role))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access));

    // Signature-gated file access
    let storage = Router::new()
        .route("/storage/documents/*key", get(endpoints::storage::serve))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .merge(storage)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}
