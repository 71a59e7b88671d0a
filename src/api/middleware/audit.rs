//! Access logging middleware.
//!
//! Logs every API request with user id, method, path, status and latency.
//! Runs innermost (after auth has injected `ActorContext`). Business events
//! go to the audit table from the workflow layer, not from here.

use std::time::Instant;

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ActorContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user_id = req.extensions().get::<ActorContext>().map(|a| a.user_id);
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match user_id {
        Some(user_id) => {
            tracing::debug!(%method, path, status, elapsed_ms, user_id = %user_id, "API access")
        }
        None => tracing::debug!(%method, path, status, elapsed_ms, "API access"),
    }
    response
}
