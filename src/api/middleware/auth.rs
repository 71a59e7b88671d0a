//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves the session to a user and
//! role, and injects `ActorContext` into request extensions for handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::{hash_token, ActorContext, ApiContext};
use crate::db;

/// Require a live session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `ActorContext` and marks the response `no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let token_hash = hash_token(token);

    let core = ctx.core.clone();
    let resolved = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = core.open_db()?;
        let Some(user_id) = db::get_session_user(&conn, &token_hash, &Utc::now())? else {
            return Ok(None);
        };
        let role = db::get_role(&conn, &user_id)?;
        Ok(Some((user_id, role)))
    })
    .await??;

    let (user_id, role) = resolved.ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(ActorContext {
        user_id,
        role,
        token_hash,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}

fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn bearer_token_parsing() {
        let req = Request::builder()
            .header("Authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("abc123"));

        let basic = Request::builder()
            .header("Authorization", "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&basic), None);

        let blank = Request::builder()
            .header("Authorization", "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&blank), None);
    }
}
