//! Session endpoints.
//!
//! `POST /api/auth/login`: unprotected: email + password for a bearer token
//! `POST /api/auth/logout`: ends the presented session
//! `GET /api/auth/me`: the caller with role and capabilities

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::with_db;
use crate::api::error::ApiError;
use crate::api::types::{generate_token, hash_token, ActorContext, ApiContext};
use crate::authorization::{capabilities, Capability};
use crate::credentials::verify_password;
use crate::db;
use crate::models::{AuditAction, UserWithRole};
use crate::workflow::audit;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserWithRole,
}

#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserWithRole,
    pub capabilities: Vec<&'static str>,
}

/// `POST /api/auth/login`
///
/// Unknown email and wrong password return the same 401.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = with_db(&ctx, move |core, conn| {
        let Some(stored) = db::get_credentials_by_email(conn, &request.email)? else {
            return Err(ApiError::InvalidCredentials);
        };
        if !verify_password(&request.password, &stored.password_hash, &stored.password_salt) {
            tracing::info!(user_id = %stored.user.id, "Login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        let now = Utc::now();
        let expires_at = now + Duration::hours(core.session_ttl_hours);
        let token = generate_token();
        db::purge_expired_sessions(conn, &now)?;
        db::insert_session(conn, &hash_token(&token), &stored.user.id, &now, &expires_at)?;
        audit(
            conn,
            AuditAction::Login,
            "user",
            Some(stored.user.id.to_string()),
            Some(stored.user.id),
            None,
        )?;

        let role = db::get_role(conn, &stored.user.id)?;
        tracing::info!(user_id = %stored.user.id, role = %role, "Login");
        Ok(LoginResponse {
            token,
            expires_at,
            user: UserWithRole {
                user: stored.user,
                role,
            },
        })
    })
    .await?;
    Ok(Json(response))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<StatusCode, ApiError> {
    with_db(&ctx, move |_, conn| {
        db::delete_session(conn, &caller.token_hash)?;
        audit(
            conn,
            AuditAction::Logout,
            "user",
            Some(caller.user_id.to_string()),
            Some(caller.user_id),
            Some(json!({ "role": caller.role })),
        )?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = with_db(&ctx, move |_, conn| {
        db::get_user(conn, &caller.user_id)?.ok_or(ApiError::Unauthorized)
    })
    .await?;
    Ok(Json(MeResponse {
        user: UserWithRole {
            user,
            role: caller.role,
        },
        capabilities: capabilities(caller.role)
            .into_iter()
            .map(Capability::as_str)
            .collect(),
    }))
}
