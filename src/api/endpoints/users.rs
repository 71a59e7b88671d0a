//! User administration (admin only).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::{parse_id, with_db, Mutation};
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::{self, Capability};
use crate::db;
use crate::models::enums::Role;
use crate::models::UserWithRole;
use crate::workflow::{self, NewUser};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Viewer
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// `GET /api/users`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
) -> Result<Json<Vec<UserWithRole>>, ApiError> {
    authorization::require(caller.role, Capability::ManageUsers)?;
    let users = with_db(&ctx, |_, conn| Ok(db::list_users_with_roles(conn)?)).await?;
    Ok(Json(users))
}

/// `POST /api/users`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Mutation<UserWithRole>>), ApiError> {
    let actor = caller.actor();
    let (user, invalidates) = with_db(&ctx, move |core, conn| {
        let new_user = NewUser {
            email: &request.email,
            password: &request.password,
            full_name: request.full_name.as_deref(),
            role: request.role,
        };
        Ok(workflow::create_user(conn, &actor, &new_user, core.pbkdf2_iterations)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(Mutation::new(user, invalidates))))
}

/// `PUT /api/users/:id/role`
pub async fn set_role(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<Mutation<UserWithRole>>, ApiError> {
    let id = parse_id(&id)?;
    let actor = caller.actor();
    let (user, invalidates) =
        with_db(&ctx, move |_, conn| Ok(workflow::change_role(conn, &actor, &id, request.role)?)).await?;
    Ok(Json(Mutation::new(user, invalidates)))
}
