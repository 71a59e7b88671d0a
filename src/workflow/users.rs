use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::{audit, Actor, CacheScope, WorkflowError};
use crate::authorization::Capability;
use crate::credentials::{hash_password, validate_password};
use crate::db::{self, DatabaseError};
use crate::models::enums::Role;
use crate::models::{AuditAction, UserWithRole};

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
    pub role: Role,
}

/// Admin creates an account with an explicit role.
pub fn create_user(
    conn: &Connection,
    actor: &Actor,
    new_user: &NewUser<'_>,
    pbkdf2_iterations: u32,
) -> Result<(UserWithRole, Vec<CacheScope>), WorkflowError> {
    actor.require(Capability::ManageUsers)?;
    let created = insert_with_role(conn, new_user, pbkdf2_iterations, Some(actor.user_id))?;
    Ok((created, vec![CacheScope::Users, CacheScope::AuditLog]))
}

/// Reassign a user's role. Admins cannot change their own role.
pub fn change_role(
    conn: &Connection,
    actor: &Actor,
    user_id: &Uuid,
    role: Role,
) -> Result<(UserWithRole, Vec<CacheScope>), WorkflowError> {
    actor.require(Capability::ManageUsers)?;
    if *user_id == actor.user_id {
        return Err(WorkflowError::Validation("You cannot change your own role".into()));
    }
    let user = db::get_user(conn, user_id)?.ok_or_else(|| WorkflowError::not_found("User", user_id))?;
    let previous = db::get_role(conn, user_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    db::set_role(&tx, user_id, role).map_err(|e| WorkflowError::persistence("role_update", e))?;
    audit(
        &tx,
        AuditAction::RoleChange,
        "user",
        Some(user_id.to_string()),
        Some(actor.user_id),
        Some(json!({ "from": previous, "to": role })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    tracing::info!(user_id = %user_id, from = %previous, to = %role, "Role changed");
    Ok((UserWithRole { user, role }, vec![CacheScope::Users, CacheScope::AuditLog]))
}

/// Create the first administrator when no account exists yet. Returns
/// `None` when users are already present.
pub fn bootstrap_admin(
    conn: &Connection,
    email: &str,
    password: &str,
    pbkdf2_iterations: u32,
) -> Result<Option<UserWithRole>, WorkflowError> {
    if db::count_users(conn)? > 0 {
        return Ok(None);
    }
    let new_user = NewUser {
        email,
        password,
        full_name: None,
        role: Role::Admin,
    };
    let created = insert_with_role(conn, &new_user, pbkdf2_iterations, None)?;
    tracing::info!(user_id = %created.user.id, "Bootstrap administrator created");
    Ok(Some(created))
}

fn insert_with_role(
    conn: &Connection,
    new_user: &NewUser<'_>,
    pbkdf2_iterations: u32,
    created_by: Option<Uuid>,
) -> Result<UserWithRole, WorkflowError> {
    let email = new_user.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(WorkflowError::Validation("A valid email address is required".into()));
    }
    validate_password(new_user.password).map_err(WorkflowError::Validation)?;

    let stored = hash_password(new_user.password, pbkdf2_iterations);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| WorkflowError::persistence("begin", e))?;
    let user = db::insert_user(&tx, email, new_user.full_name, &stored.hash, &stored.salt)
        .map_err(|e| match e {
            DatabaseError::ConstraintViolation(msg) => WorkflowError::Conflict(msg),
            other => WorkflowError::persistence("insert_user", other),
        })?;
    db::set_role(&tx, &user.id, new_user.role)
        .map_err(|e| WorkflowError::persistence("role_update", e))?;
    audit(
        &tx,
        AuditAction::CreateUser,
        "user",
        Some(user.id.to_string()),
        created_by,
        Some(json!({ "email": user.email, "role": new_user.role })),
    )?;
    tx.commit().map_err(|e| WorkflowError::persistence("commit", e))?;

    Ok(UserWithRole {
        user,
        role: new_user.role,
    })
}
