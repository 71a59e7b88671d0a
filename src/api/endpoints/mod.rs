//! API endpoint handlers.
//!
//! Handlers parse the request, run the blocking workflow call on the blocking
//! pool with a fresh connection, and shape the JSON response.

pub mod audit;
pub mod auth;
pub mod documents;
pub mod health;
pub mod invoices;
pub mod stats;
pub mod storage;
pub mod transport;
pub mod users;

use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::workflow::CacheScope;

/// Run `f` on the blocking pool with its own database connection.
pub(crate) async fn with_db<T, F>(ctx: &ApiContext, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&CoreState, &Connection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let core: Arc<CoreState> = ctx.core.clone();
    tokio::task::spawn_blocking(move || {
        let conn = core.open_db()?;
        f(&core, &conn)
    })
    .await?
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {raw}")))
}

/// Body of a mutating response: the resource plus the cache scopes it touched.
#[derive(Debug, Serialize)]
pub struct Mutation<T: Serialize> {
    #[serde(flatten)]
    pub body: T,
    pub invalidates: Vec<CacheScope>,
}

impl<T: Serialize> Mutation<T> {
    pub fn new(body: T, invalidates: Vec<CacheScope>) -> Self {
        Self { body, invalidates }
    }
}
