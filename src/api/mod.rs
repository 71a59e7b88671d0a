//! HTTP API.
//!
//! JSON endpoints under `/api/`, protected by bearer-token sessions, plus
//! signature-gated file access under `/storage/`. The router is composable:
//! `api_router()` returns a `Router` that can be served or mounted elsewhere.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use types::ApiContext;
