//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` so callers decide the unit of
//! work (plain connection or an open transaction).

mod audit;
pub(crate) mod document;
pub(crate) mod energy_invoice;
mod stats;
mod transport;
mod user;

pub use audit::*;
pub use document::*;
pub use energy_invoice::*;
pub use stats::*;
pub use transport::*;
pub use user::*;
