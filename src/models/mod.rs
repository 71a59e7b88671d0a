pub mod audit;
pub mod document;
pub mod energy_invoice;
pub mod enums;
pub mod transport;
pub mod user;

pub use audit::*;
pub use document::*;
pub use energy_invoice::*;
pub use transport::*;
pub use user::*;
