pub mod claims;
pub mod error;
pub mod manager;

pub use claims::{Mandate, MandateClaims, AUDIENCE};
pub use error::MandateError;
pub use manager::MandateManager;
