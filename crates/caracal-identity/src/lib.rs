pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use registry::PrincipalRegistry;
pub use types::Principal;
