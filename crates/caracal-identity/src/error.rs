use caracal_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a principal named '{0}' already exists")]
    DuplicateName(String),

    #[error("principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("reassigning parent would create a cycle")]
    Cycle,

    #[error(transparent)]
    Core(#[from] CoreError),
}
