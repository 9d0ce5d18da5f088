use caracal_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("policy not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
