use caracal_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
