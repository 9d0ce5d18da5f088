use thiserror::Error;

/// Shared error taxonomy. Every downstream crate's error type converts into
/// one of these kinds at its boundary; nothing here is ever merged with
/// anything else, per the fail-closed discipline this core is built around.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration ──────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Configuration(String),

    // ── Validation ─────────────────────────────────────────────────────────
    #[error("validation error: {0}")]
    Validation(String),

    // ── Not found / conflict ───────────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    // ── Persistence ────────────────────────────────────────────────────────
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("persistent I/O error (retries exhausted): {0}")]
    PersistentIo(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Catch-all ──────────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
