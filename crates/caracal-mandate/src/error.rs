use caracal_core::CoreError;
use thiserror::Error;

/// Every distinct failure path gets its own kind (spec §4.2): callers must
/// never learn "signature bad" vs "expired" vs "unknown issuer" as the same
/// thing.
#[derive(Debug, Error)]
pub enum MandateError {
    #[error("principal not found: {0}")]
    PrincipalNotFound(String),

    #[error("issuer has no private key material")]
    MissingPrivateKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("mandate expired")]
    Expired,

    #[error("unknown issuer")]
    UnknownIssuer,

    #[error("malformed mandate token: {0}")]
    Malformed(String),

    #[error("missing required claim: {0}")]
    MissingClaim(String),

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("mandate not found: {0}")]
    NotFound(String),

    #[error("scope denied: action '{action}' on resource '{resource}'")]
    ScopeDenied { action: String, resource: String },

    #[error("delegation depth exceeded")]
    DepthExceeded,

    #[error("mandate revoked")]
    Revoked,

    #[error(transparent)]
    Core(#[from] CoreError),
}
