use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("bcrypt error: {0}")]
    Bcrypt(String),
}
