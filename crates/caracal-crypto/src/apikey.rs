use crate::error::CryptoError;

const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hash a plaintext API key for storage in a principal's metadata bag
/// (`api_key_hash`), grounded on the original authenticator's bcrypt usage.
pub fn hash_api_key(plain: &str) -> Result<String, CryptoError> {
    bcrypt::hash(plain, DEFAULT_COST).map_err(|e| CryptoError::Bcrypt(e.to_string()))
}

/// Verify a plaintext API key against a stored bcrypt hash. Returns `false`
/// (never an error) on malformed hashes so callers can treat this purely as
/// a boolean match, matching the original's `try/except: continue` loop
/// over all principals during API-key authentication.
pub fn verify_api_key(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}
