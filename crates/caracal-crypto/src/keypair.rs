use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// An ECDSA-P256 key pair. Grounded on the teacher's `KeyPair` (which wraps a
/// Dilithium key pair and zeroizes on drop); here the secret half is kept in
/// a `Zeroizing` buffer for the same reason even though `p256::SecretKey`
/// already zeroizes internally, so any copy taken of the raw bytes is
/// covered too.
pub struct KeyPair {
    pub public_key_pem: String,
    secret_key: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let public_key_pem = verifying_key
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .expect("encoding a freshly generated public key never fails");
        let private_der = signing_key
            .to_pkcs8_der()
            .expect("encoding a freshly generated private key never fails");
        Self {
            public_key_pem,
            secret_key: Zeroizing::new(private_der.as_bytes().to_vec()),
        }
    }

    /// Reconstruct a key pair from its PEM-encoded PKCS#8 private key, the
    /// form stored in the registry's metadata bag.
    pub fn from_private_pem(pem: &str) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let verifying_key = VerifyingKey::from(&signing_key);
        let public_key_pem = verifying_key
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let private_der = signing_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            public_key_pem,
            secret_key: Zeroizing::new(private_der.as_bytes().to_vec()),
        })
    }

    pub fn private_key_pem(&self) -> Result<String, CryptoError> {
        let signing_key = self.signing_key()?;
        signing_key
            .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        SigningKey::from_pkcs8_der(&self.secret_key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Sign `message` (the canonical claim bytes for a mandate), returning
    /// the raw fixed-size signature bytes (r || s).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = self.signing_key()?;
        let signature: Signature = signing_key.try_sign(message).map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_pem", &self.public_key_pem)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Verify `signature` over `message` using `public_key_pem`. Used both by
/// direct callers and by the mandate manager, which loads the issuer's
/// public key out of the registry.
pub fn verify(public_key_pem: &str, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::generate();
        let msg = b"canonical claim bytes";
        let sig = kp.sign(msg).unwrap();
        verify(&kp.public_key_pem, msg, &sig).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original").unwrap();
        assert!(verify(&kp.public_key_pem, b"tampered", &sig).is_err());
    }

    #[test]
    fn round_trips_through_pem() {
        let kp = KeyPair::generate();
        let pem = kp.private_key_pem().unwrap();
        let restored = KeyPair::from_private_pem(&pem).unwrap();
        assert_eq!(kp.public_key_pem, restored.public_key_pem);
    }
}
