use std::sync::Arc;

use axum::http::HeaderMap;
use caracal_config::AuthMode;
use caracal_identity::{Principal, PrincipalRegistry};
use caracal_mandate::MandateManager;

use crate::error::GatewayError;

/// Forwarded-certificate header read when `auth_mode = mtls`. A reverse
/// proxy that terminates TLS in front of this gateway is expected to inject
/// the verified client certificate here (the same convention nginx/envoy
/// use), since the gateway itself does not terminate TLS.
const CLIENT_CERT_HEADER: &str = "x-client-cert";
const API_KEY_HEADER: &str = "x-api-key";
const AUTHORIZATION_HEADER: &str = "authorization";

/// Authenticates callers via mTLS, bearer JWT, or API key, per the
/// configured `auth_mode`. Every failure path — malformed credential,
/// unknown principal, bad signature — collapses to the same opaque
/// [`GatewayError::AuthFailure`]; the specific reason is only ever logged,
/// never returned. Grounded on `caracal/gateway/auth.py`'s `Authenticator`.
pub struct Authenticator {
    registry: Arc<PrincipalRegistry>,
    mandate_manager: Arc<MandateManager>,
}

impl Authenticator {
    pub fn new(registry: Arc<PrincipalRegistry>, mandate_manager: Arc<MandateManager>) -> Self {
        Self { registry, mandate_manager }
    }

    pub fn authenticate(&self, mode: AuthMode, headers: &HeaderMap) -> Result<Principal, GatewayError> {
        match mode {
            AuthMode::Mtls => self.authenticate_mtls(headers),
            AuthMode::Jwt => self.authenticate_jwt(headers),
            AuthMode::ApiKey => self.authenticate_api_key(headers),
        }
        .map_err(|reason| {
            tracing::warn!(%reason, ?mode, "authentication failed");
            GatewayError::AuthFailure
        })
    }

    fn authenticate_mtls(&self, headers: &HeaderMap) -> Result<Principal, String> {
        let pem = headers
            .get(CLIENT_CERT_HEADER)
            .ok_or("missing client certificate header")?
            .to_str()
            .map_err(|e| e.to_string())?;

        let name = extract_cert_principal_name(pem)?;
        self.registry.get_by_name(&name).ok_or_else(|| format!("unknown principal: {name}"))
    }

    fn authenticate_jwt(&self, headers: &HeaderMap) -> Result<Principal, String> {
        let header_value = headers.get(AUTHORIZATION_HEADER).ok_or("missing authorization header")?;
        let value = header_value.to_str().map_err(|e| e.to_string())?;
        let token = value.strip_prefix("Bearer ").ok_or("authorization header is not a bearer token")?;

        let claims = self.mandate_manager.decode_token(token).map_err(|e| e.to_string())?;
        self.registry
            .get(claims.sub)
            .ok_or_else(|| format!("unknown principal: {}", claims.sub))
    }

    fn authenticate_api_key(&self, headers: &HeaderMap) -> Result<Principal, String> {
        let key = headers
            .get(API_KEY_HEADER)
            .ok_or("missing API key header")?
            .to_str()
            .map_err(|e| e.to_string())?;

        self.registry
            .list_all()
            .into_iter()
            .find(|p| p.api_key_hash().is_some_and(|hash| caracal_crypto::verify_api_key(key, hash)))
            .ok_or_else(|| "no principal matches the provided API key".to_string())
    }
}

/// Extract a principal name from a PEM client certificate's Common Name,
/// falling back to the first DNS Subject Alternative Name. Grounded on
/// `auth.py`'s `authenticate_mtls` CN-then-SAN extraction order.
fn extract_cert_principal_name(pem: &str) -> Result<String, String> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).map_err(|e| format!("invalid PEM: {e:?}"))?;
    let cert = pem.parse_x509().map_err(|e| format!("invalid certificate: {e}"))?;

    if let Some(cn) = cert.subject().iter_common_name().next() {
        if let Ok(value) = cn.as_str() {
            return Ok(value.to_string());
        }
    }

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                return Ok(dns.to_string());
            }
        }
    }

    Err("no principal name found in certificate CN or SAN".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<PrincipalRegistry>, Arc<MandateManager>) {
        let dir = tempdir().unwrap();
        let registry = Arc::new(PrincipalRegistry::open(dir.path().join("registry.json")).unwrap());
        let mandate_manager = Arc::new(MandateManager::open(registry.clone(), dir.path().join("mandates.json")).unwrap());
        (dir, registry, mandate_manager)
    }

    #[test]
    fn api_key_mode_matches_on_bcrypt_hash() {
        let (_dir, registry, mandate_manager) = setup();
        let principal = registry.register("caller", "owner", None, false).unwrap();
        let hash = caracal_crypto::hash_api_key("sk-test").unwrap();
        registry.set_metadata(principal.id, "api_key_hash", Some(hash)).unwrap();

        let auth = Authenticator::new(registry.clone(), mandate_manager);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "sk-test".parse().unwrap());
        let found = auth.authenticate(AuthMode::ApiKey, &headers).unwrap();
        assert_eq!(found.id, principal.id);

        let mut wrong_headers = HeaderMap::new();
        wrong_headers.insert("x-api-key", "wrong-key".parse().unwrap());
        assert!(matches!(auth.authenticate(AuthMode::ApiKey, &wrong_headers), Err(GatewayError::AuthFailure)));
    }

    #[test]
    fn jwt_mode_rejects_missing_header() {
        let (_dir, registry, mandate_manager) = setup();
        let auth = Authenticator::new(registry, mandate_manager);
        let headers = HeaderMap::new();
        assert!(matches!(auth.authenticate(AuthMode::Jwt, &headers), Err(GatewayError::AuthFailure)));
    }

    #[test]
    fn mtls_mode_rejects_missing_header() {
        let (_dir, registry, mandate_manager) = setup();
        let auth = Authenticator::new(registry, mandate_manager);
        let headers = HeaderMap::new();
        assert!(matches!(auth.authenticate(AuthMode::Mtls, &headers), Err(GatewayError::AuthFailure)));
    }
}
