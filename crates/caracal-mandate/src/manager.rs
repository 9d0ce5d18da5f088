use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use caracal_core::persist::{atomic_write_with_backups, read_if_exists, DEFAULT_BACKUP_COUNT};
use caracal_core::retry::RetryPolicy;
use caracal_core::{now_unix, MandateId, Money, PrincipalId};
use caracal_identity::PrincipalRegistry;
use globset::GlobBuilder;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{Mandate, MandateClaims, AUDIENCE};
use crate::error::MandateError;

const FUTURE_SKEW_SECONDS: i64 = 60;

struct Inner {
    mandates: HashMap<MandateId, Mandate>,
}

/// Issues, validates and revokes signed mandates. Holds a non-owning
/// reference to the registry for key lookup (spec §9: "mandate
/// signing/verification needs key material by principal ID while the
/// registry owns principal lifecycle"). Grounded on
/// `caracal/core/delegation.py`'s `DelegationTokenManager`.
pub struct MandateManager {
    registry: Arc<PrincipalRegistry>,
    inner: Mutex<Inner>,
    path: PathBuf,
    backup_count: u32,
}

impl MandateManager {
    pub fn open(registry: Arc<PrincipalRegistry>, path: impl Into<PathBuf>) -> Result<Self, MandateError> {
        Self::open_with_backups(registry, path, DEFAULT_BACKUP_COUNT)
    }

    pub fn open_with_backups(
        registry: Arc<PrincipalRegistry>,
        path: impl Into<PathBuf>,
        backup_count: u32,
    ) -> Result<Self, MandateError> {
        let path = path.into();
        let mandates = load(&path)?;
        Ok(Self {
            registry,
            inner: Mutex::new(Inner {
                mandates: mandates.into_iter().map(|m| (m.id(), m)).collect(),
            }),
            path,
            backup_count,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        &self,
        issuer_id: PrincipalId,
        subject_id: PrincipalId,
        allowed_operations: Vec<String>,
        allowed_resources: Vec<String>,
        spending_limit: Money,
        currency: String,
        validity_seconds: i64,
        max_delegation_depth: u32,
        parent_mandate_id: Option<MandateId>,
        budget_category: Option<String>,
    ) -> Result<(Mandate, String), MandateError> {
        let issuer = self
            .registry
            .get(issuer_id)
            .ok_or_else(|| MandateError::PrincipalNotFound(issuer_id.to_string()))?;
        let private_pem = issuer
            .private_key_pem()
            .ok_or(MandateError::MissingPrivateKey)?
            .to_string();

        if self.registry.get(subject_id).is_none() {
            return Err(MandateError::PrincipalNotFound(subject_id.to_string()));
        }

        let iat = now_unix();
        let claims = MandateClaims {
            iss: issuer_id,
            sub: subject_id,
            aud: AUDIENCE.to_string(),
            iat,
            exp: iat + validity_seconds,
            jti: MandateId::new(),
            spending_limit,
            currency,
            allowed_operations,
            allowed_resources,
            max_delegation_depth,
            budget_category,
            parent_mandate_id,
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(issuer_id.to_string());
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| MandateError::Malformed(e.to_string()))?;
        let token = encode(&header, &claims, &encoding_key).map_err(|e| MandateError::Malformed(e.to_string()))?;

        let mandate = Mandate {
            claims,
            revoked: false,
            revoked_reason: None,
            revoked_by: None,
        };

        {
            let mut guard = self.inner.lock().unwrap();
            guard.mandates.insert(mandate.id(), mandate.clone());
            self.persist(&guard.mandates)?;
        }

        tracing::info!(mandate_id = %mandate.id(), issuer_id = %issuer_id, subject_id = %subject_id, "mandate issued");
        Ok((mandate, token))
    }

    /// Decode and cryptographically verify a token's claims, without
    /// consulting the revocation store. Used for the token round-trip
    /// property and for verifying parent-chain signatures.
    pub fn decode_token(&self, token: &str) -> Result<MandateClaims, MandateError> {
        let header = decode_header(token).map_err(|e| MandateError::Malformed(e.to_string()))?;
        let kid = header.kid.ok_or_else(|| MandateError::Malformed("missing kid".into()))?;
        let issuer_id = PrincipalId::parse(&kid).map_err(|e| MandateError::Malformed(e.to_string()))?;
        let issuer = self
            .registry
            .get(issuer_id)
            .ok_or(MandateError::UnknownIssuer)?;
        let public_pem = issuer.public_key_pem().ok_or(MandateError::UnknownIssuer)?;

        let decoding_key =
            DecodingKey::from_ec_pem(public_pem.as_bytes()).map_err(|e| MandateError::Malformed(e.to_string()))?;
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

        let data = decode::<MandateClaims>(token, &decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => MandateError::Expired,
                ErrorKind::InvalidSignature => MandateError::InvalidSignature,
                ErrorKind::InvalidAudience => MandateError::AudienceMismatch,
                ErrorKind::MissingRequiredClaim(c) => MandateError::MissingClaim(c.clone()),
                _ => MandateError::Malformed(e.to_string()),
            }
        })?;

        if data.claims.iat > now_unix() + FUTURE_SKEW_SECONDS {
            return Err(MandateError::Malformed("iat too far in the future".into()));
        }

        Ok(data.claims)
    }

    /// Look up a mandate by ID and check liveness: absent, expired or
    /// revoked all reject. This is the path the gateway pipeline uses
    /// directly against `X-Mandate-ID` (stage 3).
    pub fn validate(&self, mandate_id: MandateId) -> Result<Mandate, MandateError> {
        let guard = self.inner.lock().unwrap();
        let mandate = guard
            .mandates
            .get(&mandate_id)
            .ok_or_else(|| MandateError::NotFound(mandate_id.to_string()))?;
        if mandate.revoked {
            return Err(MandateError::Revoked);
        }
        if mandate.is_expired(now_unix()) {
            return Err(MandateError::Expired);
        }
        Ok(mandate.clone())
    }

    /// Validate that `mandate` permits `(action, resource)`, walking the
    /// delegation chain so a narrowed child can never exceed what its
    /// ancestors allow.
    pub fn check_scope(&self, mandate: &Mandate, action: &str, resource: &str) -> Result<(), MandateError> {
        self.check_scope_at_depth(mandate, action, resource, 0)
    }

    fn check_scope_at_depth(
        &self,
        mandate: &Mandate,
        action: &str,
        resource: &str,
        depth: u32,
    ) -> Result<(), MandateError> {
        if depth > mandate.claims.max_delegation_depth {
            return Err(MandateError::DepthExceeded);
        }
        if !mandate.claims.allowed_operations.iter().any(|op| op == action) {
            return Err(MandateError::ScopeDenied {
                action: action.to_string(),
                resource: resource.to_string(),
            });
        }
        let matches = mandate
            .claims
            .allowed_resources
            .iter()
            .any(|pattern| glob_matches(pattern, resource));
        if !matches {
            return Err(MandateError::ScopeDenied {
                action: action.to_string(),
                resource: resource.to_string(),
            });
        }
        if let Some(parent_id) = mandate.claims.parent_mandate_id {
            let parent = self.validate(parent_id)?;
            self.check_scope_at_depth(&parent, action, resource, depth + 1)?;
        }
        Ok(())
    }

    /// Mark `mandate_id` revoked, optionally cascading to every descendant
    /// mandate (those whose `parent_mandate_id` chain leads back to it).
    /// Idempotent: revoking an already-revoked mandate is a no-op.
    pub fn revoke(
        &self,
        mandate_id: MandateId,
        revoker_id: PrincipalId,
        reason: String,
        cascade: bool,
    ) -> Result<(), MandateError> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.mandates.contains_key(&mandate_id) {
            return Err(MandateError::NotFound(mandate_id.to_string()));
        }

        let mut to_revoke = vec![mandate_id];
        if cascade {
            to_revoke.extend(descendants_of(&guard.mandates, mandate_id));
        }

        for id in to_revoke {
            if let Some(m) = guard.mandates.get_mut(&id) {
                if !m.revoked {
                    m.revoked = true;
                    m.revoked_reason = Some(reason.clone());
                    m.revoked_by = Some(revoker_id);
                }
            }
        }
        self.persist(&guard.mandates)?;
        tracing::info!(mandate_id = %mandate_id, cascade, "mandate revoked");
        Ok(())
    }

    fn persist(&self, mandates: &HashMap<MandateId, Mandate>) -> Result<(), MandateError> {
        let list: Vec<&Mandate> = mandates.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| MandateError::Core(caracal_core::CoreError::Serialization(e.to_string())))?;
        atomic_write_with_backups(&self.path, &bytes, self.backup_count, RetryPolicy::default())
            .map_err(MandateError::Core)
    }
}

fn descendants_of(mandates: &HashMap<MandateId, Mandate>, root: MandateId) -> Vec<MandateId> {
    let mut out = Vec::new();
    let mut stack: Vec<MandateId> = mandates
        .values()
        .filter(|m| m.claims.parent_mandate_id == Some(root))
        .map(|m| m.id())
        .collect();
    while let Some(current) = stack.pop() {
        out.push(current);
        stack.extend(
            mandates
                .values()
                .filter(|m| m.claims.parent_mandate_id == Some(current))
                .map(|m| m.id()),
        );
    }
    out
}

/// `*` matches any run of characters within a single segment; `**` matches
/// any run of segments. `globset` only special-cases `/` as a separator, so
/// `:`-delimited resource identifiers (`api:openai:*`) are normalized to
/// `/` before matching — otherwise `literal_separator` would have nothing
/// to anchor on and `*` would silently behave like `**` across `:` too.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.replace(':', "/");
    let candidate = candidate.replace(':', "/");
    match GlobBuilder::new(&pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher().is_match(&candidate),
        Err(_) => false,
    }
}

fn load(path: &Path) -> Result<Vec<Mandate>, MandateError> {
    match read_if_exists(path).map_err(MandateError::Core)? {
        None => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| MandateError::Core(caracal_core::CoreError::Serialization(e.to_string()))),
    }
}
