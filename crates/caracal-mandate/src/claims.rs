use caracal_core::{MandateId, Money, PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};

/// The standard audience value every mandate is issued for; the only value
/// accepted on validation (spec §6 token format).
pub const AUDIENCE: &str = "caracal-core";

/// The claim set carried inside a mandate token, matching spec §6's payload
/// shape exactly (camelCase claim names, `aud` fixed to [`AUDIENCE`]).
/// Grounded on `caracal/core/delegation.py`'s `DelegationTokenClaims` and
/// `generate_token` payload construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MandateClaims {
    pub iss: PrincipalId,
    pub sub: PrincipalId,
    pub aud: String,
    pub iat: Timestamp,
    pub exp: Timestamp,
    pub jti: MandateId,
    #[serde(rename = "spendingLimit")]
    pub spending_limit: Money,
    pub currency: String,
    #[serde(rename = "allowedOperations")]
    pub allowed_operations: Vec<String>,
    #[serde(rename = "allowedResources")]
    pub allowed_resources: Vec<String>,
    #[serde(rename = "maxDelegationDepth")]
    pub max_delegation_depth: u32,
    #[serde(rename = "budgetCategory", skip_serializing_if = "Option::is_none")]
    pub budget_category: Option<String>,
    #[serde(rename = "parentMandateId", skip_serializing_if = "Option::is_none")]
    pub parent_mandate_id: Option<MandateId>,
}

/// A mandate as held by the store: the issued claim set plus revocation
/// state, which a bare JWT cannot represent on its own.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mandate {
    #[serde(flatten)]
    pub claims: MandateClaims,
    pub revoked: bool,
    pub revoked_reason: Option<String>,
    pub revoked_by: Option<PrincipalId>,
}

impl Mandate {
    pub fn id(&self) -> MandateId {
        self.claims.jti
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.claims.exp
    }
}
