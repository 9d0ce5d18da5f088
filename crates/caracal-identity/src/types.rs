use std::collections::BTreeMap;

use caracal_core::{PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};

/// An identity that consumes resources: an agent, a service account, or an
/// owning human. Never deleted by the registry; deactivation is
/// metadata-only (spec §3 Principal).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub owner: String,
    pub created_at: Timestamp,
    pub parent_id: Option<PrincipalId>,
    /// Extensible bag. Known keys used by this crate and its siblings:
    /// `public_key_pem`, `private_key_pem`, `api_key_hash`.
    pub metadata: BTreeMap<String, String>,
}

impl Principal {
    pub fn public_key_pem(&self) -> Option<&str> {
        self.metadata.get("public_key_pem").map(String::as_str)
    }

    pub fn private_key_pem(&self) -> Option<&str> {
        self.metadata.get("private_key_pem").map(String::as_str)
    }

    pub fn api_key_hash(&self) -> Option<&str> {
        self.metadata.get("api_key_hash").map(String::as_str)
    }
}
