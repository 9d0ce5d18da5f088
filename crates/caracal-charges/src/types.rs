use caracal_core::{ChargeId, Money, PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};

/// A short-lived budget reservation bridging "decision made" and "actual
/// cost known" (spec §3 Provisional Charge / §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionalCharge {
    pub id: ChargeId,
    pub principal_id: PrincipalId,
    pub amount: Money,
    pub currency: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub released: bool,
    pub final_event_id: Option<u64>,
}

impl ProvisionalCharge {
    pub fn is_active(&self, now: Timestamp) -> bool {
        !self.released && self.expires_at > now
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChargeConfig {
    pub default_ttl_seconds: i64,
    pub max_ttl_seconds: i64,
    pub reap_interval_seconds: u64,
    pub reap_batch_size: usize,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_ttl_seconds: 3600,
            reap_interval_seconds: 60,
            reap_batch_size: 1000,
        }
    }
}
