use std::collections::HashMap;
use std::sync::Mutex;

use caracal_core::{now_unix, ChargeId, Money, PrincipalId};

use crate::types::{ChargeConfig, ProvisionalCharge};

/// Owns the reservation table. In-memory only: spec §9 notes the file
/// formats are specified only for the registry, policy store and ledger,
/// and that a production deployment is expected to pair this core with a
/// real database for the charge table. Grounded on
/// `caracal/core/provisional_charges.py`'s `ProvisionalChargeManager`.
pub struct ProvisionalChargeManager {
    config: ChargeConfig,
    charges: Mutex<HashMap<ChargeId, ProvisionalCharge>>,
}

impl ProvisionalChargeManager {
    pub fn new(config: ChargeConfig) -> Self {
        Self {
            config,
            charges: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> ChargeConfig {
        self.config
    }

    /// Reserve `amount` for `principal_id`. TTL defaults to
    /// `default_ttl_seconds` and is capped (never rejected) at
    /// `max_ttl_seconds`, with a warning logged when capping occurs.
    pub fn create(&self, principal_id: PrincipalId, amount: Money, currency: &str, ttl_seconds: Option<i64>) -> ProvisionalCharge {
        let requested = ttl_seconds.unwrap_or(self.config.default_ttl_seconds);
        let ttl = if requested > self.config.max_ttl_seconds {
            tracing::warn!(
                requested_ttl = requested,
                max_ttl = self.config.max_ttl_seconds,
                "provisional charge TTL exceeds ceiling, capping"
            );
            self.config.max_ttl_seconds
        } else {
            requested
        };

        let now = now_unix();
        let charge = ProvisionalCharge {
            id: ChargeId::new(),
            principal_id,
            amount,
            currency: currency.to_string(),
            created_at: now,
            expires_at: now + ttl,
            released: false,
            final_event_id: None,
        };

        self.charges.lock().unwrap().insert(charge.id, charge.clone());
        tracing::info!(charge_id = %charge.id, principal_id = %principal_id, amount = %amount, "provisional charge created");
        charge
    }

    /// Idempotent: releasing a missing or already-released charge is a
    /// silent no-op. Never resurrects a released charge.
    pub fn release(&self, charge_id: ChargeId, final_event_id: Option<u64>) {
        let mut guard = self.charges.lock().unwrap();
        if let Some(charge) = guard.get_mut(&charge_id) {
            if !charge.released {
                charge.released = true;
                charge.final_event_id = final_event_id;
                tracing::info!(charge_id = %charge_id, ?final_event_id, "provisional charge released");
            }
        }
    }

    pub fn active_for(&self, principal_id: PrincipalId) -> Vec<ProvisionalCharge> {
        let now = now_unix();
        self.charges
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.principal_id == principal_id && c.is_active(now))
            .cloned()
            .collect()
    }

    pub fn reserved_budget(&self, principal_id: PrincipalId) -> Money {
        self.active_for(principal_id).into_iter().map(|c| c.amount).sum()
    }

    /// For observability/alerting: count of charges past expiry that the
    /// reaper has not yet flipped to released.
    pub fn expired_unreleased_count(&self, principal_id: Option<PrincipalId>) -> usize {
        let now = now_unix();
        self.charges
            .lock()
            .unwrap()
            .values()
            .filter(|c| !c.released && c.expires_at < now)
            .filter(|c| principal_id.map_or(true, |p| c.principal_id == p))
            .count()
    }

    /// Mark released every charge where `expires_at < now AND released ==
    /// false`, up to `batch_size` charges. Returns the count reaped.
    /// Failures are not possible here (pure in-memory mutation); the
    /// fallibility modeled in the original comes from its SQL transaction,
    /// which has no counterpart in an in-memory table.
    pub fn reap_expired(&self, batch_size: usize) -> usize {
        let now = now_unix();
        let mut guard = self.charges.lock().unwrap();
        let mut reaped = 0;
        for charge in guard.values_mut() {
            if reaped >= batch_size {
                break;
            }
            if !charge.released && charge.expires_at < now {
                charge.released = true;
                reaped += 1;
            }
        }
        reaped
    }
}
