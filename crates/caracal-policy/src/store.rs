use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use caracal_core::persist::{atomic_write_with_backups, read_if_exists, DEFAULT_BACKUP_COUNT};
use caracal_core::retry::RetryPolicy;
use caracal_core::{now_unix, CoreError, Money, PolicyId, PrincipalId};
use caracal_identity::PrincipalRegistry;

use crate::error::PolicyError;
use crate::types::{BudgetPolicy, TimeWindow, WindowType};

/// Owns the set of budget policies, persisted as a single JSON-array file
/// via the same atomic-rename discipline as the principal registry.
/// Grounded on `caracal/core/policy_store.py`'s `PolicyStore`.
pub struct PolicyStore {
    policies: Mutex<HashMap<PolicyId, BudgetPolicy>>,
    path: PathBuf,
    backup_count: u32,
}

impl PolicyStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        Self::open_with_backups(path, DEFAULT_BACKUP_COUNT)
    }

    pub fn open_with_backups(path: impl Into<PathBuf>, backup_count: u32) -> Result<Self, PolicyError> {
        let path = path.into();
        let loaded = load(&path)?;
        let mut by_id = HashMap::with_capacity(loaded.len());
        for p in loaded {
            by_id.insert(p.policy_id, p);
        }
        Ok(Self {
            policies: Mutex::new(by_id),
            path,
            backup_count,
        })
    }

    /// Creates and persists a new active policy. Never rejects on the two
    /// advisory conditions below; it only warns, matching the original's
    /// `create_policy` which treats them as operator mistakes worth
    /// flagging, not invalid input worth refusing.
    pub fn create(
        &self,
        registry: &PrincipalRegistry,
        principal_id: PrincipalId,
        limit: Money,
        currency: &str,
        time_window: TimeWindow,
        window_type: WindowType,
        delegated_from_principal_id: Option<PrincipalId>,
    ) -> Result<BudgetPolicy, PolicyError> {
        if registry.get(principal_id).is_none() {
            return Err(PolicyError::PrincipalNotFound(principal_id.to_string()));
        }

        let mut guard = self.policies.lock().unwrap();

        // Advisory-only, unconditional checks against the principal's own
        // other active policies (spec §4.4) — never gated on delegation.
        for existing in guard.values().filter(|p| p.principal_id == principal_id && p.active) {
            if existing.currency != currency {
                tracing::warn!(
                    principal_id = %principal_id,
                    existing_policy_id = %existing.policy_id,
                    existing_currency = %existing.currency,
                    new_currency = %currency,
                    "new policy currency differs from an existing active policy on the same principal"
                );
            }

            let (shorter_limit, longer_limit) =
                if window_duration_seconds(time_window) <= window_duration_seconds(existing.time_window) {
                    (limit, existing.limit)
                } else {
                    (existing.limit, limit)
                };
            if shorter_limit > longer_limit {
                tracing::warn!(
                    principal_id = %principal_id,
                    existing_policy_id = %existing.policy_id,
                    "a shorter-window policy limit exceeds a longer-window policy limit on the same principal"
                );
            }
        }

        let policy = BudgetPolicy {
            policy_id: PolicyId::new(),
            principal_id,
            limit,
            currency: currency.to_string(),
            time_window,
            window_type,
            active: true,
            created_at: now_unix(),
            delegated_from_principal_id,
        };

        guard.insert(policy.policy_id, policy.clone());
        self.persist(&guard)?;
        tracing::info!(policy_id = %policy.policy_id, principal_id = %principal_id, "budget policy created");
        Ok(policy)
    }

    pub fn get(&self, policy_id: PolicyId) -> Option<BudgetPolicy> {
        self.policies.lock().unwrap().get(&policy_id).cloned()
    }

    /// All active policies scoped to `principal_id`, ordered by creation
    /// time ascending so evaluators can resolve tied failures stably.
    pub fn get_active_for_principal(&self, principal_id: PrincipalId) -> Vec<BudgetPolicy> {
        let mut out: Vec<BudgetPolicy> = self
            .policies
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.principal_id == principal_id && p.active)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.created_at);
        out
    }

    pub fn list_delegated_from(&self, parent_id: PrincipalId) -> Vec<BudgetPolicy> {
        self.policies
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.delegated_from_principal_id == Some(parent_id))
            .cloned()
            .collect()
    }

    pub fn revoke(&self, policy_id: PolicyId) -> Result<(), PolicyError> {
        let mut guard = self.policies.lock().unwrap();
        let policy = guard
            .get_mut(&policy_id)
            .ok_or_else(|| PolicyError::NotFound(policy_id.to_string()))?;
        policy.active = false;
        self.persist(&guard)?;
        Ok(())
    }

    fn persist(&self, policies: &HashMap<PolicyId, BudgetPolicy>) -> Result<(), PolicyError> {
        let list: Vec<&BudgetPolicy> = policies.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(|e| CoreError::Serialization(e.to_string()))?;
        atomic_write_with_backups(&self.path, &bytes, self.backup_count, RetryPolicy::default())
            .map_err(PolicyError::from)
    }
}

fn window_duration_seconds(window: TimeWindow) -> i64 {
    match window {
        TimeWindow::Hourly => 3_600,
        TimeWindow::Daily => 86_400,
        TimeWindow::Weekly => 7 * 86_400,
        TimeWindow::Monthly => 30 * 86_400,
    }
}

fn load(path: &Path) -> Result<Vec<BudgetPolicy>, PolicyError> {
    match read_if_exists(path)? {
        None => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| CoreError::Serialization(e.to_string()).into()),
    }
}
