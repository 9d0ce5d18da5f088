use caracal_core::{now_unix, ChargeId, Money, PrincipalId};
use caracal_charges::ProvisionalChargeManager;
use caracal_ledger::LedgerQuery;
use serde::Serialize;

use crate::error::PolicyError;
use crate::store::PolicyStore;
use crate::time_window::calculate_window_bounds;

/// Outcome of a budget check. `Denied` carries the single
/// first-failing-policy, by creation-time order, per spec §4.5 step 8 — or,
/// when the principal has no active policy at all, `policy_id`/`limit`/
/// `spent`/`reserved` are `None` and `reason` explains the fail-closed
/// denial (spec §4.5 step 1).
#[derive(Debug, Serialize)]
pub enum Decision {
    Approved {
        charge_id: ChargeId,
        remaining_budget: Money,
    },
    Denied {
        policy_id: Option<caracal_core::PolicyId>,
        limit: Option<Money>,
        spent: Option<Money>,
        reserved: Option<Money>,
        estimated_cost: Money,
        reason: String,
    },
}

/// Implements the budget-check algorithm: for every active policy scoped to
/// `principal_id`, compute `spent + reserved + estimated_cost` over the
/// policy's window and compare against its limit with strict inequality
/// (`>=` denies, matching the original's "deny at the boundary" choice).
/// Grounded on `caracal/core/budget_engine.py`'s `BudgetEngine.check_budget`.
pub struct PolicyEvaluator<'a> {
    store: &'a PolicyStore,
    ledger: &'a LedgerQuery,
    charges: &'a ProvisionalChargeManager,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(store: &'a PolicyStore, ledger: &'a LedgerQuery, charges: &'a ProvisionalChargeManager) -> Self {
        Self { store, ledger, charges }
    }

    pub fn check_budget(
        &self,
        principal_id: PrincipalId,
        estimated_cost: Money,
        currency: &str,
    ) -> Result<Decision, PolicyError> {
        let now = now_unix();
        let policies = self.store.get_active_for_principal(principal_id);

        if policies.is_empty() {
            // Fail-closed: a principal with no active policy at all is
            // denied outright, never treated as unbounded (spec §4.5 step 1).
            return Ok(Decision::Denied {
                policy_id: None,
                limit: None,
                spent: None,
                reserved: None,
                estimated_cost,
                reason: "no active policy".to_string(),
            });
        }

        let mut tightest_remaining: Option<Money> = None;

        for policy in &policies {
            let (start, end) = calculate_window_bounds(policy.time_window, policy.window_type, now)?;
            let spent = self.ledger.sum_cost(principal_id, start, end).map_err(|e| {
                PolicyError::InvalidPolicy(format!("failed to read ledger for policy {}: {e}", policy.policy_id))
            })?;
            let reserved = self.charges.reserved_budget(principal_id);
            let prospective = spent + reserved + estimated_cost;

            if prospective >= policy.limit {
                return Ok(Decision::Denied {
                    policy_id: Some(policy.policy_id),
                    limit: Some(policy.limit),
                    spent: Some(spent),
                    reserved: Some(reserved),
                    estimated_cost,
                    reason: format!("policy {} limit {} exceeded", policy.policy_id, policy.limit),
                });
            }

            let remaining = policy.limit - prospective;
            tightest_remaining = Some(match tightest_remaining {
                Some(current) if current <= remaining => current,
                _ => remaining,
            });
        }

        let charge = self.charges.create(principal_id, estimated_cost, currency, None);
        Ok(Decision::Approved {
            charge_id: charge.id,
            remaining_budget: tightest_remaining.unwrap_or_else(Money::zero),
        })
    }

    /// The hierarchical aggregation entry point: totals across the
    /// principal's whole subtree, with no enforcement semantics attached.
    /// Distinct from `check_budget`, which only ever scopes to one
    /// principal's own policies.
    pub fn spending_breakdown(
        &self,
        principal_id: PrincipalId,
        registry: &caracal_identity::PrincipalRegistry,
        start: caracal_core::Timestamp,
        end: caracal_core::Timestamp,
    ) -> Result<caracal_ledger::SpendingBreakdown, PolicyError> {
        self.ledger
            .spending_breakdown(principal_id, start, end, registry)
            .map_err(|e| PolicyError::InvalidPolicy(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TimeWindow, WindowType};
    use caracal_charges::ChargeConfig;
    use caracal_identity::PrincipalRegistry;
    use caracal_ledger::LedgerWriter;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    struct Harness {
        _dir: tempfile::TempDir,
        registry: PrincipalRegistry,
        store: PolicyStore,
        ledger_query: LedgerQuery,
        ledger_writer: LedgerWriter,
        charges: ProvisionalChargeManager,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let registry = PrincipalRegistry::open(dir.path().join("registry.json")).unwrap();
        let store = PolicyStore::open(dir.path().join("policies.json")).unwrap();
        let ledger_path = dir.path().join("ledger.jsonl");
        let ledger_writer = LedgerWriter::open(&ledger_path).unwrap();
        let ledger_query = LedgerQuery::new(&ledger_path);
        let charges = ProvisionalChargeManager::new(ChargeConfig::default());
        Harness {
            _dir: dir,
            registry,
            store,
            ledger_query,
            ledger_writer,
            charges,
        }
    }

    #[test]
    fn approves_spending_within_limit() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        h.store
            .create(&h.registry, p.id, Money::from_decimal(dec!(100.00)), "USD", TimeWindow::Daily, WindowType::Rolling, None)
            .unwrap();

        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(10.00)), "USD").unwrap();
        assert!(matches!(decision, Decision::Approved { .. }));
    }

    #[test]
    fn denies_at_exact_equality_with_the_limit() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        h.store
            .create(&h.registry, p.id, Money::from_decimal(dec!(50.00)), "USD", TimeWindow::Daily, WindowType::Rolling, None)
            .unwrap();

        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(50.00)), "USD").unwrap();
        assert!(matches!(decision, Decision::Denied { .. }));
    }

    #[test]
    fn multi_policy_denies_on_the_tightest_one() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        h.store
            .create(&h.registry, p.id, Money::from_decimal(dec!(1000.00)), "USD", TimeWindow::Monthly, WindowType::Calendar, None)
            .unwrap();
        let tight = h
            .store
            .create(&h.registry, p.id, Money::from_decimal(dec!(5.00)), "USD", TimeWindow::Hourly, WindowType::Rolling, None)
            .unwrap();

        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(10.00)), "USD").unwrap();
        match decision {
            Decision::Denied { policy_id, .. } => assert_eq!(policy_id, Some(tight.policy_id)),
            Decision::Approved { .. } => panic!("expected denial"),
        }
    }

    #[test]
    fn prior_ledger_spending_counts_toward_the_window() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        h.store
            .create(&h.registry, p.id, Money::from_decimal(dec!(20.00)), "USD", TimeWindow::Daily, WindowType::Rolling, None)
            .unwrap();
        h.ledger_writer
            .append(p.id, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(15.00)), "USD", None)
            .unwrap();

        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(10.00)), "USD").unwrap();
        assert!(matches!(decision, Decision::Denied { .. }));
    }

    #[test]
    fn reserved_charges_count_toward_the_window() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        h.store
            .create(&h.registry, p.id, Money::from_decimal(dec!(20.00)), "USD", TimeWindow::Daily, WindowType::Rolling, None)
            .unwrap();
        h.charges.create(p.id, Money::from_decimal(dec!(15.00)), "USD", None);

        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(10.00)), "USD").unwrap();
        assert!(matches!(decision, Decision::Denied { .. }));
    }

    #[test]
    fn principal_with_no_policies_is_denied() {
        let h = harness();
        let p = h.registry.register("agent", "team", None, false).unwrap();
        let evaluator = PolicyEvaluator::new(&h.store, &h.ledger_query, &h.charges);
        let decision = evaluator.check_budget(p.id, Money::from_decimal(dec!(1_000_000.00)), "USD").unwrap();
        match decision {
            Decision::Denied { policy_id, reason, .. } => {
                assert!(policy_id.is_none());
                assert!(reason.contains("no active policy"));
            }
            Decision::Approved { .. } => panic!("expected denial"),
        }
    }
}
