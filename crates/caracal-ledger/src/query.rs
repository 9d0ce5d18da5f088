use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use caracal_core::{CoreError, Money, PrincipalId, Timestamp};
use caracal_identity::PrincipalRegistry;
use serde::Serialize;

use crate::error::LedgerError;
use crate::event::LedgerEvent;

/// Read-only view over the append-only log. Never mutates it. Grounded on
/// `caracal/core/ledger.py`'s `LedgerQuery`.
pub struct LedgerQuery {
    path: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpendingBreakdown {
    pub principal_id: PrincipalId,
    pub principal_name: Option<String>,
    pub spending: Money,
    pub children: Vec<SpendingBreakdown>,
    pub total_with_children: Money,
}

impl LedgerQuery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn get_events(
        &self,
        principal_id: Option<PrincipalId>,
        resource_type: Option<&str>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|e| principal_id.map_or(true, |p| e.principal_id == p))
            .filter(|e| resource_type.map_or(true, |rt| e.resource_type == rt))
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |en| e.timestamp <= en))
            .collect())
    }

    pub fn sum_cost(&self, principal_id: PrincipalId, start: Timestamp, end: Timestamp) -> Result<Money, LedgerError> {
        Ok(self
            .get_events(Some(principal_id), None, Some(start), Some(end))?
            .into_iter()
            .map(|e| e.cost)
            .sum())
    }

    pub fn aggregate_by_principal(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<HashMap<PrincipalId, Money>, LedgerError> {
        let mut totals: HashMap<PrincipalId, Money> = HashMap::new();
        for event in self.get_events(None, None, Some(start), Some(end))? {
            let entry = totals.entry(event.principal_id).or_insert_with(Money::zero);
            *entry = *entry + event.cost;
        }
        Ok(totals)
    }

    /// Totals for `principal_id` and every transitive descendant, flattened
    /// into a single map.
    pub fn sum_with_descendants(
        &self,
        principal_id: PrincipalId,
        start: Timestamp,
        end: Timestamp,
        registry: &PrincipalRegistry,
    ) -> Result<HashMap<PrincipalId, Money>, LedgerError> {
        let totals = self.aggregate_by_principal(start, end)?;
        let mut result = HashMap::new();
        result.insert(principal_id, *totals.get(&principal_id).unwrap_or(&Money::zero()));
        for descendant in registry.descendants_of(principal_id) {
            result.insert(descendant.id, *totals.get(&descendant.id).unwrap_or(&Money::zero()));
        }
        Ok(result)
    }

    /// Recursive tree of `{principal, own_spent, children, total_with_descendants}`.
    pub fn spending_breakdown(
        &self,
        principal_id: PrincipalId,
        start: Timestamp,
        end: Timestamp,
        registry: &PrincipalRegistry,
    ) -> Result<SpendingBreakdown, LedgerError> {
        let totals = self.aggregate_by_principal(start, end)?;
        Ok(build_breakdown(principal_id, start, end, registry, &totals))
    }

    fn scan(&self) -> Result<Vec<LedgerEvent>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::Core(CoreError::TransientIo(e.to_string()))),
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| LedgerError::Core(CoreError::TransientIo(e.to_string())))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(%e, "skipping malformed ledger line"),
            }
        }
        Ok(events)
    }
}

fn build_breakdown(
    principal_id: PrincipalId,
    start: Timestamp,
    end: Timestamp,
    registry: &PrincipalRegistry,
    totals: &HashMap<PrincipalId, Money>,
) -> SpendingBreakdown {
    let _ = (start, end);
    let principal_name = registry.get(principal_id).map(|p| p.name);
    let spending = *totals.get(&principal_id).unwrap_or(&Money::zero());
    let children: Vec<SpendingBreakdown> = registry
        .children_of(principal_id)
        .into_iter()
        .map(|child| build_breakdown(child.id, start, end, registry, totals))
        .collect();
    let total_with_children = children
        .iter()
        .fold(spending, |acc, c| acc + c.total_with_children);
    SpendingBreakdown {
        principal_id,
        principal_name,
        spending,
        children,
        total_with_children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::LedgerWriter;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn sum_cost_matches_appended_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let writer = LedgerWriter::open(&path).unwrap();
        let p = PrincipalId::new();
        writer
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(10.00)), "USD", None)
            .unwrap();
        writer
            .append(p, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(5.50)), "USD", None)
            .unwrap();

        let query = LedgerQuery::new(&path);
        let total = query.sum_cost(p, 0, caracal_core::now_unix() + 10).unwrap();
        assert_eq!(total, Money::from_decimal(dec!(15.50)));
    }

    #[test]
    fn hierarchical_breakdown_aggregates_descendants() {
        let dir = tempdir().unwrap();
        let registry = PrincipalRegistry::open(dir.path().join("registry.json")).unwrap();
        let root = registry.register("root", "owner", None, false).unwrap();
        let child = registry.register("child", "owner", Some(root.id), false).unwrap();

        let ledger_path = dir.path().join("ledger.jsonl");
        let writer = LedgerWriter::open(&ledger_path).unwrap();
        writer
            .append(root.id, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(10.00)), "USD", None)
            .unwrap();
        writer
            .append(child.id, "api_call", Money::from_decimal(dec!(1)), Money::from_decimal(dec!(4.00)), "USD", None)
            .unwrap();

        let query = LedgerQuery::new(&ledger_path);
        let breakdown = query
            .spending_breakdown(root.id, 0, caracal_core::now_unix() + 10, &registry)
            .unwrap();
        assert_eq!(breakdown.spending, Money::from_decimal(dec!(10.00)));
        assert_eq!(breakdown.total_with_children, Money::from_decimal(dec!(14.00)));
        assert_eq!(breakdown.children.len(), 1);
    }
}
