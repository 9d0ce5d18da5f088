use caracal_core::{Money, PolicyId, PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};

pub use crate::time_window::{TimeWindow, WindowType};

/// Grounded on `caracal/core/models.py`'s `BudgetPolicy`. `limit` is stored
/// as decimal text end-to-end via `Money`'s serde impl, never as a float.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub policy_id: PolicyId,
    pub principal_id: PrincipalId,
    pub limit: Money,
    pub currency: String,
    pub time_window: TimeWindow,
    pub window_type: WindowType,
    pub active: bool,
    pub created_at: Timestamp,
    pub delegated_from_principal_id: Option<PrincipalId>,
}

impl BudgetPolicy {
    pub fn is_delegated(&self) -> bool {
        self.delegated_from_principal_id.is_some()
    }
}
