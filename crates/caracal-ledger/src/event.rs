use caracal_core::{Money, PrincipalId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One immutable record of resource consumption. Grounded on
/// `caracal/core/ledger.py`'s `LedgerEvent` dataclass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: u64,
    pub principal_id: PrincipalId,
    pub timestamp: Timestamp,
    pub resource_type: String,
    pub quantity: Money,
    pub cost: Money,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LedgerEvent {
    /// The `provisional_charge_id` key inside `metadata`, if this event
    /// settled a reservation.
    pub fn provisional_charge_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("provisional_charge_id"))
            .and_then(Value::as_str)
    }
}
