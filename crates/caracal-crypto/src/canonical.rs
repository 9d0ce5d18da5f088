use serde::Serialize;

/// Serialize `claims` deterministically with sorted keys — `serde_json`'s
/// default `Map` is key-ordered (it only preserves insertion order when the
/// `preserve_order` feature is enabled, which this workspace does not turn
/// on), so a plain `to_vec` already yields the canonical form the signature
/// covers.
pub fn canonical_bytes<T: Serialize>(claims: &T) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(claims)?;
    serde_json::to_vec(&value)
}
