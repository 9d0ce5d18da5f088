use std::collections::BTreeMap;

use caracal_core::{PrincipalId, Timestamp};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CachedDecision {
    Allow,
    Deny,
}

#[derive(Clone, Debug, Serialize)]
pub struct CachedPolicy {
    pub agent_id: PrincipalId,
    pub resource: String,
    pub decision: CachedDecision,
    pub mandate_id: Option<String>,
    pub cached_at: Timestamp,
    pub metadata: BTreeMap<String, String>,
}

impl CachedPolicy {
    pub fn age_seconds(&self, now: Timestamp) -> i64 {
        now - self.cached_at
    }

    pub fn is_expired(&self, now: Timestamp, ttl_seconds: i64) -> bool {
        self.age_seconds(now) > ttl_seconds
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PolicyCacheConfig {
    pub max_entries: usize,
    pub ttl_seconds: i64,
    pub cleanup_interval_seconds: u64,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: 300,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    pub oldest_entry_age_seconds: i64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
