use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use caracal_core::{now_unix, PrincipalId};

use crate::types::{CacheStats, CachedDecision, CachedPolicy, PolicyCacheConfig};

type Key = (PrincipalId, String);

struct Slot {
    policy: CachedPolicy,
    seq: u64,
}

struct Inner {
    entries: HashMap<Key, Slot>,
    stats: CacheStats,
    next_seq: u64,
}

/// In-memory cache of policy evaluation results, used by the gateway to
/// keep answering requests in degraded mode when the budget engine or its
/// upstream dependencies are unreachable. Grounded on
/// `caracal/gateway/cache.py`'s `PolicyCache`, including its true
/// oldest-insertion-wins eviction policy (not access-recency LRU). Eviction
/// order is tracked with a monotonic counter rather than `cached_at` alone:
/// the original's wall-clock timestamps have sub-second resolution, ours
/// are whole seconds, so ties would otherwise make eviction order
/// nondeterministic under rapid insertion.
pub struct PolicyCache {
    config: PolicyCacheConfig,
    inner: Mutex<Inner>,
}

impl PolicyCache {
    pub fn new(config: PolicyCacheConfig) -> Self {
        tracing::info!(max_entries = config.max_entries, ttl_seconds = config.ttl_seconds, "policy cache initialized");
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                next_seq: 0,
            }),
        }
    }

    pub fn get(&self, agent_id: PrincipalId, resource: &str) -> Option<CachedPolicy> {
        let key = make_key(agent_id, resource);
        let now = now_unix();
        let mut guard = self.inner.lock().unwrap();

        let expired = match guard.entries.get(&key) {
            None => {
                guard.stats.misses += 1;
                return None;
            }
            Some(slot) => slot.policy.is_expired(now, self.config.ttl_seconds),
        };

        if expired {
            guard.entries.remove(&key);
            guard.stats.misses += 1;
            guard.stats.evictions += 1;
            return None;
        }

        guard.stats.hits += 1;
        guard.entries.get(&key).map(|slot| slot.policy.clone())
    }

    pub fn put(
        &self,
        agent_id: PrincipalId,
        resource: &str,
        decision: CachedDecision,
        mandate_id: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> CachedPolicy {
        let key = make_key(agent_id, resource);
        let policy = CachedPolicy {
            agent_id,
            resource: resource.to_string(),
            decision,
            mandate_id,
            cached_at: now_unix(),
            metadata,
        };

        let mut guard = self.inner.lock().unwrap();
        if guard.entries.len() >= self.config.max_entries && !guard.entries.contains_key(&key) {
            evict_oldest(&mut guard);
        }
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.entries.insert(key, Slot { policy: policy.clone(), seq });
        guard.stats.total_entries = guard.entries.len();
        policy
    }

    /// Invalidates a single `(agent_id, resource)` entry, or every entry for
    /// `agent_id` when `resource` is `None`. Returns the count removed.
    pub fn invalidate(&self, agent_id: PrincipalId, resource: Option<&str>) -> usize {
        let mut guard = self.inner.lock().unwrap();
        let removed = match resource {
            Some(resource) => {
                let key = make_key(agent_id, resource);
                if guard.entries.remove(&key).is_some() {
                    1
                } else {
                    0
                }
            }
            None => {
                let keys: Vec<Key> = guard
                    .entries
                    .iter()
                    .filter(|(_, slot)| slot.policy.agent_id == agent_id)
                    .map(|(k, _)| k.clone())
                    .collect();
                let count = keys.len();
                for key in keys {
                    guard.entries.remove(&key);
                }
                count
            }
        };
        guard.stats.total_entries = guard.entries.len();
        removed
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.entries.clear();
        guard.stats.total_entries = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let now = now_unix();
        let mut guard = self.inner.lock().unwrap();
        guard.stats.total_entries = guard.entries.len();
        guard.stats.oldest_entry_age_seconds = guard
            .entries
            .values()
            .map(|slot| slot.policy.cached_at)
            .min()
            .map(|oldest| now - oldest)
            .unwrap_or(0);
        guard.stats
    }

    /// Sweeps every expired entry. Intended to be driven by a background
    /// timer at `config.cleanup_interval_seconds`.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_unix();
        let mut guard = self.inner.lock().unwrap();
        let expired: Vec<Key> = guard
            .entries
            .iter()
            .filter(|(_, slot)| slot.policy.is_expired(now, self.config.ttl_seconds))
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            guard.entries.remove(&key);
        }
        guard.stats.evictions += count as u64;
        guard.stats.total_entries = guard.entries.len();
        if count > 0 {
            tracing::debug!(count, "policy cache cleanup removed expired entries");
        }
        count
    }
}

fn make_key(agent_id: PrincipalId, resource: &str) -> Key {
    (agent_id, resource.to_string())
}

fn evict_oldest(inner: &mut Inner) {
    let oldest_key = inner
        .entries
        .iter()
        .min_by_key(|(_, slot)| slot.seq)
        .map(|(k, _)| k.clone());
    if let Some(key) = oldest_key {
        inner.entries.remove(&key);
        inner.stats.evictions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(config: PolicyCacheConfig) -> PolicyCache {
        PolicyCache::new(config)
    }

    #[test]
    fn put_then_get_is_a_hit() {
        let c = cache(PolicyCacheConfig::default());
        let agent = PrincipalId::new();
        c.put(agent, "resource:a", CachedDecision::Allow, None, BTreeMap::new());
        let hit = c.get(agent, "resource:a").unwrap();
        assert_eq!(hit.decision, CachedDecision::Allow);
        assert_eq!(c.stats().hits, 1);
    }

    #[test]
    fn miss_on_unknown_key() {
        let c = cache(PolicyCacheConfig::default());
        assert!(c.get(PrincipalId::new(), "resource:a").is_none());
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let c = cache(PolicyCacheConfig { ttl_seconds: -1, ..PolicyCacheConfig::default() });
        let agent = PrincipalId::new();
        c.put(agent, "resource:a", CachedDecision::Allow, None, BTreeMap::new());
        assert!(c.get(agent, "resource:a").is_none());
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn invalidate_specific_resource_only_removes_that_entry() {
        let c = cache(PolicyCacheConfig::default());
        let agent = PrincipalId::new();
        c.put(agent, "resource:a", CachedDecision::Allow, None, BTreeMap::new());
        c.put(agent, "resource:b", CachedDecision::Deny, None, BTreeMap::new());
        assert_eq!(c.invalidate(agent, Some("resource:a")), 1);
        assert!(c.get(agent, "resource:a").is_none());
        assert!(c.get(agent, "resource:b").is_some());
    }

    #[test]
    fn invalidate_all_removes_every_entry_for_agent() {
        let c = cache(PolicyCacheConfig::default());
        let agent = PrincipalId::new();
        c.put(agent, "resource:a", CachedDecision::Allow, None, BTreeMap::new());
        c.put(agent, "resource:b", CachedDecision::Deny, None, BTreeMap::new());
        assert_eq!(c.invalidate(agent, None), 2);
        assert_eq!(c.stats().total_entries, 0);
    }

    #[test]
    fn eviction_removes_the_oldest_insertion_not_the_least_recently_used() {
        let c = cache(PolicyCacheConfig { max_entries: 2, ..PolicyCacheConfig::default() });
        let agent = PrincipalId::new();
        c.put(agent, "r1", CachedDecision::Allow, None, BTreeMap::new());
        c.put(agent, "r2", CachedDecision::Allow, None, BTreeMap::new());
        // Touching r1 does not protect it: eviction tracks insertion order, not access.
        let _ = c.get(agent, "r1");
        c.put(agent, "r3", CachedDecision::Allow, None, BTreeMap::new());

        assert!(c.get(agent, "r1").is_none());
        assert!(c.get(agent, "r2").is_some());
        assert!(c.get(agent, "r3").is_some());
    }

    #[test]
    fn cleanup_expired_sweeps_without_a_read() {
        let c = cache(PolicyCacheConfig { ttl_seconds: -1, ..PolicyCacheConfig::default() });
        c.put(PrincipalId::new(), "r1", CachedDecision::Allow, None, BTreeMap::new());
        c.put(PrincipalId::new(), "r2", CachedDecision::Allow, None, BTreeMap::new());
        assert_eq!(c.cleanup_expired(), 2);
        assert_eq!(c.stats().total_entries, 0);
    }
}
