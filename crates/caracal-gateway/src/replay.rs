use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use caracal_core::Timestamp;
use serde::Serialize;

use crate::error::GatewayError;

/// Defends against replayed and stale requests, per the nonce-cache and
/// timestamp-window checks in spec §4.10 stage 2. Both checks are opt-in:
/// an absent `X-Nonce` or `X-Timestamp` header is allowed through (and
/// logged by the caller as a warning), matching the original's
/// `enable_nonce_validation`/`enable_timestamp_validation` defaults of
/// "on, but only when the header is present". Grounded on
/// `caracal/gateway/replay_protection.py`'s `ReplayProtection`.
pub struct ReplayGuard {
    nonces: Mutex<HashMap<String, Timestamp>>,
    nonce_cache_ttl_seconds: i64,
    nonce_cache_max_entries: usize,
    timestamp_window_seconds: i64,
    future_skew_seconds: i64,

    nonce_checks: AtomicU64,
    nonce_replays_blocked: AtomicU64,
    timestamp_checks: AtomicU64,
    timestamp_replays_blocked: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ReplayStats {
    pub nonce_checks: u64,
    pub nonce_replays_blocked: u64,
    pub timestamp_checks: u64,
    pub timestamp_replays_blocked: u64,
    pub nonce_cache_size: usize,
    pub nonce_cache_max_size: usize,
}

impl ReplayGuard {
    pub fn new(
        nonce_cache_ttl_seconds: i64,
        nonce_cache_max_entries: usize,
        timestamp_window_seconds: i64,
        future_skew_seconds: i64,
    ) -> Self {
        Self {
            nonces: Mutex::new(HashMap::new()),
            nonce_cache_ttl_seconds,
            nonce_cache_max_entries,
            timestamp_window_seconds,
            future_skew_seconds,
            nonce_checks: AtomicU64::new(0),
            nonce_replays_blocked: AtomicU64::new(0),
            timestamp_checks: AtomicU64::new(0),
            timestamp_replays_blocked: AtomicU64::new(0),
        }
    }

    /// `Some(nonce)` rejects if already seen (within its TTL) and otherwise
    /// records it; `None` is a no-op pass. Expired entries are swept
    /// opportunistically on each call rather than on a timer, since the
    /// cache is checked on every request anyway.
    pub fn check_nonce(&self, nonce: Option<&str>, now: Timestamp) -> Result<(), GatewayError> {
        let Some(nonce) = nonce else {
            return Ok(());
        };
        self.nonce_checks.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.nonces.lock().unwrap();
        guard.retain(|_, seen_at| now - *seen_at < self.nonce_cache_ttl_seconds);

        if guard.contains_key(nonce) {
            self.nonce_replays_blocked.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::NonceReused);
        }

        if guard.len() >= self.nonce_cache_max_entries {
            if let Some(oldest_key) = guard.iter().min_by_key(|(_, seen_at)| **seen_at).map(|(k, _)| k.clone()) {
                guard.remove(&oldest_key);
            }
        }
        guard.insert(nonce.to_string(), now);
        Ok(())
    }

    /// Rejects timestamps more than `timestamp_window_seconds` in the past
    /// or more than `future_skew_seconds` in the future.
    pub fn check_timestamp(&self, timestamp: Option<Timestamp>, now: Timestamp) -> Result<(), GatewayError> {
        let Some(timestamp) = timestamp else {
            return Ok(());
        };
        self.timestamp_checks.fetch_add(1, Ordering::Relaxed);

        let age = now - timestamp;
        if age > self.timestamp_window_seconds || age < -self.future_skew_seconds {
            self.timestamp_replays_blocked.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::TimestampOutOfWindow);
        }
        Ok(())
    }

    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            nonce_checks: self.nonce_checks.load(Ordering::Relaxed),
            nonce_replays_blocked: self.nonce_replays_blocked.load(Ordering::Relaxed),
            timestamp_checks: self.timestamp_checks.load(Ordering::Relaxed),
            timestamp_replays_blocked: self.timestamp_replays_blocked.load(Ordering::Relaxed),
            nonce_cache_size: self.nonces.lock().unwrap().len(),
            nonce_cache_max_size: self.nonce_cache_max_entries,
        }
    }

    pub fn clear_cache(&self) {
        self.nonces.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ReplayGuard {
        ReplayGuard::new(300, 100_000, 300, 60)
    }

    #[test]
    fn nonce_is_allowed_once_then_rejected() {
        let g = guard();
        g.check_nonce(Some("n1"), 1_000).unwrap();
        assert!(matches!(g.check_nonce(Some("n1"), 1_001), Err(GatewayError::NonceReused)));
        assert_eq!(g.stats().nonce_replays_blocked, 1);
    }

    #[test]
    fn absent_nonce_is_a_no_op() {
        let g = guard();
        g.check_nonce(None, 1_000).unwrap();
        assert_eq!(g.stats().nonce_checks, 0);
    }

    #[test]
    fn nonce_expires_after_ttl() {
        let g = guard();
        g.check_nonce(Some("n1"), 1_000).unwrap();
        g.check_nonce(Some("n1"), 1_000 + 301).unwrap();
    }

    #[test]
    fn timestamp_too_old_is_rejected() {
        let g = guard();
        assert!(matches!(
            g.check_timestamp(Some(1_000), 1_000 + 301),
            Err(GatewayError::TimestampOutOfWindow)
        ));
    }

    #[test]
    fn timestamp_too_far_in_future_is_rejected() {
        let g = guard();
        assert!(matches!(
            g.check_timestamp(Some(1_000 + 61), 1_000),
            Err(GatewayError::TimestampOutOfWindow)
        ));
    }

    #[test]
    fn timestamp_within_window_and_skew_is_allowed() {
        let g = guard();
        g.check_timestamp(Some(1_000), 1_000 + 299).unwrap();
        g.check_timestamp(Some(1_000 + 59), 1_000).unwrap();
    }

    #[test]
    fn cache_can_be_cleared() {
        let g = guard();
        g.check_nonce(Some("n1"), 1_000).unwrap();
        assert_eq!(g.stats().nonce_cache_size, 1);
        g.clear_cache();
        assert_eq!(g.stats().nonce_cache_size, 0);
    }
}
