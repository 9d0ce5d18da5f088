use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request counters surfaced at `GET /stats`. Grounded on
/// `caracal/gateway/proxy.py`'s plain instance counters
/// (`_request_count`, `_allowed_count`, `_denied_count`, `_auth_failures`)
/// and `replay_protection.py`'s `get_stats`.
#[derive(Default)]
pub struct GatewayStats {
    total: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    auth_failures: AtomicU64,
    replay_blocks: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct GatewayStatsSnapshot {
    pub total: u64,
    pub allowed: u64,
    pub denied: u64,
    pub auth_failures: u64,
    pub replay_blocks: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay_block(&self) {
        self.replay_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            replay_blocks: self.replay_blocks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let stats = GatewayStats::new();
        assert_eq!(stats.snapshot().total, 0);
        stats.record_total();
        stats.record_total();
        stats.record_allowed();
        stats.record_auth_failure();
        let snap = stats.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.allowed, 1);
        assert_eq!(snap.auth_failures, 1);
        assert_eq!(snap.denied, 0);
    }
}
