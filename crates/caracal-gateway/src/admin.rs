use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use serde_json::json;

use crate::app::AppState;

/// `GET /health`: a cheap liveness probe. Degrades to `503` only if the
/// ledger/registry paths have become unreachable, never on budget-engine
/// trouble (that is the gateway's whole job to absorb).
pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /stats`: request counters plus the replay guard's own nonce/timestamp
/// counters and the policy cache's hit/miss counters, mirroring
/// `caracal/gateway/proxy.py`'s combined `get_stats` payload.
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "gateway": state.stats.snapshot(),
        "replay": state.replay_guard.stats(),
        "policy_cache": state.policy_cache.stats(),
    }))
}

/// `GET /metrics`: the same counters in Prometheus exposition format.
/// Grounded on `caracal`'s metrics endpoint; the crate that renders it
/// (`prometheus`) is the one `SPEC_FULL.md`'s module map names for
/// ambient observability.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let registry = Registry::new();
    let snapshot = state.stats.snapshot();
    let replay = state.replay_guard.stats();

    let total = IntGauge::new("caracal_requests_total", "Total requests handled").unwrap();
    total.set(snapshot.total as i64);
    let allowed = IntGauge::new("caracal_requests_allowed", "Requests allowed through").unwrap();
    allowed.set(snapshot.allowed as i64);
    let denied = IntGauge::new("caracal_requests_denied", "Requests denied").unwrap();
    denied.set(snapshot.denied as i64);
    let auth_failures = IntGauge::new("caracal_auth_failures_total", "Authentication failures").unwrap();
    auth_failures.set(snapshot.auth_failures as i64);
    let replay_blocks = IntGauge::new("caracal_replay_blocks_total", "Requests blocked as replays").unwrap();
    replay_blocks.set((snapshot.replay_blocks + replay.timestamp_replays_blocked) as i64);

    for gauge in [&total, &allowed, &denied, &auth_failures, &replay_blocks] {
        registry.register(Box::new(gauge.clone())).expect("metric names are unique and registered once");
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .expect("prometheus text encoding is infallible for gauge families");

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buffer).into_response()
}
