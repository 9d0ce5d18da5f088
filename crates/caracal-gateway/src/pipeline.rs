use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use caracal_core::money::DEFAULT_MAX_SCALE;
use caracal_core::{now_unix, MandateId, Money};
use caracal_policy::{Decision, PolicyEvaluator};
use http_body_util::BodyExt;
use serde_json::json;

use crate::app::AppState;
use crate::error::GatewayError;

const HEADER_MANDATE_ID: &str = "x-mandate-id";
const HEADER_TARGET_URL: &str = "x-target-url";
const HEADER_NONCE: &str = "x-nonce";
const HEADER_TIMESTAMP: &str = "x-timestamp";
const HEADER_ESTIMATED_COST: &str = "x-estimated-cost";
const HEADER_RESOURCE_TYPE: &str = "x-resource-type";
const HEADER_ACTUAL_COST: &str = "x-actual-cost";

const HEADER_DEGRADED_MODE: &str = "x-degraded-mode";
const HEADER_CACHE_AGE: &str = "x-cache-age";
const HEADER_CACHE_WARNING: &str = "x-cache-warning";

/// Control headers the gateway consumes itself and never forwards upstream,
/// along with the caller's own credential headers, `Host`, and
/// `Content-Length` (recomputed by the outbound client). Grounded on
/// `caracal/gateway/proxy.py`'s stripped-header list in `_forward_request`.
const STRIPPED_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-client-cert",
    "host",
    "content-length",
    HEADER_MANDATE_ID,
    HEADER_TARGET_URL,
    HEADER_NONCE,
    HEADER_TIMESTAMP,
    HEADER_ESTIMATED_COST,
    HEADER_RESOURCE_TYPE,
];

/// The single entry point implementing the eight-stage pipeline: authenticate,
/// replay defense, mandate lookup, scope validation, budget check, forward,
/// meter, return. Any error surfaced before the forward stage is fail-closed
/// — nothing reaches the upstream. Grounded on `caracal/gateway/proxy.py`'s
/// `_handle_request`.
pub async fn proxy_handler(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    state.stats.record_total();
    match run_pipeline(&state, req).await {
        Ok(response) => {
            state.stats.record_allowed();
            response
        }
        Err(err) => {
            if matches!(err, GatewayError::AuthFailure) {
                state.stats.record_auth_failure();
            } else if matches!(err, GatewayError::NonceReused | GatewayError::TimestampOutOfWindow) {
                state.stats.record_replay_block();
            }
            if !matches!(err, GatewayError::Internal(_)) {
                state.stats.record_denied();
            }
            err.into_response()
        }
    }
}

async fn run_pipeline(state: &AppState, req: Request<Body>) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();
    let headers = parts.headers;

    // Stage 1: authenticate.
    let principal = state.authenticator.authenticate(state.config.auth_mode, &headers)?;

    // Stage 2: replay defense.
    let now = now_unix();
    let nonce = optional_header(&headers, HEADER_NONCE)?;
    let timestamp = optional_header(&headers, HEADER_TIMESTAMP)?
        .map(|s| s.parse::<i64>().map_err(|_| GatewayError::InvalidHeader("X-Timestamp", s)))
        .transpose()?;
    if nonce.is_none() {
        tracing::warn!(principal_id = %principal.id, "request carried no X-Nonce header");
    }
    if timestamp.is_none() {
        tracing::warn!(principal_id = %principal.id, "request carried no X-Timestamp header");
    }
    state.replay_guard.check_nonce(nonce.as_deref(), now)?;
    state.replay_guard.check_timestamp(timestamp, now)?;

    // Stage 3: mandate lookup.
    let mandate_id_text = required_header(&headers, HEADER_MANDATE_ID)?;
    let mandate_id = MandateId::parse(&mandate_id_text)
        .map_err(|_| GatewayError::InvalidHeader("X-Mandate-ID", mandate_id_text))?;
    let mandate = state.mandate_manager.validate(mandate_id)?;

    // Stage 4: scope validation.
    let target_url_text = required_header(&headers, HEADER_TARGET_URL)?;
    let target_url = reqwest::Url::parse(&target_url_text)
        .map_err(|e| GatewayError::InvalidHeader("X-Target-URL", e.to_string()))?;
    let resource_type = optional_header(&headers, HEADER_RESOURCE_TYPE)?;
    let resource = resource_type.clone().unwrap_or_else(|| target_url.to_string());
    let action = parts.method.as_str().to_ascii_lowercase();
    state.mandate_manager.check_scope(&mandate, &action, &resource)?;

    // Stage 5: budget check, falling back to the policy cache when the
    // evaluator itself is unavailable (degraded mode).
    let estimated_cost = optional_header(&headers, HEADER_ESTIMATED_COST)?
        .map(|s| Money::parse(&s, DEFAULT_MAX_SCALE).map_err(|_| GatewayError::InvalidHeader("X-Estimated-Cost", s)))
        .transpose()?
        .unwrap_or_else(Money::zero);

    let evaluator = PolicyEvaluator::new(&state.policy_store, &state.ledger_query, &state.charges);
    let (charge_id, degraded) = match evaluator.check_budget(principal.id, estimated_cost, &mandate.claims.currency) {
        Ok(Decision::Approved { charge_id, .. }) => {
            state.policy_cache.put(
                principal.id,
                &resource,
                caracal_cache::CachedDecision::Allow,
                Some(mandate.id().to_string()),
                Default::default(),
            );
            (Some(charge_id), None)
        }
        Ok(Decision::Denied { reason, .. }) => {
            state.policy_cache.put(
                principal.id,
                &resource,
                caracal_cache::CachedDecision::Deny,
                Some(mandate.id().to_string()),
                Default::default(),
            );
            return Err(GatewayError::BudgetExceeded { reason });
        }
        Err(eval_err) => match state.policy_cache.get(principal.id, &resource) {
            Some(cached) if cached.decision == caracal_cache::CachedDecision::Allow => {
                let age = cached.age_seconds(now);
                tracing::warn!(principal_id = %principal.id, age, "budget engine unavailable, serving cached allow decision");
                (None, Some(age))
            }
            _ => return Err(eval_err.into()),
        },
    };

    // Stage 6: forward.
    let method = parts.method.clone();
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to read request body: {e}")))?
        .to_bytes();

    let mut builder = state.http_client.request(method, target_url.clone());
    for (name, value) in headers.iter() {
        if should_forward(name) {
            builder = builder.header(name, value);
        }
    }
    builder = builder.body(body_bytes);

    let upstream_response = builder
        .timeout(Duration::from_secs(state.config.upstream_timeout_seconds))
        .send()
        .await
        .map_err(classify_upstream_error)?;

    // Stage 7: meter.
    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let actual_cost = response_headers
        .get(HEADER_ACTUAL_COST)
        .and_then(|v| v.to_str().ok())
        .map(|s| Money::parse(s, DEFAULT_MAX_SCALE).unwrap_or(estimated_cost))
        .unwrap_or(estimated_cost);
    let response_body = upstream_response
        .bytes()
        .await
        .map_err(|e| GatewayError::UpstreamNetworkError(e.to_string()))?;

    let quantity = Money::parse("1", DEFAULT_MAX_SCALE).expect("\"1\" is always a valid decimal");
    let metadata = json!({
        "mandate_id": mandate.id().to_string(),
        "target_url": target_url.to_string(),
    });
    let event = state.ledger_writer.append(
        principal.id,
        resource_type.as_deref().unwrap_or("unclassified"),
        quantity,
        actual_cost,
        &mandate.claims.currency,
        Some(metadata),
    )?;

    if let Some(charge_id) = charge_id {
        state.charges.release(charge_id, Some(event.event_id));
    }

    // Stage 8: return, with degraded-mode headers attached when this
    // request was served off the policy cache rather than a live decision.
    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }
    if let Some(age) = degraded {
        builder = builder
            .header(HEADER_DEGRADED_MODE, HeaderValue::from_static("true"))
            .header(HEADER_CACHE_AGE, age.to_string())
            .header(
                HEADER_CACHE_WARNING,
                HeaderValue::from_static("budget engine unavailable, decision served from cache"),
            );
    }
    builder
        .body(Body::from(response_body))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, GatewayError> {
    headers
        .get(name)
        .ok_or(GatewayError::MissingHeader(name))?
        .to_str()
        .map(str::to_string)
        .map_err(|e| GatewayError::InvalidHeader(name, e.to_string()))
}

fn optional_header(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, GatewayError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|e| GatewayError::InvalidHeader(name, e.to_string())),
    }
}

fn should_forward(name: &HeaderName) -> bool {
    !STRIPPED_HEADERS.iter().any(|stripped| name.as_str().eq_ignore_ascii_case(stripped))
}

fn classify_upstream_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        GatewayError::UpstreamNetworkError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_credential_and_control_headers() {
        assert!(!should_forward(&HeaderName::from_static("authorization")));
        assert!(!should_forward(&HeaderName::from_static("x-api-key")));
        assert!(!should_forward(&HeaderName::from_static(HEADER_MANDATE_ID)));
        assert!(!should_forward(&HeaderName::from_static(HEADER_TARGET_URL)));
        assert!(should_forward(&HeaderName::from_static("content-type")));
    }

    #[test]
    fn required_header_round_trips() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_MANDATE_ID, HeaderValue::from_static("abc"));
        assert_eq!(required_header(&headers, HEADER_MANDATE_ID).unwrap(), "abc");
        assert!(matches!(required_header(&headers, HEADER_TARGET_URL), Err(GatewayError::MissingHeader(_))));
    }
}
