use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use caracal_identity::RegistryError;
use caracal_ledger::LedgerError;
use caracal_mandate::MandateError;
use caracal_policy::PolicyError;

/// Every distinct failure path the pipeline in §4.10 can take, mapped 1:1 to
/// the HTTP status taxonomy in §6/§7. A blanket `From` is provided for each
/// downstream crate's error so stages can use `?` and still fail closed: any
/// variant not given a specific mapping here becomes `Internal`, never a
/// pass-through allow.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Deliberately uninformative: stage 1 never reveals which factor failed.
    #[error("authentication failed")]
    AuthFailure,

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid header {0}: {1}")]
    InvalidHeader(&'static str, String),

    #[error("nonce reused")]
    NonceReused,

    #[error("timestamp out of window")]
    TimestampOutOfWindow,

    #[error("mandate not found: {0}")]
    MandateNotFound(String),

    #[error("mandate expired")]
    MandateExpired,

    #[error("mandate revoked")]
    MandateRevoked,

    #[error("scope denied for action '{action}' on resource '{resource}'")]
    ScopeDenied { action: String, resource: String },

    #[error("budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    #[error("policy service unavailable")]
    PolicyServiceUnavailable,

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream network error: {0}")]
    UpstreamNetworkError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingHeader(_) | GatewayError::InvalidHeader(_, _) => StatusCode::BAD_REQUEST,
            GatewayError::AuthFailure => StatusCode::UNAUTHORIZED,
            GatewayError::NonceReused
            | GatewayError::TimestampOutOfWindow
            | GatewayError::MandateNotFound(_)
            | GatewayError::MandateExpired
            | GatewayError::MandateRevoked
            | GatewayError::ScopeDenied { .. }
            | GatewayError::BudgetExceeded { .. } => StatusCode::FORBIDDEN,
            GatewayError::PolicyServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamNetworkError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A short machine-readable tag for the JSON error envelope, distinct
    /// from the human-readable `Display` message.
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::AuthFailure => "auth_failure",
            GatewayError::MissingHeader(_) => "missing_header",
            GatewayError::InvalidHeader(_, _) => "invalid_header",
            GatewayError::NonceReused => "nonce_reused",
            GatewayError::TimestampOutOfWindow => "timestamp_out_of_window",
            GatewayError::MandateNotFound(_) => "mandate_not_found",
            GatewayError::MandateExpired => "mandate_expired",
            GatewayError::MandateRevoked => "mandate_revoked",
            GatewayError::ScopeDenied { .. } => "scope_denied",
            GatewayError::BudgetExceeded { .. } => "budget_exceeded",
            GatewayError::PolicyServiceUnavailable => "policy_service_unavailable",
            GatewayError::UpstreamTimeout => "upstream_timeout",
            GatewayError::UpstreamNetworkError(_) => "upstream_network_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed with an internal error");
        }
        let body = Json(json!({ "error": self.kind(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<MandateError> for GatewayError {
    fn from(e: MandateError) -> Self {
        match e {
            MandateError::NotFound(id) => GatewayError::MandateNotFound(id),
            MandateError::Expired => GatewayError::MandateExpired,
            MandateError::Revoked => GatewayError::MandateRevoked,
            MandateError::ScopeDenied { action, resource } => GatewayError::ScopeDenied { action, resource },
            MandateError::DepthExceeded => GatewayError::ScopeDenied {
                action: "call".to_string(),
                resource: "<delegation depth exceeded>".to_string(),
            },
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<PolicyError> for GatewayError {
    fn from(e: PolicyError) -> Self {
        // The evaluator fails closed: any internal policy-engine error is
        // indistinguishable from service unavailability to the caller.
        tracing::error!(error = %e, "policy evaluation failed, treating as service unavailable");
        GatewayError::PolicyServiceUnavailable
    }
}

impl From<LedgerError> for GatewayError {
    fn from(e: LedgerError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}
