use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{AuthMode, GatewayConfig};

/// Mirrors every field of `GatewayConfig`, wrapped in `Option`, so a TOML
/// file (or an environment-variable overlay built the same shape) only
/// needs to mention the settings it overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfigOverlay {
    pub listen_addr: Option<SocketAddr>,
    pub auth_mode: Option<AuthMode>,

    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub tls_ca_path: Option<PathBuf>,

    pub nonce_cache_ttl_seconds: Option<i64>,
    pub nonce_cache_max_entries: Option<usize>,
    pub timestamp_window_seconds: Option<i64>,
    pub future_skew_seconds: Option<i64>,

    pub upstream_timeout_seconds: Option<u64>,
    pub max_request_body_bytes: Option<usize>,

    pub registry_path: Option<PathBuf>,
    pub policy_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub backup_count: Option<u32>,

    pub reap_interval_seconds: Option<u64>,
    pub reap_batch_size: Option<usize>,

    pub policy_cache_max_entries: Option<usize>,
    pub policy_cache_ttl_seconds: Option<i64>,
}

impl GatewayConfigOverlay {
    pub fn apply_to(&self, cfg: &mut GatewayConfig) {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(v) = self.$field.clone() {
                    cfg.$field = v;
                }
            };
        }
        overlay!(listen_addr);
        overlay!(auth_mode);
        overlay!(tls_cert_path);
        overlay!(tls_key_path);
        overlay!(tls_ca_path);
        overlay!(nonce_cache_ttl_seconds);
        overlay!(nonce_cache_max_entries);
        overlay!(timestamp_window_seconds);
        overlay!(future_skew_seconds);
        overlay!(upstream_timeout_seconds);
        overlay!(max_request_body_bytes);
        overlay!(registry_path);
        overlay!(policy_path);
        overlay!(ledger_path);
        overlay!(backup_count);
        overlay!(reap_interval_seconds);
        overlay!(reap_batch_size);
        overlay!(policy_cache_max_entries);
        overlay!(policy_cache_ttl_seconds);
    }
}
