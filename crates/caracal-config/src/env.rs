use std::str::FromStr;

use crate::error::ConfigError;
use crate::file::GatewayConfigOverlay;

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Configuration(format!("{name}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::Configuration(format!("{name}: {e}"))),
    }
}

/// Reads the `CARACAL_*` environment variables into an overlay. Each
/// variable overrides the defaults and any TOML file, but is itself
/// overridden by an explicit CLI flag.
pub fn load_overlay() -> Result<GatewayConfigOverlay, ConfigError> {
    Ok(GatewayConfigOverlay {
        listen_addr: parse_env("CARACAL_LISTEN_ADDR")?,
        auth_mode: parse_env("CARACAL_AUTH_MODE")?,
        tls_cert_path: parse_env("CARACAL_TLS_CERT_PATH")?,
        tls_key_path: parse_env("CARACAL_TLS_KEY_PATH")?,
        tls_ca_path: parse_env("CARACAL_TLS_CA_PATH")?,
        nonce_cache_ttl_seconds: parse_env("CARACAL_NONCE_CACHE_TTL_SECONDS")?,
        nonce_cache_max_entries: parse_env("CARACAL_NONCE_CACHE_MAX_ENTRIES")?,
        timestamp_window_seconds: parse_env("CARACAL_TIMESTAMP_WINDOW_SECONDS")?,
        future_skew_seconds: parse_env("CARACAL_FUTURE_SKEW_SECONDS")?,
        upstream_timeout_seconds: parse_env("CARACAL_UPSTREAM_TIMEOUT_SECONDS")?,
        max_request_body_bytes: parse_env("CARACAL_MAX_REQUEST_BODY_BYTES")?,
        registry_path: parse_env("CARACAL_REGISTRY_PATH")?,
        policy_path: parse_env("CARACAL_POLICY_PATH")?,
        ledger_path: parse_env("CARACAL_LEDGER_PATH")?,
        backup_count: parse_env("CARACAL_BACKUP_COUNT")?,
        reap_interval_seconds: parse_env("CARACAL_REAP_INTERVAL_SECONDS")?,
        reap_batch_size: parse_env("CARACAL_REAP_BATCH_SIZE")?,
        policy_cache_max_entries: parse_env("CARACAL_POLICY_CACHE_MAX_ENTRIES")?,
        policy_cache_ttl_seconds: parse_env("CARACAL_POLICY_CACHE_TTL_SECONDS")?,
    })
}
