use std::net::SocketAddr;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum AuthMode {
    Mtls,
    Jwt,
    ApiKey,
}

impl std::str::FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtls" => Ok(Self::Mtls),
            "jwt" => Ok(Self::Jwt),
            "api_key" => Ok(Self::ApiKey),
            other => Err(format!("unknown auth mode '{other}'")),
        }
    }
}

/// Everything the gateway binary needs to start. Grounded on
/// `chronx-node`'s `Args`, generalized from a flat CLI struct into a
/// layered TOML + env + CLI configuration since a gateway has far more
/// settings than a blockchain node's handful of flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub auth_mode: AuthMode,

    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub tls_ca_path: Option<PathBuf>,

    pub nonce_cache_ttl_seconds: i64,
    pub nonce_cache_max_entries: usize,
    pub timestamp_window_seconds: i64,
    pub future_skew_seconds: i64,

    pub upstream_timeout_seconds: u64,
    pub max_request_body_bytes: usize,

    pub registry_path: PathBuf,
    pub policy_path: PathBuf,
    pub ledger_path: PathBuf,
    pub backup_count: u32,

    pub reap_interval_seconds: u64,
    pub reap_batch_size: usize,

    pub policy_cache_max_entries: usize,
    pub policy_cache_ttl_seconds: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8443".parse().unwrap(),
            auth_mode: AuthMode::Jwt,

            tls_cert_path: None,
            tls_key_path: None,
            tls_ca_path: None,

            nonce_cache_ttl_seconds: 300,
            nonce_cache_max_entries: 100_000,
            timestamp_window_seconds: 300,
            future_skew_seconds: 60,

            upstream_timeout_seconds: 30,
            max_request_body_bytes: 10 * 1024 * 1024,

            registry_path: PathBuf::from("./data/registry.json"),
            policy_path: PathBuf::from("./data/policies.json"),
            ledger_path: PathBuf::from("./data/ledger.jsonl"),
            backup_count: 3,

            reap_interval_seconds: 60,
            reap_batch_size: 1000,

            policy_cache_max_entries: 10_000,
            policy_cache_ttl_seconds: 300,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError;

        if self.upstream_timeout_seconds == 0 {
            return Err(ConfigError::Configuration("upstream_timeout_seconds must be non-zero".into()));
        }
        if self.max_request_body_bytes == 0 {
            return Err(ConfigError::Configuration("max_request_body_bytes must be non-zero".into()));
        }
        if self.nonce_cache_max_entries == 0 {
            return Err(ConfigError::Configuration("nonce_cache_max_entries must be non-zero".into()));
        }
        if self.policy_cache_max_entries == 0 {
            return Err(ConfigError::Configuration("policy_cache_max_entries must be non-zero".into()));
        }
        if self.auth_mode == AuthMode::Mtls && self.tls_cert_path.is_none() {
            return Err(ConfigError::Configuration("mtls auth mode requires tls_cert_path".into()));
        }
        Ok(())
    }
}
