use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::file::GatewayConfigOverlay;
use crate::types::AuthMode;

/// CLI surface for `caracal-node`, grounded on `chronx-node`'s `Args`. Every
/// field is optional: an absent flag means "fall through to env, file, or
/// default" rather than clap filling in a hardcoded default itself.
#[derive(Parser, Debug)]
#[command(name = "caracal-node", version, about = "Caracal authority gateway")]
pub struct Args {
    /// Optional path to a TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    #[arg(long, value_enum)]
    pub auth_mode: Option<AuthMode>,

    #[arg(long)]
    pub tls_cert_path: Option<PathBuf>,
    #[arg(long)]
    pub tls_key_path: Option<PathBuf>,
    #[arg(long)]
    pub tls_ca_path: Option<PathBuf>,

    #[arg(long)]
    pub nonce_cache_ttl_seconds: Option<i64>,
    #[arg(long)]
    pub nonce_cache_max_entries: Option<usize>,
    #[arg(long)]
    pub timestamp_window_seconds: Option<i64>,
    #[arg(long)]
    pub future_skew_seconds: Option<i64>,

    #[arg(long)]
    pub upstream_timeout_seconds: Option<u64>,
    #[arg(long)]
    pub max_request_body_bytes: Option<usize>,

    #[arg(long)]
    pub registry_path: Option<PathBuf>,
    #[arg(long)]
    pub policy_path: Option<PathBuf>,
    #[arg(long)]
    pub ledger_path: Option<PathBuf>,
    #[arg(long)]
    pub backup_count: Option<u32>,

    #[arg(long)]
    pub reap_interval_seconds: Option<u64>,
    #[arg(long)]
    pub reap_batch_size: Option<usize>,

    #[arg(long)]
    pub policy_cache_max_entries: Option<usize>,
    #[arg(long)]
    pub policy_cache_ttl_seconds: Option<i64>,
}

impl Args {
    pub fn as_overlay(&self) -> GatewayConfigOverlay {
        GatewayConfigOverlay {
            listen_addr: self.listen_addr,
            auth_mode: self.auth_mode,
            tls_cert_path: self.tls_cert_path.clone(),
            tls_key_path: self.tls_key_path.clone(),
            tls_ca_path: self.tls_ca_path.clone(),
            nonce_cache_ttl_seconds: self.nonce_cache_ttl_seconds,
            nonce_cache_max_entries: self.nonce_cache_max_entries,
            timestamp_window_seconds: self.timestamp_window_seconds,
            future_skew_seconds: self.future_skew_seconds,
            upstream_timeout_seconds: self.upstream_timeout_seconds,
            max_request_body_bytes: self.max_request_body_bytes,
            registry_path: self.registry_path.clone(),
            policy_path: self.policy_path.clone(),
            ledger_path: self.ledger_path.clone(),
            backup_count: self.backup_count,
            reap_interval_seconds: self.reap_interval_seconds,
            reap_batch_size: self.reap_batch_size,
            policy_cache_max_entries: self.policy_cache_max_entries,
            policy_cache_ttl_seconds: self.policy_cache_ttl_seconds,
        }
    }
}
