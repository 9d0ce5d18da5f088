//! caracal-node — the Caracal authority-gateway binary.
//!
//! Startup sequence:
//!   1. Parse CLI args and resolve the layered configuration (CLI > env > file > default)
//!   2. Open the principal registry, mandate store, policy store and ledger
//!   3. Start the provisional-charge reaper as a background task
//!   4. Build the gateway router and serve it on `listen_addr`

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use caracal_charges::{ChargeConfig, ProvisionalChargeManager};
use caracal_config::Args;
use caracal_gateway::{build_router, AppState};
use caracal_identity::PrincipalRegistry;
use caracal_ledger::{LedgerQuery, LedgerWriter};
use caracal_mandate::MandateManager;
use caracal_policy::PolicyStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,caracal=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = caracal_config::load(&args).context("loading gateway configuration")?;
    info!(listen_addr = %config.listen_addr, auth_mode = ?config.auth_mode, "caracal-node starting");

    for path in [&config.registry_path, &config.policy_path, &config.ledger_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("creating data directory {}", parent.display()))?;
        }
    }

    let registry = Arc::new(
        PrincipalRegistry::open_with_backups(&config.registry_path, config.backup_count)
            .context("opening principal registry")?,
    );
    let mandate_manager = Arc::new(
        MandateManager::open_with_backups(registry.clone(), config.registry_path.with_file_name("mandates.json"), config.backup_count)
            .context("opening mandate store")?,
    );
    let policy_store =
        PolicyStore::open_with_backups(&config.policy_path, config.backup_count).context("opening policy store")?;

    let charges = Arc::new(ProvisionalChargeManager::new(ChargeConfig {
        reap_interval_seconds: config.reap_interval_seconds,
        reap_batch_size: config.reap_batch_size,
        ..ChargeConfig::default()
    }));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper_handle = tokio::spawn(caracal_charges::run_reaper(charges.clone(), shutdown_rx));

    let ledger_writer = LedgerWriter::open_with_backups(&config.ledger_path, config.backup_count).context("opening ledger writer")?;
    let ledger_query = LedgerQuery::new(&config.ledger_path);

    let state = Arc::new(AppState::new(
        config.clone(),
        registry,
        mandate_manager,
        policy_store,
        charges,
        ledger_writer,
        ledger_query,
    ));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    info!("caracal-node ready");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving gateway")?;

    let _ = shutdown_tx.send(true);
    let _ = reaper_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
