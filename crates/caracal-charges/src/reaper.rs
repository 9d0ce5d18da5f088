use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::manager::ProvisionalChargeManager;

/// A cooperative `while running { reap(); sleep(interval); }` loop, started
/// at boot and stopped via a shutdown signal. Errors are impossible on this
/// in-memory table, but the original's "log and swallow, keep looping"
/// discipline (`ProvisionalChargeCleanupJob`) is preserved in spirit: a
/// panic inside one tick must never stop subsequent ticks, so the reap call
/// itself is wrapped in `catch_unwind`.
pub async fn run_reaper(
    manager: Arc<ProvisionalChargeManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(manager.config().reap_interval_seconds);
    let batch_size = manager.config().reap_batch_size;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let mgr = manager.clone();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mgr.reap_expired(batch_size)));
                match result {
                    Ok(count) if count > 0 => tracing::info!(count, "reaper released expired provisional charges"),
                    Ok(_) => {}
                    Err(_) => tracing::error!("reaper tick panicked, continuing on next tick"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("reaper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caracal_core::PrincipalId;
    use rust_decimal_macros::dec;
    use caracal_core::Money;
    use crate::types::ChargeConfig;

    #[tokio::test(start_paused = true)]
    async fn reaper_releases_expired_charges_and_stops_on_shutdown() {
        let manager = Arc::new(ProvisionalChargeManager::new(ChargeConfig {
            reap_interval_seconds: 1,
            ..ChargeConfig::default()
        }));
        let charge = manager.create(PrincipalId::new(), Money::from_decimal(dec!(1.00)), "USD", Some(-5));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_reaper(manager.clone(), rx));

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert_eq!(manager.expired_unreleased_count(None), 0);
        let _ = charge;

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
