pub mod manager;
pub mod reaper;
pub mod types;

pub use manager::ProvisionalChargeManager;
pub use reaper::run_reaper;
pub use types::{ChargeConfig, ProvisionalCharge};
