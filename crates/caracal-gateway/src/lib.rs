pub mod admin;
pub mod app;
pub mod auth;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod stats;

pub use app::{build_router, AppState};
pub use error::GatewayError;
