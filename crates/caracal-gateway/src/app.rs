use std::sync::Arc;
use std::time::Duration;

use axum::routing::{any, get};
use axum::Router;
use caracal_cache::PolicyCache;
use caracal_charges::ProvisionalChargeManager;
use caracal_config::GatewayConfig;
use caracal_identity::PrincipalRegistry;
use caracal_ledger::{LedgerQuery, LedgerWriter};
use caracal_mandate::MandateManager;
use caracal_policy::PolicyStore;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::replay::ReplayGuard;
use crate::stats::GatewayStats;

/// Everything a request needs, shared across the whole router behind a
/// single `Arc`. Grounded on `chronx-rpc/src/server.rs`'s CORS/tracing
/// layering (`ServiceBuilder::new().layer(cors)`), adapted from its
/// jsonrpsee RPC-method dispatch to axum's arbitrary-method/path/body
/// forwarding, since this gateway proxies whole HTTP requests rather than
/// dispatching named RPC methods.
pub struct AppState {
    pub config: GatewayConfig,
    pub registry: Arc<PrincipalRegistry>,
    pub mandate_manager: Arc<MandateManager>,
    pub policy_store: PolicyStore,
    pub charges: Arc<ProvisionalChargeManager>,
    pub ledger_writer: LedgerWriter,
    pub ledger_query: LedgerQuery,
    pub policy_cache: PolicyCache,
    pub replay_guard: ReplayGuard,
    pub authenticator: Authenticator,
    pub stats: GatewayStats,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<PrincipalRegistry>,
        mandate_manager: Arc<MandateManager>,
        policy_store: PolicyStore,
        charges: Arc<ProvisionalChargeManager>,
        ledger_writer: LedgerWriter,
        ledger_query: LedgerQuery,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .build()
            .expect("reqwest client configuration is always valid");

        let replay_guard = ReplayGuard::new(
            config.nonce_cache_ttl_seconds,
            config.nonce_cache_max_entries,
            config.timestamp_window_seconds,
            config.future_skew_seconds,
        );
        let policy_cache = PolicyCache::new(caracal_cache::PolicyCacheConfig {
            max_entries: config.policy_cache_max_entries,
            ttl_seconds: config.policy_cache_ttl_seconds,
            cleanup_interval_seconds: 60,
        });
        let authenticator = Authenticator::new(registry.clone(), mandate_manager.clone());

        Self {
            config,
            registry,
            mandate_manager,
            policy_store,
            charges,
            ledger_writer,
            ledger_query,
            policy_cache,
            replay_guard,
            authenticator,
            stats: GatewayStats::new(),
            http_client,
        }
    }
}

/// Builds the full router: admin endpoints plus the catch-all proxy route,
/// with CORS and request tracing layered on top exactly as
/// `chronx-rpc`'s server wires its own middleware stack.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::admin::health))
        .route("/stats", get(crate::admin::stats))
        .route("/metrics", get(crate::admin::metrics))
        .route("/*path", any(crate::pipeline::proxy_handler))
        .route("/", any(crate::pipeline::proxy_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}
