use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use persistence::{BaseConfigLoader, BaseConfigSource, OverrideBackend, OverrideStore};
use shared::clock::SharedClock;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{feature_gate, metrics_handler, metrics_middleware, require_feature};
use crate::routes::{feature_flags, health, pricing};
use crate::services::{FeatureFlagService, PricingService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pricing: Arc<PricingService>,
    pub flags: Arc<FeatureFlagService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires both engines over one override backend and one base source.
    ///
    /// Pricing and flags share the base loader but keep separate override
    /// namespaces: pricing overrides expire after `pricing.override_ttl_secs`,
    /// flag overrides never expire and are read through a local cache.
    pub fn new(
        config: Config,
        backend: Arc<dyn OverrideBackend>,
        base_source: Arc<dyn BaseConfigSource>,
        clock: SharedClock,
    ) -> Self {
        let base = Arc::new(BaseConfigLoader::new(
            base_source,
            config.pricing.cache_ttl(),
            config.feature_flags.cache_ttl(),
            clock.clone(),
        ));

        let pricing_store = OverrideStore::new(&config.pricing.namespace, backend.clone())
            .with_write_ttl(config.pricing.override_ttl());
        let flag_store = OverrideStore::new(&config.feature_flags.namespace, backend)
            .with_read_cache(config.feature_flags.cache_ttl(), clock.clone());

        let pricing = PricingService::new(base.clone(), pricing_store, clock.clone());
        let flags = FeatureFlagService::new(
            base,
            flag_store,
            config.feature_flags.allow_runtime_updates,
            clock,
        );

        Self {
            config: Arc::new(config),
            pricing: Arc::new(pricing),
            flags: Arc::new(flags),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Pricing routes disappear (404) while the gate flag is off for the caller
    let mut pricing_routes = Router::new()
        .route(
            "/api/v1/pricing/adjustments",
            get(pricing::list_adjustments).post(pricing::create_adjustment),
        )
        .route(
            "/api/v1/pricing/adjustments/:adjustment_id",
            put(pricing::update_adjustment).delete(pricing::archive_adjustment),
        )
        .route("/api/v1/pricing/evaluate", post(pricing::evaluate_price));

    if let Some(flag_key) = config.pricing.gate_flag() {
        pricing_routes = pricing_routes.route_layer(middleware::from_fn_with_state(
            require_feature(state.flags.clone(), flag_key),
            feature_gate,
        ));
    }

    let flag_routes = Router::new()
        .route("/api/v1/feature-flags", get(feature_flags::list_flags))
        .route(
            "/api/v1/feature-flags/:flag_key",
            get(feature_flags::get_flag)
                .put(feature_flags::update_flag)
                .delete(feature_flags::remove_override),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/api/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(pricing_routes)
        .merge(flag_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
