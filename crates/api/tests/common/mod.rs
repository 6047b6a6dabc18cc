//! Common test utilities for integration tests.
//!
//! Builds engines over the in-memory override backend, a static base config
//! and a manually driven clock, so no Redis or seed files are needed.

// Not every integration test uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use persistence::base_config::{parse_adjustments, parse_flag_layer};
use persistence::{
    BaseConfigSource, BaseFlags, InMemoryOverrideBackend, OverrideBackend,
    StaticBaseConfigSource, StoreError,
};
use pos_rules_api::app::{create_app, AppState};
use pos_rules_api::config::{
    Config, FeatureFlagsConfig, LoggingConfig, PricingConfig, RedisConfig, ServerConfig,
};
use serde_json::Value;
use shared::clock::ManualClock;
use tower::ServiceExt;

pub const BASE_ADJUSTMENTS: &str = r#"{
    "adjustments": [
        {
            "id": "lunch",
            "name": "Lunch special",
            "type": "percentage",
            "value": 15,
            "channels": ["pos", "customer"],
            "priority": 100,
            "stackable": false
        },
        {
            "id": "old-promo",
            "name": "Winter promo",
            "type": "percentage",
            "value": 50,
            "productIds": ["sku-winter"],
            "priority": 10,
            "status": "active",
            "endAt": "2026-01-31T23:59:59Z"
        }
    ]
}"#;

pub const BASE_FLAGS: &str = r#"{
    "platform.dynamic_pricing": {"enabled": true, "description": "Dynamic pricing routes"},
    "call_center_console": {"enabled": false, "owner": "ops"},
    "beta_checkout": {"enabled": true, "rollout": {"strategy": "percentage", "percentage": 25}},
    "new_menu": true
}"#;

/// Fixed "now" for every test: 2026-03-02T12:00:00Z.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        },
        redis: RedisConfig {
            url: "redis://localhost:6379".to_string(),
            enabled: false,
        },
        pricing: PricingConfig {
            namespace: "dynamic-pricing".to_string(),
            cache_ttl_secs: 30,
            override_ttl_secs: 30,
            base_config_path: "config/dynamic_pricing.json".to_string(),
            feature_flag: "platform.dynamic_pricing".to_string(),
        },
        feature_flags: FeatureFlagsConfig {
            namespace: "feature-flags".to_string(),
            cache_ttl_secs: 15,
            defaults_path: "config/feature_flags.json".to_string(),
            environment_overrides: None,
            allow_runtime_updates: true,
        },
    }
}

pub fn base_source() -> StaticBaseConfigSource {
    StaticBaseConfigSource::new(
        parse_adjustments(BASE_ADJUSTMENTS).unwrap(),
        BaseFlags {
            defaults: parse_flag_layer(BASE_FLAGS).unwrap(),
            environment: Default::default(),
        },
    )
}

/// A backend whose every call fails, as when Redis is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingOverrideBackend;

#[async_trait]
impl OverrideBackend for FailingOverrideBackend {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Connection("backend unavailable".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(StoreError::Connection("backend unavailable".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Connection("backend unavailable".into()))
    }
}

/// An engine plus handles to its clock and backend.
pub struct TestEngine {
    pub state: AppState,
    pub clock: ManualClock,
    pub backend: Arc<InMemoryOverrideBackend>,
}

impl TestEngine {
    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }
}

pub fn test_engine() -> TestEngine {
    test_engine_with(test_config(), Arc::new(base_source()))
}

pub fn test_engine_with(config: Config, source: Arc<dyn BaseConfigSource>) -> TestEngine {
    let clock = ManualClock::new(test_now());
    let backend = Arc::new(InMemoryOverrideBackend::with_clock(Arc::new(clock.clone())));
    let state = AppState::new(config, backend.clone(), source, Arc::new(clock.clone()));
    TestEngine {
        state,
        clock,
        backend,
    }
}

/// State over an arbitrary backend, e.g. one that always fails.
pub fn test_state_with_backend(backend: Arc<dyn OverrideBackend>) -> AppState {
    let clock = ManualClock::new(test_now());
    AppState::new(
        test_config(),
        backend,
        Arc::new(base_source()),
        Arc::new(clock),
    )
}

/// Request builder with the caller headers set by the gateway.
pub fn request(method: &str, uri: &str, tenant: Option<&str>, role: Option<&str>) -> Request<Body> {
    request_with_body(method, uri, tenant, role, None)
}

pub fn request_with_body(
    method: &str,
    uri: &str,
    tenant: Option<&str>,
    role: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "user-1")
        .header("x-user-name", "Test User");
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    if let Some(role) = role {
        builder = builder.header("x-user-role", role);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sends one request and decodes the JSON body (`Null` when empty, a string
/// when not JSON).
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}
