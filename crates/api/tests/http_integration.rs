//! HTTP-level tests: routing, caller headers, role checks and the pricing
//! feature gate.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{
    request, request_with_body, send, test_config, test_engine, test_engine_with,
    FailingOverrideBackend, test_state_with_backend,
};
use pos_rules_api::app::create_app;
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints() {
    let engine = test_engine();

    let (status, body) = send(engine.router(), request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["overrides"]["backend"], "memory");
    assert_eq!(body["base_config"]["adjustments"], 2);
    assert_eq!(body["base_config"]["flags"], 4);

    let (status, body) = send(engine.router(), request("GET", "/api/health/live", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) =
        send(engine.router(), request("GET", "/api/health/ready", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_not_ready_without_override_backend() {
    let router = create_app(test_state_with_backend(Arc::new(FailingOverrideBackend)));

    let (status, _) = send(router.clone(), request("GET", "/api/health/ready", None, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(router, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["overrides"]["connected"], false);
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let engine = test_engine();
    let (status, body) = send(engine.router(), request("GET", "/metrics", None, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Metrics not initialized");
}

#[tokio::test]
async fn test_evaluate_price_over_http() {
    let engine = test_engine();
    let router = engine.router();

    let create = json!({
        "id": "branch-excl",
        "name": "Branch 7 exclusive",
        "type": "fixed",
        "fixedPrice": 25,
        "branchIds": [7],
        "channels": ["pos"],
        "priority": 50
    });
    let (status, body) = send(
        router.clone(),
        request_with_body(
            "POST",
            "/api/v1/pricing/adjustments",
            Some("42"),
            Some("manager"),
            Some(create),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["adjustments"][0]["id"], "branch-excl");
    assert_eq!(body["adjustments"][0]["createdBy"], "user-1");

    let evaluate = json!({"productId": 1, "basePrice": 40, "branchId": 7, "channel": "pos"});
    let (status, body) = send(
        router,
        request_with_body(
            "POST",
            "/api/v1/pricing/evaluate",
            Some("42"),
            Some("cashier"),
            Some(evaluate),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 25.0);
    assert_eq!(body["available"], true);
    assert_eq!(body["applied"][0]["id"], "branch-excl");
}

#[tokio::test]
async fn test_pricing_admin_requires_role() {
    let engine = test_engine();

    let (status, body) = send(
        engine.router(),
        request("GET", "/api/v1/pricing/adjustments", Some("42"), Some("cashier")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = send(
        engine.router(),
        request(
            "GET",
            "/api/v1/pricing/adjustments?includeExpired=true",
            Some("42"),
            Some("admin"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["adjustments"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_archive_over_http() {
    let engine = test_engine();

    let (status, body) = send(
        engine.router(),
        request(
            "DELETE",
            "/api/v1/pricing/adjustments/lunch",
            Some("42"),
            Some("manager"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["adjustments"][0]["status"], "archived");

    let (status, body) = send(
        engine.router(),
        request(
            "DELETE",
            "/api/v1/pricing/adjustments/missing",
            Some("42"),
            Some("manager"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_invalid_adjustment_is_bad_request() {
    let engine = test_engine();
    let (status, body) = send(
        engine.router(),
        request_with_body(
            "PUT",
            "/api/v1/pricing/adjustments/lunch",
            Some("42"),
            Some("admin"),
            Some(json!({"value": 250})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_pricing_routes_hidden_when_gate_flag_off() {
    let engine = test_engine();
    let router = engine.router();

    let (status, _) = send(
        router.clone(),
        request_with_body(
            "PUT",
            "/api/v1/feature-flags/platform.dynamic_pricing",
            Some("42"),
            Some("admin"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        router.clone(),
        request("GET", "/api/v1/pricing/adjustments", Some("42"), Some("admin")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FEATURE_DISABLED");
    assert_eq!(body["feature"], "platform.dynamic_pricing");

    // Other tenants keep the routes.
    let (status, _) = send(
        router,
        request("GET", "/api/v1/pricing/adjustments", Some("7"), Some("admin")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ungated_pricing_routes() {
    let mut config = test_config();
    config.pricing.feature_flag = String::new();
    let engine = test_engine_with(config, Arc::new(common::base_source()));

    engine
        .state
        .flags
        .update_flag(
            "platform.dynamic_pricing",
            domain::models::UpdateFlagRequest::new(false),
            domain::models::FlagScope::Global,
            None,
            &domain::models::Actor::new("admin-1"),
        )
        .await
        .unwrap();

    let (status, _) = send(
        engine.router(),
        request("GET", "/api/v1/pricing/adjustments", Some("42"), Some("admin")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_flag_routes() {
    let engine = test_engine();
    let router = engine.router();

    let (status, body) = send(
        router.clone(),
        request_with_body(
            "PUT",
            "/api/v1/feature-flags/call_center_console",
            Some("42"),
            Some("admin"),
            Some(json!({"enabled": true, "notes": "Pilot"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "tenant");
    assert_eq!(body["tenantId"], "42");
    assert_eq!(body["data"]["activeSource"], "tenant");
    assert_eq!(body["data"]["notes"], "Pilot");

    let (status, body) = send(
        router.clone(),
        request(
            "GET",
            "/api/v1/feature-flags/call_center_console?includeMetadata=true",
            Some("42"),
            Some("cashier"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["evaluation"], true);
    assert!(body["data"]["sources"]["tenant"].is_object());

    let (status, body) = send(
        router.clone(),
        request("GET", "/api/v1/feature-flags", Some("42"), Some("cashier")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
    assert!(body["data"][0].get("sources").is_none());

    let (status, _) = send(
        router.clone(),
        request(
            "DELETE",
            "/api/v1/feature-flags/call_center_console",
            Some("42"),
            Some("admin"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        router,
        request(
            "GET",
            "/api/v1/feature-flags/call_center_console",
            Some("42"),
            Some("cashier"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activeSource"], "default");
    assert_eq!(body["data"]["evaluation"], false);
}

#[tokio::test]
async fn test_flag_route_rejections() {
    let engine = test_engine();
    let router = engine.router();

    // Writes are admin-only.
    let (status, _) = send(
        router.clone(),
        request_with_body(
            "PUT",
            "/api/v1/feature-flags/new_menu",
            Some("42"),
            Some("manager"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reading the global scope is admin-only.
    let (status, _) = send(
        router.clone(),
        request("GET", "/api/v1/feature-flags?scope=global", Some("42"), Some("manager")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Tenant scope without a tenant header.
    let (status, body) = send(
        router.clone(),
        request_with_body(
            "PUT",
            "/api/v1/feature-flags/new_menu",
            None,
            Some("admin"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = send(
        router,
        request("GET", "/api/v1/feature-flags/nope", Some("42"), Some("admin")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_runtime_updates_disabled_is_forbidden() {
    let mut config = test_config();
    config.feature_flags.allow_runtime_updates = false;
    let engine = test_engine_with(config, Arc::new(common::base_source()));

    let (status, _) = send(
        engine.router(),
        request_with_body(
            "PUT",
            "/api/v1/feature-flags/new_menu?scope=global",
            None,
            Some("admin"),
            Some(json!({"enabled": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
