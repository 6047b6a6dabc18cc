//! Feature gate middleware.
//!
//! Evaluates a feature flag for the caller and hides the wrapped routes
//! with a 404 when it is off.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::extractors::RequestContext;
use crate::services::FeatureFlagService;

/// Middleware state naming the flag that guards a group of routes.
#[derive(Clone)]
pub struct FeatureGate {
    flags: Arc<FeatureFlagService>,
    flag_key: Arc<str>,
}

impl FeatureGate {
    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }
}

/// Gate for `flag_key`, to be installed with
/// `axum::middleware::from_fn_with_state(gate, feature_gate)`.
pub fn require_feature(flags: Arc<FeatureFlagService>, flag_key: &str) -> FeatureGate {
    FeatureGate {
        flags,
        flag_key: Arc::from(flag_key),
    }
}

fn feature_disabled_response(flag_key: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "feature_disabled",
            "code": "FEATURE_DISABLED",
            "feature": flag_key
        })),
    )
        .into_response()
}

/// Runs the wrapped handler only when the gate's flag evaluates to true for
/// the caller's headers.
pub async fn feature_gate(
    State(gate): State<FeatureGate>,
    caller: RequestContext,
    req: Request<Body>,
    next: Next,
) -> Response {
    let context = caller.evaluation_context();
    if !gate.flags.evaluate(gate.flag_key(), &context).await {
        tracing::warn!(
            feature = gate.flag_key(),
            tenant_id = ?caller.tenant_id,
            user_id = ?caller.user_id,
            path = %req.uri().path(),
            "Feature gate blocked request"
        );
        return feature_disabled_response(gate.flag_key());
    }
    next.run(req).await
}
