//! Dynamic pricing endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use domain::models::{
    Channel, EntityId, PriceAdjustment, PriceEvaluation, PriceQuery, UpsertAdjustmentRequest,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::RequestContext;
use crate::services::ListAdjustmentsQuery;

/// Roles allowed to read and change adjustments.
const PRICING_ADMIN_ROLES: &[&str] = &["admin", "manager"];

/// Roles allowed to price products.
const PRICING_EVALUATE_ROLES: &[&str] = &["admin", "manager", "cashier"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAdjustmentsParams {
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub include_expired: bool,
}

#[derive(Debug, Serialize)]
pub struct AdjustmentsResponse {
    pub adjustments: Vec<PriceAdjustment>,
}

/// Body of a price evaluation. Tenant comes from the caller; branch falls
/// back to the caller's branch.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatePriceRequest {
    pub product_id: EntityId,
    #[serde(default)]
    pub category_id: Option<EntityId>,
    #[validate(custom(function = "shared::validation::validate_price"))]
    pub base_price: f64,
    #[serde(default)]
    pub branch_id: Option<EntityId>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

/// List adjustments visible to the caller's tenant.
///
/// GET /api/v1/pricing/adjustments?branchId=<id>&includeExpired=<bool>
pub async fn list_adjustments(
    State(state): State<AppState>,
    caller: RequestContext,
    Query(params): Query<ListAdjustmentsParams>,
) -> Result<Json<AdjustmentsResponse>, ApiError> {
    caller.require_role(PRICING_ADMIN_ROLES)?;

    let query = ListAdjustmentsQuery {
        tenant_id: caller.tenant_id.clone(),
        branch_id: params
            .branch_id
            .filter(|b| !b.trim().is_empty())
            .map(EntityId::from),
        include_expired: params.include_expired,
    };
    let adjustments = state.pricing.list_adjustments(&query).await;

    Ok(Json(AdjustmentsResponse { adjustments }))
}

/// Create an adjustment in the caller's tenant layer.
///
/// POST /api/v1/pricing/adjustments
pub async fn create_adjustment(
    State(state): State<AppState>,
    caller: RequestContext,
    Json(request): Json<UpsertAdjustmentRequest>,
) -> Result<(StatusCode, Json<AdjustmentsResponse>), ApiError> {
    caller.require_role(PRICING_ADMIN_ROLES)?;

    let adjustments = state
        .pricing
        .upsert_adjustment(caller.tenant_id.as_deref(), request, &caller.actor())
        .await?;

    info!(
        tenant_id = ?caller.tenant_id,
        user_id = ?caller.user_id,
        stored = adjustments.len(),
        "Price adjustment saved"
    );

    Ok((StatusCode::CREATED, Json(AdjustmentsResponse { adjustments })))
}

/// Update (or copy from base and update) one adjustment.
///
/// PUT /api/v1/pricing/adjustments/:adjustment_id
pub async fn update_adjustment(
    State(state): State<AppState>,
    caller: RequestContext,
    Path(adjustment_id): Path<String>,
    Json(mut request): Json<UpsertAdjustmentRequest>,
) -> Result<Json<AdjustmentsResponse>, ApiError> {
    caller.require_role(PRICING_ADMIN_ROLES)?;

    request.id = Some(adjustment_id);
    let adjustments = state
        .pricing
        .upsert_adjustment(caller.tenant_id.as_deref(), request, &caller.actor())
        .await?;

    Ok(Json(AdjustmentsResponse { adjustments }))
}

/// Archive one adjustment for the caller's tenant.
///
/// DELETE /api/v1/pricing/adjustments/:adjustment_id
pub async fn archive_adjustment(
    State(state): State<AppState>,
    caller: RequestContext,
    Path(adjustment_id): Path<String>,
) -> Result<(StatusCode, Json<AdjustmentsResponse>), ApiError> {
    caller.require_role(PRICING_ADMIN_ROLES)?;

    let adjustments = state
        .pricing
        .archive_adjustment(caller.tenant_id.as_deref(), &adjustment_id, &caller.actor())
        .await?;

    info!(
        adjustment_id = %adjustment_id,
        tenant_id = ?caller.tenant_id,
        user_id = ?caller.user_id,
        "Price adjustment archived"
    );

    Ok((StatusCode::ACCEPTED, Json(AdjustmentsResponse { adjustments })))
}

/// Price one product for the caller.
///
/// POST /api/v1/pricing/evaluate
pub async fn evaluate_price(
    State(state): State<AppState>,
    caller: RequestContext,
    Json(request): Json<EvaluatePriceRequest>,
) -> Result<Json<PriceEvaluation>, ApiError> {
    caller.require_role(PRICING_EVALUATE_ROLES)?;
    request.validate()?;

    let query = PriceQuery {
        tenant_id: caller.tenant_id.clone(),
        product_id: request.product_id,
        category_id: request.category_id,
        base_price: request.base_price,
        branch_id: request.branch_id.or(caller.branch_id),
        channel: request.channel.unwrap_or_default(),
        now: request.now,
    };

    Ok(Json(state.pricing.evaluate_price(&query).await))
}
