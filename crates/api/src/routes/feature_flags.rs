//! Feature flag endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{FlagScope, FlagView, UpdateFlagRequest};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::RequestContext;

const FLAG_ADMIN_ROLES: &[&str] = &["admin"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagQueryParams {
    #[serde(default)]
    pub scope: FlagScope,
    #[serde(default)]
    pub include_metadata: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsResponse<T> {
    pub data: T,
    pub scope: FlagScope,
    pub tenant_id: Option<String>,
}

/// Tenant whose layers a request reads or writes. Global scope ignores the
/// caller's tenant and is admin-only.
fn scoped_tenant(caller: &RequestContext, scope: FlagScope) -> Result<Option<String>, ApiError> {
    match scope {
        FlagScope::Global => {
            caller.require_role(FLAG_ADMIN_ROLES)?;
            Ok(None)
        }
        FlagScope::Tenant => Ok(caller.tenant_id.clone()),
    }
}

/// List every known flag.
///
/// GET /api/v1/feature-flags?scope=<global|tenant>&includeMetadata=<bool>
pub async fn list_flags(
    State(state): State<AppState>,
    caller: RequestContext,
    Query(params): Query<FlagQueryParams>,
) -> Result<Json<FlagsResponse<Vec<FlagView>>>, ApiError> {
    let tenant_id = scoped_tenant(&caller, params.scope)?;
    let context = caller.evaluation_context();

    let flags = state
        .flags
        .list_flags(tenant_id.as_deref(), &context, params.include_metadata)
        .await;

    Ok(Json(FlagsResponse {
        data: flags,
        scope: params.scope,
        tenant_id,
    }))
}

/// One flag.
///
/// GET /api/v1/feature-flags/:flag_key
pub async fn get_flag(
    State(state): State<AppState>,
    caller: RequestContext,
    Path(flag_key): Path<String>,
    Query(params): Query<FlagQueryParams>,
) -> Result<Json<FlagsResponse<FlagView>>, ApiError> {
    let tenant_id = scoped_tenant(&caller, params.scope)?;
    let context = caller.evaluation_context();

    let flag = state
        .flags
        .get_flag(
            &flag_key,
            tenant_id.as_deref(),
            &context,
            params.include_metadata,
        )
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Feature flag {} not found", flag_key)))?;

    Ok(Json(FlagsResponse {
        data: flag,
        scope: params.scope,
        tenant_id,
    }))
}

/// Replace a flag's override in one scope.
///
/// PUT /api/v1/feature-flags/:flag_key?scope=<global|tenant>
pub async fn update_flag(
    State(state): State<AppState>,
    caller: RequestContext,
    Path(flag_key): Path<String>,
    Query(params): Query<FlagQueryParams>,
    Json(request): Json<UpdateFlagRequest>,
) -> Result<Json<FlagsResponse<FlagView>>, ApiError> {
    caller.require_role(FLAG_ADMIN_ROLES)?;
    let tenant_id = caller.tenant_id.clone();

    let flag = state
        .flags
        .update_flag(
            &flag_key,
            request,
            params.scope,
            tenant_id.as_deref(),
            &caller.actor(),
        )
        .await?;

    info!(
        flag = %flag_key,
        scope = ?params.scope,
        tenant_id = ?tenant_id,
        user_id = ?caller.user_id,
        "Feature flag override saved"
    );

    Ok(Json(FlagsResponse {
        data: flag,
        scope: params.scope,
        tenant_id,
    }))
}

/// Drop a flag's override from one scope.
///
/// DELETE /api/v1/feature-flags/:flag_key?scope=<global|tenant>
pub async fn remove_override(
    State(state): State<AppState>,
    caller: RequestContext,
    Path(flag_key): Path<String>,
    Query(params): Query<FlagQueryParams>,
) -> Result<StatusCode, ApiError> {
    caller.require_role(FLAG_ADMIN_ROLES)?;

    state
        .flags
        .remove_override(&flag_key, params.scope, caller.tenant_id.as_deref())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
