//! Tenant binding handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use common::SuccessResponse;
use errors::KeelError;
use keel_model::PluginRoute;
use std::sync::Arc;

use crate::api::dto::BindTenantRequest;
use crate::app_state::AppState;

/// Bind a tenant to a plugin
///
/// @route POST /v1/plugins/{id}/tenants
/// @input Json<BindTenantRequest>
/// @output Json<SuccessResponse<PluginRoute>> - route with the new tenant
/// @side-effects Calls the plugin's tenant-bind callback
pub async fn bind_tenant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<BindTenantRequest>,
) -> Result<Json<SuccessResponse<PluginRoute>>, KeelError> {
    let route = state.tenants.bind(&id, &req.tenant_id, req.extra).await?;
    Ok(Json(SuccessResponse::new(route)))
}

/// @route DELETE /v1/plugins/{id}/tenants/{tenant_id}
pub async fn unbind_tenant(
    State(state): State<Arc<AppState>>,
    Path((id, tenant_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse<PluginRoute>>, KeelError> {
    let route = state.tenants.unbind(&id, &tenant_id).await?;
    Ok(Json(SuccessResponse::new(route)))
}

/// @route GET /v1/plugins/{id}/tenants
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<Vec<String>>>, KeelError> {
    Ok(Json(SuccessResponse::new(state.tenants.list(&id).await?)))
}
