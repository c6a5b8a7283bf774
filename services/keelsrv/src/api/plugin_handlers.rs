//! Plugin lifecycle handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use common::SuccessResponse;
use errors::KeelError;
use std::sync::Arc;

use crate::api::dto::{PluginView, RegisterRequest, RegisterResponse};
use crate::app_state::AppState;

/// Register a plugin
///
/// @route POST /v1/plugins/{id}/register
/// @input Json<RegisterRequest> - optional secret
/// @output Json<SuccessResponse<RegisterResponse>> - new plugin and route
/// @side-effects Runs the registration saga against the plugin
pub async fn register_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<RegisterRequest>>,
) -> Result<Json<SuccessResponse<RegisterResponse>>, KeelError> {
    let secret = body.and_then(|Json(req)| req.secret);
    let entry = state.orchestrator.register(&id, secret).await?;
    Ok(Json(SuccessResponse::new(RegisterResponse {
        plugin: entry.plugin,
        route: entry.route,
    })))
}

/// Deregister a plugin
///
/// @route DELETE /v1/plugins/{id}
/// @output Json<SuccessResponse<PluginView>> - the removed plugin
/// @side-effects Removes plugin, route and addon registrations
pub async fn deregister_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<PluginView>>, KeelError> {
    let entry = state.orchestrator.deregister(&id).await?;
    Ok(Json(SuccessResponse::new(PluginView::new(
        entry.plugin,
        Some(entry.route),
    ))))
}

/// @route GET /v1/plugins
pub async fn list_plugins(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<Vec<PluginView>>>, KeelError> {
    let plugins = state.registry.list().await?;
    let mut views = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let route = state.routes.get(&plugin.id).await?;
        views.push(PluginView::new(plugin, route));
    }
    let total = views.len();
    Ok(Json(
        SuccessResponse::new(views).with_metadata("total", serde_json::Value::from(total)),
    ))
}

/// @route GET /v1/plugins/{id}
pub async fn get_plugin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse<PluginView>>, KeelError> {
    let plugin = state
        .registry
        .get(&id)
        .await?
        .ok_or_else(|| KeelError::PluginNotFound(id.clone()))?;
    let route = state.routes.get(&id).await?;
    Ok(Json(SuccessResponse::new(PluginView::new(plugin, route))))
}
