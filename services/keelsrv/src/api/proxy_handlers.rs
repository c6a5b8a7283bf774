//! Gateway entry points
//!
//! Both handlers resolve the request against the route cache and hand the
//! resulting target to the configured forwarder.

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    response::Json,
};
use errors::KeelError;
use std::sync::Arc;
use tracing::debug;

use crate::app_state::AppState;

/// @route ANY /apis/{*path}
/// @route ANY /addons/{point}
/// @output Json<serde_json::Value> - forwarder response
pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, KeelError> {
    let target = state.dispatcher.resolve(uri.path(), &headers).await?;
    debug!("Forwarding to {}", target.destination);
    Ok(Json(state.forwarder.forward(target).await?))
}
