//! Health Check API Handlers

use axum::{extract::State, response::Json};
use common::{ComponentHealth, HealthStatus, ServiceStatus, SuccessResponse};
use errors::KeelError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::app_state::AppState;

/// Health check endpoint
///
/// Probes the state store and reports the route cache size.
///
/// @route GET /health
/// @output Json<SuccessResponse<HealthStatus>> - Service health
/// @side-effects None (read-only operation)
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<HealthStatus>>, KeelError> {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let store = match state.membership.list().await {
        Ok(members) => ComponentHealth {
            status: ServiceStatus::Healthy,
            message: Some(format!("{} registered plugins", members.len())),
            duration_ms: Some(started.elapsed().as_millis() as u64),
        },
        Err(e) => ComponentHealth {
            status: ServiceStatus::Unhealthy,
            message: Some(e.to_string()),
            duration_ms: Some(started.elapsed().as_millis() as u64),
        },
    };
    checks.insert("state_store".to_string(), store);

    checks.insert(
        "route_cache".to_string(),
        ComponentHealth {
            status: ServiceStatus::Healthy,
            message: Some(format!("{} routes", state.route_cache.len())),
            duration_ms: None,
        },
    );

    Ok(Json(SuccessResponse::new(HealthStatus::from_checks(
        state.config.service.name.clone(),
        env!("CARGO_PKG_VERSION"),
        state.uptime_seconds(),
        checks,
    ))))
}
