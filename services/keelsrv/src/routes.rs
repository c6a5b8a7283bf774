//! API Route Configuration
//!
//! Central route definition for all keelsrv endpoints

use axum::{
    routing::{any, delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

use crate::api::admin_handlers::{get_log_level, set_log_level};
use crate::api::health_handlers::health_check;
use crate::api::oauth_handlers::issue_token;
use crate::api::plugin_handlers::{deregister_plugin, get_plugin, list_plugins, register_plugin};
use crate::api::proxy_handlers::proxy_request;
use crate::api::tenant_handlers::{bind_tenant, list_tenants, unbind_tenant};

/// Create all API routes for keelsrv
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Plugin lifecycle
        .route("/v1/plugins", get(list_plugins))
        .route(
            "/v1/plugins/{id}",
            get(get_plugin).delete(deregister_plugin),
        )
        .route("/v1/plugins/{id}/register", post(register_plugin))
        // Tenant binding
        .route(
            "/v1/plugins/{id}/tenants",
            get(list_tenants).post(bind_tenant),
        )
        .route(
            "/v1/plugins/{id}/tenants/{tenant_id}",
            delete(unbind_tenant),
        )
        // Plugin tokens
        .route("/v1/oauth2/token", post(issue_token))
        // Runtime administration
        .route(
            "/v1/admin/logs/level",
            get(get_log_level).put(set_log_level),
        )
        // Gateway
        .route("/apis/{*path}", any(proxy_request))
        .route("/addons/{point}", any(proxy_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
