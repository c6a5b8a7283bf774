//! Request and response bodies of the control-plane API

use keel_model::{Plugin, PluginRoute};
use serde::{Deserialize, Serialize};

/// `POST /v1/plugins/{id}/register`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Generated when omitted
    #[serde(default)]
    pub secret: Option<String>,
}

/// `POST /v1/plugins/{id}/tenants`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindTenantRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

/// `POST /v1/oauth2/token` form body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// A registered plugin together with its route
///
/// The secret is never returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginView {
    pub plugin: Plugin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<PluginRoute>,
}

impl PluginView {
    pub fn new(mut plugin: Plugin, route: Option<PluginRoute>) -> Self {
        plugin.secret.clear();
        Self { plugin, route }
    }
}

/// Response of a successful registration: the secret is shown once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub plugin: Plugin,
    pub route: PluginRoute,
}
