//! Plugin callback client
//!
//! The control plane calls back into plugins during registration, status
//! reconciliation and tenant binding. `HttpPluginClient` reaches them over
//! HTTP; `NullPluginClient` answers locally and is used where no plugin
//! network is available.

use async_trait::async_trait;
use errors::{KeelError, KeelResult};
use keel_model::openapi::{
    ADDONS_IDENTIFY_PATH, IDENTIFY_PATH, STATUS_PATH, TENANT_BIND_PATH,
};
use keel_model::{
    AddonsIdentifyRequest, CommonResult, IdentifyResponse, PluginStatus, StatusResponse,
    TenantBindRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait PluginClient: Send + Sync {
    /// `GET v1/identify`
    async fn identify(&self, plugin_id: &str) -> KeelResult<IdentifyResponse>;

    /// `GET v1/status`
    async fn status(&self, plugin_id: &str) -> KeelResult<StatusResponse>;

    /// `POST v1/addons/identify` on the extended plugin
    async fn addons_identify(
        &self,
        plugin_id: &str,
        req: &AddonsIdentifyRequest,
    ) -> KeelResult<CommonResult>;

    /// `POST v1/tenant/bind`
    async fn tenant_bind(&self, plugin_id: &str, req: &TenantBindRequest)
        -> KeelResult<CommonResult>;
}

/// Fail with `PluginCallback` unless the plugin answered `ret == 0`
pub fn ensure_ok(plugin_id: &str, step: &str, res: &CommonResult) -> KeelResult<()> {
    if res.is_ok() {
        Ok(())
    } else {
        Err(KeelError::PluginCallback {
            plugin: plugin_id.to_string(),
            message: format!("{} returned {}: {}", step, res.ret, res.msg),
        })
    }
}

/// reqwest client addressing plugins through a URL template
pub struct HttpPluginClient {
    http: reqwest::Client,
    base_url_template: String,
}

impl HttpPluginClient {
    pub fn new(base_url_template: impl Into<String>, timeout: Duration) -> KeelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeelError::Configuration(format!("plugin http client: {}", e)))?;
        Ok(Self {
            http,
            base_url_template: base_url_template.into(),
        })
    }

    /// Full URL of `path` on `plugin_id`
    pub fn url(&self, plugin_id: &str, path: &str) -> String {
        let base = self.base_url_template.replace("{id}", plugin_id);
        format!("{}/{}", base.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, plugin_id: &str, path: &str) -> KeelResult<T> {
        let url = self.url(plugin_id, path);
        debug!("GET {}", url);
        let resp = self.http.get(&url).send().await.map_err(|e| callback_err(plugin_id, path, e))?;
        decode(plugin_id, path, resp).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        plugin_id: &str,
        path: &str,
        body: &B,
    ) -> KeelResult<T> {
        let url = self.url(plugin_id, path);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| callback_err(plugin_id, path, e))?;
        decode(plugin_id, path, resp).await
    }
}

fn callback_err(plugin_id: &str, path: &str, err: reqwest::Error) -> KeelError {
    if err.is_timeout() {
        KeelError::Timeout(format!("plugin {} {}", plugin_id, path))
    } else {
        KeelError::PluginCallback {
            plugin: plugin_id.to_string(),
            message: format!("{}: {}", path, err),
        }
    }
}

async fn decode<T: DeserializeOwned>(
    plugin_id: &str,
    path: &str,
    resp: reqwest::Response,
) -> KeelResult<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(KeelError::PluginCallback {
            plugin: plugin_id.to_string(),
            message: format!("{} answered HTTP {}", path, status),
        });
    }
    resp.json::<T>().await.map_err(|e| KeelError::PluginCallback {
        plugin: plugin_id.to_string(),
        message: format!("{} body: {}", path, e),
    })
}

#[async_trait]
impl PluginClient for HttpPluginClient {
    async fn identify(&self, plugin_id: &str) -> KeelResult<IdentifyResponse> {
        self.get_json(plugin_id, IDENTIFY_PATH).await
    }

    async fn status(&self, plugin_id: &str) -> KeelResult<StatusResponse> {
        self.get_json(plugin_id, STATUS_PATH).await
    }

    async fn addons_identify(
        &self,
        plugin_id: &str,
        req: &AddonsIdentifyRequest,
    ) -> KeelResult<CommonResult> {
        self.post_json(plugin_id, ADDONS_IDENTIFY_PATH, req).await
    }

    async fn tenant_bind(
        &self,
        plugin_id: &str,
        req: &TenantBindRequest,
    ) -> KeelResult<CommonResult> {
        self.post_json(plugin_id, TENANT_BIND_PATH, req).await
    }
}

/// Plugin client that accepts everything
///
/// Identify answers with the requested id at the configured platform version
/// and no addons; status is always RUNNING.
pub struct NullPluginClient {
    platform_version: String,
}

impl NullPluginClient {
    pub fn new(platform_version: impl Into<String>) -> Self {
        Self {
            platform_version: platform_version.into(),
        }
    }
}

#[async_trait]
impl PluginClient for NullPluginClient {
    async fn identify(&self, plugin_id: &str) -> KeelResult<IdentifyResponse> {
        Ok(IdentifyResponse {
            res: CommonResult::ok(),
            plugin_id: plugin_id.to_string(),
            version: "v0.0.0".to_string(),
            tkeel_version: self.platform_version.clone(),
            ..Default::default()
        })
    }

    async fn status(&self, _plugin_id: &str) -> KeelResult<StatusResponse> {
        Ok(StatusResponse {
            res: CommonResult::ok(),
            status: PluginStatus::Running,
        })
    }

    async fn addons_identify(
        &self,
        _plugin_id: &str,
        _req: &AddonsIdentifyRequest,
    ) -> KeelResult<CommonResult> {
        Ok(CommonResult::ok())
    }

    async fn tenant_bind(
        &self,
        _plugin_id: &str,
        _req: &TenantBindRequest,
    ) -> KeelResult<CommonResult> {
        Ok(CommonResult::ok())
    }
}
