//! Request resolution for the plugin gateway
//!
//! Two path shapes are routed:
//!
//! - `/apis/{plugin_id}/{method...}`: direct call to a plugin
//! - `/addons/{point}`: indirect call through an addon point of the caller
//!
//! Internal callers identify themselves with `x-plugin-jwt: Bearer <jwt>`,
//! a token issued by [`TokenIssuer`] whose signature is checked before the
//! claimed plugin id is trusted. Requests without that header are external
//! flow and are checked by the configured `Authenticator` instead.

use crate::error::model_err;
use crate::route_cache::RouteCache;
use crate::token::TokenIssuer;
use async_trait::async_trait;
use axum::http::HeaderMap;
use errors::{invalid_argument, KeelError, KeelResult};
use keel_model::version::is_compatible;
use keel_model::{PluginRoute, PluginStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const PLUGIN_JWT_HEADER: &str = "x-plugin-jwt";
/// Header carrying the resolved caller to the destination
pub const SOURCE_PLUGIN_HEADER: &str = "x-keel-source-plugin";
pub const APIS_ROOT: &str = "/apis/";
pub const ADDONS_ROOT: &str = "/addons/";
/// Caller id of external flow
pub const GATEWAY_SOURCE: &str = "gateway";

/// Headers never copied onto the forward target
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPath<'a> {
    Apis { plugin_id: &'a str, method: &'a str },
    Addons { point: &'a str },
}

/// Split a gateway path into its route shape
pub fn parse_path(path: &str) -> KeelResult<RequestPath<'_>> {
    if let Some(rest) = path.strip_prefix(APIS_ROOT) {
        let (plugin_id, method) = rest.split_once('/').unwrap_or((rest, ""));
        if plugin_id.is_empty() {
            return Err(invalid_argument!("no plugin id in {}", path));
        }
        return Ok(RequestPath::Apis { plugin_id, method });
    }
    if let Some(point) = path.strip_prefix(ADDONS_ROOT) {
        if point.is_empty() || point.contains('/') {
            return Err(invalid_argument!("bad addons path {}", path));
        }
        return Ok(RequestPath::Addons { point });
    }
    Err(invalid_argument!("unroutable path {}", path))
}

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub destination: String,
    pub method: String,
    pub source: String,
    pub headers: BTreeMap<String, String>,
}

/// Authentication of external flow
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, path: &str, headers: &HeaderMap) -> KeelResult<()>;
}

/// Accepts every external request
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, _path: &str, _headers: &HeaderMap) -> KeelResult<()> {
        Ok(())
    }
}

/// Transport that carries a resolved request to its destination
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, target: ForwardTarget) -> KeelResult<serde_json::Value>;
}

/// Answers with the resolution itself
pub struct EchoForwarder;

#[async_trait]
impl Forwarder for EchoForwarder {
    async fn forward(&self, target: ForwardTarget) -> KeelResult<serde_json::Value> {
        Ok(serde_json::to_value(target)?)
    }
}

pub struct Dispatcher {
    cache: Arc<RouteCache>,
    tokens: Arc<TokenIssuer>,
    authenticator: Arc<dyn Authenticator>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<RouteCache>,
        tokens: Arc<TokenIssuer>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            cache,
            tokens,
            authenticator,
        }
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        &self.cache
    }

    /// Verified caller id from `x-plugin-jwt`, or `None` for external flow
    pub fn caller(&self, headers: &HeaderMap) -> KeelResult<Option<String>> {
        let Some(value) = headers.get(PLUGIN_JWT_HEADER) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|_| KeelError::Forbidden("x-plugin-jwt token invalid".to_string()))?;
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        let claims = self.tokens.verify(token).map_err(|e| {
            warn!("Rejected x-plugin-jwt: {}", e);
            KeelError::Forbidden("x-plugin-jwt token invalid".to_string())
        })?;
        if claims.plugin_id.is_empty() {
            return Err(KeelError::Forbidden("x-plugin-jwt carries no plugin id".to_string()));
        }
        Ok(Some(claims.plugin_id))
    }

    /// Resolve a gateway request into a forward target
    pub async fn resolve(&self, path: &str, headers: &HeaderMap) -> KeelResult<ForwardTarget> {
        let caller = self.caller(headers)?;
        let request = parse_path(path)?;

        let source = match &caller {
            Some(id) => id.clone(),
            None => {
                if matches!(request, RequestPath::Addons { .. }) {
                    return Err(KeelError::Unauthorized(
                        "addons calls require an internal caller".to_string(),
                    ));
                }
                self.authenticator.authenticate(path, headers).await?;
                GATEWAY_SOURCE.to_string()
            },
        };

        let (destination, method) = match request {
            RequestPath::Apis { plugin_id, method } => (plugin_id.to_string(), method.to_string()),
            RequestPath::Addons { point } => {
                let route = self
                    .cache
                    .get(&source)
                    .ok_or_else(|| KeelError::UpstreamNotFound(source.clone()))?;
                let (plugin_id, endpoint) =
                    route
                        .resolve_addon(point)
                        .ok_or_else(|| KeelError::AddonsNotImplemented {
                            plugin: source.clone(),
                            point: point.to_string(),
                        })?;
                (plugin_id.to_string(), endpoint.to_string())
            },
        };

        let dst = self
            .cache
            .get(&destination)
            .ok_or_else(|| KeelError::UpstreamNotFound(destination.clone()))?;
        check_active(&dst, &source)?;

        if source != GATEWAY_SOURCE {
            let src = self.cache.get(&source).ok_or_else(|| {
                KeelError::Forbidden(format!("caller plugin {} is not registered", source))
            })?;
            if !is_compatible(&dst.tkeel_version, &src.tkeel_version).map_err(model_err)? {
                return Err(KeelError::Forbidden(format!(
                    "{} requires {}, caller {} is at {}",
                    destination, dst.tkeel_version, source, src.tkeel_version
                )));
            }
        }

        debug!("Resolved {} -> {}/{} (from {})", path, destination, method, source);
        Ok(ForwardTarget {
            headers: forward_headers(headers, &source),
            destination,
            method,
            source,
        })
    }
}

/// RUNNING and STARTING accept everyone; UNREGISTER still serves the plugins
/// it extends
fn check_active(dst: &PluginRoute, source: &str) -> KeelResult<()> {
    if dst.status.accepts_traffic() {
        return Ok(());
    }
    if dst.status == PluginStatus::Unregister
        && dst.implemented_plugin_ids.iter().any(|id| id == source)
    {
        return Ok(());
    }
    Err(KeelError::UpstreamNotActive {
        plugin: dst.id.clone(),
        status: dst.status.to_string(),
    })
}

fn forward_headers(headers: &HeaderMap, source: &str) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    out.insert(SOURCE_PLUGIN_HEADER.to_string(), source.to_string());
    out
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path("/apis/core/v1/devices/1").unwrap(),
            RequestPath::Apis {
                plugin_id: "core",
                method: "v1/devices/1"
            }
        );
        assert_eq!(
            parse_path("/apis/core").unwrap(),
            RequestPath::Apis {
                plugin_id: "core",
                method: ""
            }
        );
        assert_eq!(
            parse_path("/addons/hook").unwrap(),
            RequestPath::Addons { point: "hook" }
        );
        assert!(parse_path("/apis/").is_err());
        assert!(parse_path("/addons/a/b").is_err());
        assert!(parse_path("/other").is_err());
    }

    #[test]
    fn test_check_active() {
        let mut route = PluginRoute::starting("core", "v1.0.0");
        assert!(check_active(&route, "x").is_ok());

        route.status = PluginStatus::Stopped;
        assert!(matches!(
            check_active(&route, "x"),
            Err(KeelError::UpstreamNotActive { .. })
        ));

        route.status = PluginStatus::Unregister;
        route.implemented_plugin_ids = vec!["base".into()];
        assert!(check_active(&route, "base").is_ok());
        assert!(check_active(&route, "other").is_err());
    }

    #[test]
    fn test_forward_headers_drop_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "gw".parse().unwrap());
        headers.insert("x-trace", "t1".parse().unwrap());
        let out = forward_headers(&headers, "gateway");
        assert_eq!(out.get("x-trace").map(String::as_str), Some("t1"));
        assert!(!out.contains_key("host"));
        assert_eq!(out[SOURCE_PLUGIN_HEADER], "gateway");
    }
}
