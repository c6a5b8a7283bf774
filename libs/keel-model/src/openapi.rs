//! Plugin callback surface
//!
//! Every plugin serves these endpoints relative to its base URL. Responses
//! carry a `ret`/`msg` pair where `ret == 0` means success.

use crate::status::PluginStatus;
use serde::{Deserialize, Serialize};

pub const IDENTIFY_PATH: &str = "v1/identify";
pub const STATUS_PATH: &str = "v1/status";
pub const ADDONS_IDENTIFY_PATH: &str = "v1/addons/identify";
pub const TENANT_BIND_PATH: &str = "v1/tenant/bind";

/// Success return code
pub const RET_OK: i32 = 0;

/// Common `ret`/`msg` envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonResult {
    #[serde(default)]
    pub ret: i32,
    #[serde(default)]
    pub msg: String,
}

impl CommonResult {
    pub fn ok() -> Self {
        Self {
            ret: RET_OK,
            msg: "ok".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ret == RET_OK
    }
}

/// Extension point declared by a plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonsPoint {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
}

/// Plugin id and version pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefPluginInfo {
    pub id: String,
    #[serde(default)]
    pub version: String,
}

/// One addon point implemented against another plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementedAddons {
    pub addons_point: String,
    pub implemented_endpoint: String,
}

/// All addon points a plugin implements for one target plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementedPlugin {
    pub plugin: BriefPluginInfo,
    #[serde(default)]
    pub addons: Vec<ImplementedAddons>,
}

/// `GET v1/identify`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    #[serde(flatten)]
    pub res: CommonResult,
    pub plugin_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tkeel_version: String,
    #[serde(default)]
    pub addons_point: Vec<AddonsPoint>,
    #[serde(default)]
    pub implemented_plugin: Vec<ImplementedPlugin>,
    #[serde(default)]
    pub dependence: Vec<BriefPluginInfo>,
}

/// `GET v1/status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub res: CommonResult,
    pub status: PluginStatus,
}

/// `POST v1/addons/identify`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonsIdentifyRequest {
    pub plugin: BriefPluginInfo,
    pub implemented_addons: Vec<ImplementedAddons>,
}

/// `POST v1/tenant/bind`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBindRequest {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_identify_response_decodes_flat_envelope() {
        let raw = r#"{
            "ret": 0,
            "msg": "ok",
            "plugin_id": "ext",
            "version": "v0.1.0",
            "tkeel_version": "v1.0.0",
            "implemented_plugin": [
                {"plugin": {"id": "core", "version": "v1.0.0"},
                 "addons": [{"addons_point": "hook", "implemented_endpoint": "hook_impl"}]}
            ]
        }"#;
        let resp: IdentifyResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.res.is_ok());
        assert_eq!(resp.plugin_id, "ext");
        assert!(resp.addons_point.is_empty());
        assert_eq!(resp.implemented_plugin[0].addons[0].addons_point, "hook");
    }

    #[test]
    fn test_status_response() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"ret":0,"msg":"ok","status":"RUNNING"}"#).unwrap();
        assert_eq!(resp.status, PluginStatus::Running);

        let failed: CommonResult = serde_json::from_str(r#"{"ret":-1,"msg":"nope"}"#).unwrap();
        assert!(!failed.is_ok());
    }
}
