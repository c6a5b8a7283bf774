//! Registered plugin record

use crate::error::{ModelError, Result};
use crate::openapi::{AddonsPoint, BriefPluginInfo, IdentifyResponse, ImplementedPlugin};
use serde::{Deserialize, Serialize};

/// Initial CAS token for a freshly created record
pub const INITIAL_VERSION: &str = "1";

/// Longest accepted plugin id
pub const MAX_ID_LEN: usize = 63;

/// Check a plugin id is a lowercase DNS label
///
/// Ids become part of store keys and URL paths, so `_` and `/` are rejected.
pub fn validate_id(id: &str) -> Result<()> {
    let bytes = id.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.len() <= MAX_ID_LEN
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first() != Some(&b'-')
        && bytes.last() != Some(&b'-');
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidId(id.to_string()))
    }
}

/// A plugin whose registration fully completed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    #[serde(default)]
    pub plugin_version: String,
    /// Platform version the plugin depends on
    #[serde(default)]
    pub tkeel_version: String,
    /// Extension points this plugin exposes
    #[serde(default)]
    pub addons_point: Vec<AddonsPoint>,
    /// Plugins this plugin extends and the addon points it implements on each
    #[serde(default)]
    pub implemented_plugin: Vec<ImplementedPlugin>,
    #[serde(default)]
    pub plugin_dependences: Vec<BriefPluginInfo>,
    #[serde(default)]
    pub secret: String,
    /// Unix seconds
    #[serde(default)]
    pub register_timestamp: i64,
    #[serde(default)]
    pub active_tenants: Vec<String>,
    /// CAS token
    #[serde(default)]
    pub version: String,
}

impl Plugin {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: INITIAL_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Build the registry record from an identify response
    pub fn from_identify(resp: &IdentifyResponse, secret: impl Into<String>) -> Self {
        Self {
            id: resp.plugin_id.clone(),
            plugin_version: resp.version.clone(),
            tkeel_version: resp.tkeel_version.clone(),
            addons_point: resp.addons_point.clone(),
            implemented_plugin: resp.implemented_plugin.clone(),
            plugin_dependences: resp.dependence.clone(),
            secret: secret.into(),
            register_timestamp: chrono::Utc::now().timestamp(),
            active_tenants: Vec::new(),
            version: INITIAL_VERSION.to_string(),
        }
    }

    /// Whether this plugin declares the named addon point
    pub fn declares_addon(&self, point: &str) -> bool {
        self.addons_point.iter().any(|p| p.name == point)
    }

    /// Ids of the plugins this plugin extends
    pub fn implemented_plugin_ids(&self) -> Vec<String> {
        self.implemented_plugin
            .iter()
            .map(|ip| ip.plugin.id.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::openapi::{CommonResult, ImplementedAddons};

    #[test]
    fn test_validate_id() {
        for ok in ["core", "iot-device", "p1"] {
            assert!(validate_id(ok).is_ok(), "{ok}");
        }
        let long = "x".repeat(64);
        for bad in ["", "Core", "route_x", "a/b", "-a", "a-", long.as_str()] {
            assert_eq!(validate_id(bad), Err(ModelError::InvalidId(bad.to_string())));
        }
    }

    #[test]
    fn test_from_identify() {
        let resp = IdentifyResponse {
            res: CommonResult::ok(),
            plugin_id: "ext".into(),
            version: "v0.2.0".into(),
            tkeel_version: "v1.0.0".into(),
            addons_point: vec![AddonsPoint {
                name: "ext_hook".into(),
                desc: String::new(),
            }],
            implemented_plugin: vec![ImplementedPlugin {
                plugin: BriefPluginInfo {
                    id: "core".into(),
                    version: "v1.0.0".into(),
                },
                addons: vec![ImplementedAddons {
                    addons_point: "hook".into(),
                    implemented_endpoint: "hook_impl".into(),
                }],
            }],
            dependence: vec![],
        };

        let plugin = Plugin::from_identify(&resp, "s3cret");
        assert_eq!(plugin.id, "ext");
        assert_eq!(plugin.version, INITIAL_VERSION);
        assert!(plugin.declares_addon("ext_hook"));
        assert!(!plugin.declares_addon("hook"));
        assert_eq!(plugin.implemented_plugin_ids(), vec!["core".to_string()]);
        assert!(plugin.register_timestamp > 0);
    }
}
