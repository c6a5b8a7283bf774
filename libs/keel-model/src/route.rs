//! Plugin route record
//!
//! A route exists from the first registration step onwards and is what the
//! dispatcher resolves requests against.

use crate::addons;
use crate::openapi::ImplementedAddons;
use crate::plugin::INITIAL_VERSION;
use crate::status::PluginStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRoute {
    /// Same as the plugin id
    pub id: String,
    pub status: PluginStatus,
    #[serde(default)]
    pub tkeel_version: String,
    /// Addon point name -> `"<pluginID>/<endpoint>"`
    #[serde(default)]
    pub registered_addons: HashMap<String, String>,
    /// Plugins this route's owner extends
    #[serde(default)]
    pub implemented_plugin_ids: Vec<String>,
    #[serde(default)]
    pub active_tenants: Vec<String>,
    /// CAS token
    #[serde(default)]
    pub version: String,
}

impl PluginRoute {
    /// Transient route created at the start of registration
    pub fn starting(id: impl Into<String>, tkeel_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: PluginStatus::Starting,
            tkeel_version: tkeel_version.into(),
            version: INITIAL_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Point each implemented addon at `implementer`
    pub fn register_addons(&mut self, implementer: &str, implemented: &[ImplementedAddons]) {
        for addon in implemented {
            self.registered_addons.insert(
                addon.addons_point.clone(),
                addons::encode(implementer, &addon.implemented_endpoint),
            );
        }
    }

    /// Drop every addon point that resolves to `implementer`
    ///
    /// Returns how many entries were removed.
    pub fn remove_addons_of(&mut self, implementer: &str) -> usize {
        let before = self.registered_addons.len();
        self.registered_addons
            .retain(|_, value| addons::decode(value).map(|(p, _)| p) != Some(implementer));
        before - self.registered_addons.len()
    }

    /// Resolve an addon point to `(plugin_id, endpoint)`
    pub fn resolve_addon(&self, point: &str) -> Option<(&str, &str)> {
        self.registered_addons
            .get(point)
            .and_then(|value| addons::decode(value))
    }

    /// Whether some other plugin currently implements an addon of this one
    pub fn is_depended_on(&self) -> bool {
        !self.registered_addons.is_empty()
    }

    pub fn has_tenant(&self, tenant_id: &str) -> bool {
        self.active_tenants.iter().any(|t| t == tenant_id)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn addon(point: &str, endpoint: &str) -> ImplementedAddons {
        ImplementedAddons {
            addons_point: point.into(),
            implemented_endpoint: endpoint.into(),
        }
    }

    #[test]
    fn test_starting_route() {
        let route = PluginRoute::starting("core", "v1.0.0");
        assert_eq!(route.status, PluginStatus::Starting);
        assert_eq!(route.version, "1");
        assert!(!route.is_depended_on());
    }

    #[test]
    fn test_register_and_remove_addons() {
        let mut route = PluginRoute::starting("core", "v1.0.0");
        route.register_addons("ext", &[addon("hook", "hook_impl"), addon("audit", "a/b")]);
        route.register_addons("other", &[addon("menu", "menu")]);

        assert_eq!(route.resolve_addon("audit"), Some(("ext", "a/b")));
        assert_eq!(route.resolve_addon("missing"), None);
        assert!(route.is_depended_on());

        assert_eq!(route.remove_addons_of("ext"), 2);
        assert_eq!(route.registered_addons.len(), 1);
        assert_eq!(route.resolve_addon("menu"), Some(("other", "menu")));
    }
}
