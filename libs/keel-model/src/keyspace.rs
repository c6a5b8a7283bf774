//! State store key naming
//!
//! All persisted keys are generated here so services and tests agree on the
//! layout. A prefix isolates environments sharing one backend.

use serde::{Deserialize, Serialize};

/// Key layout for the control plane
///
/// ```
/// use keel_model::KeySpace;
///
/// let keys = KeySpace::production();
/// assert_eq!(keys.plugin("core"), "plugin_core");
/// assert_eq!(keys.route("core"), "plugin_route_core");
///
/// let test = KeySpace::test();
/// assert_eq!(test.route("core"), "test:plugin_route_core");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySpace {
    /// Prepended to every key (e.g. "" or "test:")
    #[serde(default)]
    pub prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::production()
    }
}

impl KeySpace {
    pub fn production() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    /// Fully isolated keyspace for tests
    pub fn test() -> Self {
        Self::with_prefix("test:")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `plugin_<id>`
    pub fn plugin(&self, id: &str) -> String {
        format!("{}plugin_{}", self.prefix, id)
    }

    /// Prefix shared by plugin and route keys
    pub fn plugin_prefix(&self) -> String {
        format!("{}plugin_", self.prefix)
    }

    /// Plugin id of a registry key, `None` for route keys and foreign keys
    pub fn plugin_id<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(&self.prefix)?;
        if rest.starts_with(ROUTE_PREFIX) {
            return None;
        }
        rest.strip_prefix("plugin_")
    }

    /// `plugin_route_<id>`
    pub fn route(&self, id: &str) -> String {
        format!("{}{}{}", self.prefix, ROUTE_PREFIX, id)
    }

    /// Prefix under which every route key lives
    pub fn route_prefix(&self) -> String {
        format!("{}{}", self.prefix, ROUTE_PREFIX)
    }

    /// Strip the route prefix from a full route key
    pub fn route_id<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix)?.strip_prefix(ROUTE_PREFIX)
    }

    /// Membership index of registered plugins
    pub fn all_registered_plugin(&self) -> String {
        format!("{}all_registered_plugin", self.prefix)
    }

    /// TTL lock taken by the status reconciler
    pub fn scrape_lock(&self) -> String {
        format!("{}scrape_lock", self.prefix)
    }

    /// `tenant_bind_<tenant>`
    pub fn tenant_bind(&self, tenant_id: &str) -> String {
        format!("{}tenant_bind_{}", self.prefix, tenant_id)
    }
}

const ROUTE_PREFIX: &str = "plugin_route_";
