//! keel Model Library
//!
//! Pure data and algorithms shared by the control plane. Nothing here talks
//! to a store or the network.
//!
//! # Modules
//!
//! - `version`: `vMAJOR.MINOR.REVISION` parsing and the compatibility rule
//! - `addons`: addon route value encoding
//! - `plugin`, `route`, `status`: persisted records
//! - `openapi`: plugin callback request/response bodies
//! - `keyspace`: state store key layout
//!
//! # Example
//!
//! ```
//! use keel_model::version::is_compatible;
//!
//! assert!(is_compatible("v1.0.0", "v1.0.3").unwrap());
//! assert!(!is_compatible("v1.1.0", "v1.0.0").unwrap());
//! ```

pub mod addons;
pub mod error;
pub mod keyspace;
pub mod openapi;
pub mod plugin;
pub mod route;
pub mod status;
pub mod version;

pub use error::{ModelError, Result};
pub use keyspace::KeySpace;
pub use openapi::{
    AddonsIdentifyRequest, AddonsPoint, BriefPluginInfo, CommonResult, IdentifyResponse,
    ImplementedAddons, ImplementedPlugin, StatusResponse, TenantBindRequest,
};
pub use plugin::Plugin;
pub use route::PluginRoute;
pub use status::PluginStatus;
pub use version::{ComparisonLevel, Version};
