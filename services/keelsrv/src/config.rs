//! keelsrv configuration
//!
//! Layering: built-in defaults, then `config/keelsrv.yaml` (or the file given
//! with `--config`), then `KEELSRV_*` environment variables. Nested keys use a
//! double underscore, e.g. `KEELSRV_API__PORT=6790`.

use errors::{KeelError, KeelResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use keel_model::{KeySpace, Version};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/keelsrv.yaml";
pub const ENV_PREFIX: &str = "KEELSRV_";

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Platform version every plugin's `tkeel_version` is checked against
    pub platform_version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "keelsrv".to_string(),
            platform_version: "v1.0.0".to_string(),
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6789,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Prepended to every persisted key
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn key_space(&self) -> KeySpace {
        KeySpace::with_prefix(self.key_prefix.clone())
    }
}

/// How plugin callbacks are reached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Base URL of a plugin; `{id}` is replaced by the plugin id
    pub base_url_template: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            base_url_template: "http://{id}:8080".to_string(),
            request_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Deadline for one whole registration or deregistration attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Upper bound of the random delay added to every tick
    #[serde(with = "humantime_serde")]
    pub max_jitter: Duration,
    /// Lifetime of the scrape lock
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_jitter: Duration::from_secs(30),
            lock_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteWatchConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RouteWatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Plugin token issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HS256 signing key
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-keelsrv-signing-key".to_string(),
            issuer: "keel".to_string(),
            audience: "keel".to_string(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Rolling file output directory; console only when unset
    pub dir: Option<PathBuf>,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json_file: true,
        }
    }
}

/// Complete keelsrv configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeelsrvConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub plugins: PluginsConfig,
    pub registration: RegistrationConfig,
    pub reconcile: ReconcileConfig,
    pub route_watch: RouteWatchConfig,
    pub token: TokenConfig,
    pub logging: LoggingConfig,
}

impl KeelsrvConfig {
    /// Load from the default file location plus the environment
    pub fn load() -> KeelResult<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load from `path` plus the environment
    ///
    /// A missing file is not an error: defaults and environment still apply.
    pub fn load_from(path: &Path) -> KeelResult<Self> {
        Self::figment(path)
            .extract()
            .map_err(|e| KeelError::Configuration(format!("Failed to load configuration: {}", e)))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(KeelsrvConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration integrity
    pub fn validate(&self) -> KeelResult<()> {
        if self.service.name.is_empty() {
            return Err(invalid("service.name", "cannot be empty"));
        }
        Version::parse(&self.service.platform_version)
            .map_err(|e| invalid("service.platform_version", &e.to_string()))?;

        if self.api.port == 0 {
            return Err(invalid("api.port", "must be non-zero"));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_empty() {
            return Err(invalid("store.redis_url", "required for the redis backend"));
        }
        if !self.plugins.base_url_template.contains("{id}") {
            return Err(invalid("plugins.base_url_template", "must contain {id}"));
        }

        let durations = [
            ("plugins.request_timeout", self.plugins.request_timeout),
            ("registration.timeout", self.registration.timeout),
            ("reconcile.interval", self.reconcile.interval),
            ("reconcile.lock_ttl", self.reconcile.lock_ttl),
            ("route_watch.interval", self.route_watch.interval),
            ("token.ttl", self.token.ttl),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(invalid(field, "must be non-zero"));
            }
        }

        if self.token.secret.len() < 16 {
            return Err(invalid("token.secret", "must be at least 16 bytes"));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn invalid(field: &str, reason: &str) -> KeelError {
    KeelError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
