//! Unified error handling for keel control-plane services
//!
//! Every service maps its leaf errors (state store, model parsing, plugin
//! callbacks) into [`KeelError`] so that HTTP responses, logs and retry
//! decisions share one taxonomy.

use thiserror::Error;

// ============================================================================
// KeelError - Main error type
// ============================================================================

/// Main error type for the plugin control plane
#[derive(Debug, Error)]
pub enum KeelError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // State Store Errors
    // ======================================
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Version mismatch on {key}")]
    VersionMismatch { key: String },

    #[error("State store error: {0}")]
    InternalStore(String),

    // ======================================
    // Plugin Lifecycle Errors
    // ======================================
    #[error("Plugin already exists: {0}")]
    PluginAlreadyExists(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {0} has been depended on by other plugins")]
    DeletePluginHasBeenDepended(String),

    #[error("Tenant {tenant} is already bound to plugin {plugin}")]
    DuplicateActiveTenant { plugin: String, tenant: String },

    #[error("Malformed version: {0}")]
    MalformedVersion(String),

    #[error("Version incompatible: {dependency} does not accept {caller}")]
    VersionIncompatible { dependency: String, caller: String },

    #[error("Plugin callback failed: {plugin}: {message}")]
    PluginCallback { plugin: String, message: String },

    // ======================================
    // Routing Errors
    // ======================================
    #[error("Upstream not found: {0}")]
    UpstreamNotFound(String),

    #[error("Upstream not active: {plugin} ({status})")]
    UpstreamNotActive { plugin: String, status: String },

    #[error("Addons not implemented: {plugin}/{point}")]
    AddonsNotImplemented { plugin: String, point: String },

    // ======================================
    // API & Request Errors
    // ======================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Catch-all
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using KeelError
pub type KeelResult<T> = Result<T, KeelError>;

impl KeelError {
    /// Shorthand for a `NotFound` on the given resource
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidArgument(_) | Self::MalformedVersion(_) | Self::Serialization(_) => 400,

            // 401 Unauthorized
            Self::Unauthorized(_) => 401,

            // 403 Forbidden
            Self::Forbidden(_) | Self::VersionIncompatible { .. } => 403,

            // 404 Not Found
            Self::NotFound { .. }
            | Self::PluginNotFound(_)
            | Self::UpstreamNotFound(_)
            | Self::AddonsNotImplemented { .. } => 404,

            // 409 Conflict
            Self::AlreadyExists(_)
            | Self::VersionMismatch { .. }
            | Self::PluginAlreadyExists(_)
            | Self::DeletePluginHasBeenDepended(_)
            | Self::DuplicateActiveTenant { .. } => 409,

            // 500 Internal Server Error
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::InternalStore(_)
            | Self::Internal(_)
            | Self::Other(_) => 500,

            // 502 Bad Gateway
            Self::PluginCallback { .. } => 502,

            // 503 Service Unavailable
            Self::UpstreamNotActive { .. } => 503,

            // 504 Gateway Timeout
            Self::Timeout(_) => 504,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::InternalStore(_)
                | Self::VersionMismatch { .. }
                | Self::UpstreamNotActive { .. }
        )
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[macro_export]
macro_rules! invalid_argument {
    ($msg:expr) => {
        $crate::KeelError::InvalidArgument($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::KeelError::InvalidArgument(format!($fmt, $($arg)*))
    };
}

// ============================================================================
// KeelError implements KeelErrorTrait
// ============================================================================

impl KeelErrorTrait for KeelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",

            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::InternalStore(_) => "INTERNAL_STORE",

            Self::PluginAlreadyExists(_) => "PLUGIN_ALREADY_EXISTS",
            Self::PluginNotFound(_) => "PLUGIN_NOT_FOUND",
            Self::DeletePluginHasBeenDepended(_) => "DELETE_PLUGIN_HAS_BEEN_DEPENDED",
            Self::DuplicateActiveTenant { .. } => "DUPLICATE_ACTIVE_TENANT",
            Self::MalformedVersion(_) => "MALFORMED_VERSION",
            Self::VersionIncompatible { .. } => "VERSION_INCOMPATIBLE",
            Self::PluginCallback { .. } => "PLUGIN_CALLBACK_FAILED",

            Self::UpstreamNotFound(_) => "UPSTREAM_NOT_FOUND",
            Self::UpstreamNotActive { .. } => "UPSTREAM_NOT_ACTIVE",
            Self::AddonsNotImplemented { .. } => "ADDONS_NOT_IMPLEMENTED",

            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Timeout(_) => "TIMEOUT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",

            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::InternalStore(_) => ErrorCategory::Store,

            Self::NotFound { .. }
            | Self::PluginNotFound(_)
            | Self::UpstreamNotFound(_)
            | Self::AddonsNotImplemented { .. } => ErrorCategory::NotFound,

            Self::AlreadyExists(_)
            | Self::VersionMismatch { .. }
            | Self::PluginAlreadyExists(_)
            | Self::DeletePluginHasBeenDepended(_)
            | Self::DuplicateActiveTenant { .. } => ErrorCategory::Conflict,

            Self::InvalidArgument(_) | Self::MalformedVersion(_) | Self::Serialization(_) => {
                ErrorCategory::Validation
            },

            // Version policy rejections are permission-class, never retried
            Self::VersionIncompatible { .. } | Self::Unauthorized(_) | Self::Forbidden(_) => {
                ErrorCategory::Permission
            },

            Self::PluginCallback { .. } => ErrorCategory::Network,
            Self::UpstreamNotActive { .. } => ErrorCategory::Unavailable,
            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::Internal(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

// ============================================================================
// Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Store,
    Network,
    Timeout,

    // Business logic layer
    Validation,
    NotFound,
    Conflict,
    Permission,

    // Routing layer
    Unavailable,

    // System level
    Internal,
    Unknown,
}

/// Error capability trait
///
/// Service-local error types can implement this to share the HTTP mapping,
/// retry hints and log levels of [`KeelError`].
pub trait KeelErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for API and logs)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Store
                | ErrorCategory::Unavailable
        )
    }

    /// Convert to HTTP status code
    #[cfg(feature = "axum-support")]
    fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.category() {
            ErrorCategory::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Permission => StatusCode::FORBIDDEN,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCategory::Network => StatusCode::BAD_GATEWAY,
            ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert into an Axum HTTP response
    #[cfg(feature = "axum-support")]
    #[allow(clippy::disallowed_methods)] // json! macro internally uses unwrap (safe for known valid JSON)
    fn into_http_response(self) -> axum::response::Response
    where
        Self: Sized,
    {
        use axum::response::{IntoResponse, Json};
        use serde_json::json;

        match self.log_level() {
            tracing::Level::ERROR => tracing::error!("{} [{}]", self, self.error_code()),
            tracing::Level::WARN => tracing::warn!("{} [{}]", self, self.error_code()),
            _ => tracing::debug!("{} [{}]", self, self.error_code()),
        }

        (
            self.http_status(),
            Json(json!({
                "success": false,
                "error": {
                    "code": self.error_code(),
                    "message": self.to_string(),
                    "category": format!("{:?}", self.category()),
                    "retryable": self.is_retryable(),
                },
            })),
        )
            .into_response()
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Store => Level::ERROR,
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Unavailable => {
                Level::WARN
            },
            ErrorCategory::Validation | ErrorCategory::NotFound | ErrorCategory::Conflict => {
                Level::INFO
            },
            _ => Level::WARN,
        }
    }
}

#[cfg(feature = "axum-support")]
impl axum::response::IntoResponse for KeelError {
    fn into_response(self) -> axum::response::Response {
        // Trait method, not this impl
        KeelErrorTrait::into_http_response(self)
    }
}
