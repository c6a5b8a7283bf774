//! Shared API models for keel services

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Standard API Response Models
// ============================================================================

/// Standard success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Success indicator (always true)
    #[serde(default = "bool_true")]
    pub success: bool,
    /// Response data
    pub data: T,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn bool_true() -> bool {
    true
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the response
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Service Health Models
// ============================================================================

/// Service health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Individual component checks
    #[serde(default)]
    pub checks: HashMap<String, ComponentHealth>,
}

/// Service status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Check duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl HealthStatus {
    /// Overall status is the worst of the component statuses
    pub fn from_checks(
        service: impl Into<String>,
        version: impl Into<String>,
        uptime_seconds: u64,
        checks: HashMap<String, ComponentHealth>,
    ) -> Self {
        let status = if checks
            .values()
            .any(|c| c.status == ServiceStatus::Unhealthy)
        {
            ServiceStatus::Unhealthy
        } else if checks.values().any(|c| c.status == ServiceStatus::Degraded) {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Healthy
        };

        Self {
            status,
            service: service.into(),
            version: version.into(),
            uptime_seconds,
            timestamp: chrono::Utc::now(),
            checks,
        }
    }
}

// ============================================================================
// Admin Models
// ============================================================================

/// Log level query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

/// Log level change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    pub level: String,
}
