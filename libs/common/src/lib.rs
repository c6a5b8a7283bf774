//! keel basic library
//!
//! Provides basic functions shared by keel services, including:
//! - Redis client with connection pooling
//! - logging initialization and runtime level changes
//! - graceful shutdown handling
//! - shared API response types

#[cfg(feature = "redis")]
pub mod redis;

pub mod api_types;
pub mod logging;
pub mod shutdown;

pub use api_types::{
    ComponentHealth, HealthStatus, LogLevelResponse, ServiceStatus, SetLogLevelRequest,
    SuccessResponse,
};
