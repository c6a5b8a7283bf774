//! keelsrv HTTP API handlers

pub mod admin_handlers;
pub mod dto;
pub mod health_handlers;
pub mod oauth_handlers;
pub mod plugin_handlers;
pub mod proxy_handlers;
pub mod tenant_handlers;
