//! keelsrv - plugin platform control plane
//!
//! # Components
//!
//! - `registry`, `route_table`: persisted plugin records and routes
//! - `orchestrator`: registration and deregistration sagas
//! - `tenant`, `token`: tenant binding and plugin tokens
//! - `route_cache`, `dispatcher`: gateway request resolution
//! - `reconcile`: periodic plugin status scraping
//! - `api`, `routes`: HTTP surface

pub mod api;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod plugin_client;
pub mod reconcile;
pub mod registry;
pub mod route_cache;
pub mod route_table;
pub mod routes;
pub mod saga;
pub mod tenant;
pub mod token;

pub use error::{KeelError, KeelResult};
