//! A gateway over independently owned account, catalog and order services.
//!
//! Nested queries are resolved with per-pass batch loaders, so each level of a
//! query costs one backend call per entity kind. Orders are created by an
//! orchestrator that validates against the account and catalog services and
//! commits exactly once.

pub mod actor_framework;
pub mod app_system;
pub mod batch;
pub mod clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod orchestrator;

#[cfg(test)]
mod mock_framework;

pub use app_system::{setup_tracing, StoreSystem};
pub use config::GatewayConfig;
pub use error::{OrderError, QueryError, ServiceError};
pub use gateway::{Gateway, Response};
