//! System startup, wiring and shutdown.

pub mod store_system;
pub mod telemetry;

pub use store_system::StoreSystem;
pub use telemetry::setup_tracing;
