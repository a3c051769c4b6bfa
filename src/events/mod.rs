//! Event bus: publish/subscribe for every state change the
//! other subsystems produce, with metrics, filtering, and batching.

// Sub-modules
pub mod bus;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod streaming;
pub mod types;

// Re-exports for public API
pub use bus::EventBus;
pub use config::EventBusConfig;
pub use errors::EventBusError;
pub use metrics::EventBusMetrics;
pub use streaming::FilteredReceiver;
pub use types::{BatchPublishResult, EngineEvent, ShutdownReason};
