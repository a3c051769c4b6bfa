//! Engine configuration: one typed knob per subsystem, built through a
//! typestate builder so a missing required field is a compile error
//! rather than a runtime one.

pub mod builder;
pub mod types;

pub use builder::{EngineConfigBuilder, WithSnapshotDir};
pub use types::{BehaviorIntensity, EngineConfig, FingerprintConsistency, ProxyRotation};
