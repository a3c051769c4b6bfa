//! Semantic selector resolution and stealth scraping engine.
//!
//! Three cooperating subsystems:
//!
//! - [`selectors`]: maps semantic names (`"home_team_score"`) to live DOM
//!   elements via a multi-strategy resolver with confidence scoring.
//! - [`resilience`]: classifies failures, recovers crashed browser
//!   contexts, degrades gracefully under sustained failure, and can abort
//!   a run outright under policy.
//! - [`stealth`]: assembles fingerprint, proxy, behavior emulation and
//!   anti-detection masking into a single pre-navigation setup.
//!
//! [`driver`] defines the narrow browser-automation trait these subsystems
//! are built against, with a concrete `chromiumoxide`-backed implementation
//! and an in-memory fake for tests.

pub mod config;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod events;
pub mod resilience;
pub mod selectors;
pub mod snapshot;
pub mod stealth;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use correlation::CorrelationId;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus, EventBusConfig};
pub use selectors::{
    ConfidenceScorer, ElementInfo, SelectorRegistry, SelectorResolver, SelectorResult,
    SemanticSelector, StrategyPattern, ValidationEngine, ValidationRule,
};
