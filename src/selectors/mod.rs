//! Semantic selector subsystem: a named-element resolution engine that
//! tries a selector's declared strategies in priority order, validates and
//! scores whatever each strategy finds, and returns either an accepted
//! [`SelectorResult`] or a typed failure.
//!
//! Submodules map onto spec components J through N: [`strategies`] (J),
//! [`validation`] (L), [`scorer`] (K), [`registry`] (M), [`resolver`] (N).
//! [`model`] holds the data shared by all of them.

pub mod errors;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod scorer;
pub mod strategies;
pub mod validation;

pub use errors::{ResolverError, ResolverResult};
pub use model::{
    BoundingBox, DataTypeKind, DomRelationship, ElementInfo, SemanticKind, SemanticSelector,
    ShapeError, StrategyKind, StrategyPattern, TabContext, TabState, ValidationOutcome,
    ValidationRule,
};
pub use registry::{SelectorMetadata, SelectorRegistry};
pub use resolver::{ResolveContext, SelectorResolver};
pub use scorer::{ConfidenceScorer, ConfidenceWeights, Environment};
pub use strategies::Candidate;
pub use validation::ValidationEngine;

// `SelectorResult` lives in `model` but is re-exported at crate root via
// `lib.rs`'s `pub use selectors::{..., SelectorResult, ...}`.
pub use model::SelectorResult;
