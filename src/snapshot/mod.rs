//! DOM snapshot capture and retention. Resolvers persist a
//! snapshot whenever a selector exhausts its strategies or drifts, so a
//! human (or a later automated diff) can see exactly what the page looked
//! like at failure time.

pub mod errors;
pub mod model;
pub mod store;

pub use errors::{SnapshotError, SnapshotResult};
pub use model::{DOMSnapshot, SnapshotMetadata, SnapshotType};
pub use store::{RetentionPolicy, SnapshotStore};
