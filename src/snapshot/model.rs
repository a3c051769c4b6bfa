//! Data model for the snapshot store. Spec §3's `DOM
//! Snapshot` record plus the metadata bundle it carries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotType {
    Failure,
    Drift,
    Regression,
    Baseline,
    Debug,
}

impl SnapshotType {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::Drift => "drift",
            Self::Regression => "regression",
            Self::Baseline => "baseline",
            Self::Debug => "debug",
        }
    }
}

/// Context captured alongside the raw DOM at snapshot time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub url: String,
    pub tab_context: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub user_agent: Option<String>,
    pub attempt: u32,
    pub failure_reason: Option<String>,
    #[serde(with = "duration_millis_opt")]
    pub perf_ms: Option<u64>,
}

/// One immutable snapshot record. Content-addressed by `id`, which also
/// doubles as the on-disk filename stem (`<id>.json` or `<id>.json.gz`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DOMSnapshot {
    pub id: String,
    pub selector_name: String,
    #[serde(rename = "type")]
    pub kind: SnapshotType,
    pub dom_content: String,
    pub metadata: SnapshotMetadata,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub byte_size: u64,
}

impl DOMSnapshot {
    /// Spec §4.O id format: `<type>_<selector_name>_<epoch_seconds>`,
    /// e.g. `failure_home_score_1732564821`.
    #[must_use]
    pub fn make_id(kind: SnapshotType, selector_name: &str, epoch_seconds: u64) -> String {
        format!("{}_{}_{}", kind.label(), selector_name, epoch_seconds)
    }
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(ms) => s.serialize_some(ms),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<u64>::deserialize(d)
    }
}
