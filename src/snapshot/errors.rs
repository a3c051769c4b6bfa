//! Error type for the snapshot store.

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot {0} not found")]
    NotFound(String),

    #[error("failed to read snapshot {id}: {source}")]
    Read {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
