//! Filesystem-backed snapshot store.
//!
//! Grounded on `content_saver::compression::save_compressed_file`: an
//! atomic temp-file-then-`persist` write, optional gzip done on a
//! blocking thread pool under a timeout so a slow disk never stalls the
//! resolver that is waiting on the write. xxh3 is kept for the id
//! uniqueness it already gave `content_saver`'s etags, here feeding a
//! counter that disambiguates two snapshots landing in the same second.
//! Unlike `content_saver`, payloads are JSON (the whole [`DOMSnapshot`]
//! record), not arbitrary page bytes — there's no HTTP cache-control
//! story here, just "read this back by id later."

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use flate2::{Compression, GzBuilder};
use tempfile::NamedTempFile;
use tokio::time::timeout;

use crate::config::EngineConfig;
use crate::snapshot::errors::{SnapshotError, SnapshotResult};
use crate::snapshot::model::{DOMSnapshot, SnapshotMetadata, SnapshotType};

const BLOCKING_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Age/size-bounded retention: snapshots older than this are eligible for
/// cleanup regardless of type; past `max_count`, `Debug` snapshots are
/// evicted first (least valuable), then `Failure`, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_count: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
            max_count: 1_000,
        }
    }
}

pub struct SnapshotStore {
    dir: PathBuf,
    compress: bool,
    compression_threshold_bytes: usize,
    retention: RetentionPolicy,
    sequence: AtomicU64,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            dir: config.snapshot_dir().to_path_buf(),
            compress: config.compress_snapshots(),
            compression_threshold_bytes: config.compression_threshold_bytes(),
            retention: RetentionPolicy::default(),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn epoch_seconds() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Persists a new snapshot, returning the stored record (with its
    /// final id and byte size filled in).
    pub async fn persist(
        &self,
        selector_name: &str,
        kind: SnapshotType,
        url: &str,
        tab_context: Option<String>,
        dom_content: String,
        failure_reason: Option<String>,
        attempt: u32,
    ) -> SnapshotResult<DOMSnapshot> {
        let epoch = Self::epoch_seconds();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut id = DOMSnapshot::make_id(kind, selector_name, epoch);
        if seq > 0 {
            // Disambiguate same-second collisions without touching the
            // stable id format the common case produces.
            id = format!("{id}-{seq}");
        }

        let metadata = SnapshotMetadata {
            url: url.to_string(),
            tab_context,
            viewport: None,
            user_agent: None,
            attempt,
            failure_reason,
            perf_ms: None,
        };

        let byte_size = dom_content.len() as u64;
        let snapshot = DOMSnapshot {
            id: id.clone(),
            selector_name: selector_name.to_string(),
            kind,
            dom_content,
            metadata,
            created_at: chrono::Utc::now(),
            byte_size,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SnapshotError::CreateDir { path: self.dir.clone(), source })?;

        let payload = serde_json::to_vec(&snapshot)
            .map_err(|e| SnapshotError::Write { id: id.clone(), source: e.into() })?;
        let compress = self.compress || payload.len() >= self.compression_threshold_bytes;
        self.write_payload(&id, &payload, compress).await?;

        Ok(snapshot)
    }

    async fn write_payload(&self, id: &str, payload: &[u8], compress: bool) -> SnapshotResult<()> {
        let dir = self.dir.clone();
        let id_owned = id.to_string();
        let payload = payload.to_vec();

        let write_result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let path = if compress {
                dir.join(format!("{id_owned}.json.gz"))
            } else {
                dir.join(format!("{id_owned}.json"))
            };
            let temp_file = NamedTempFile::new_in(&dir)?;
            if compress {
                let mut gz = GzBuilder::new()
                    .filename(format!("{id_owned}.json"))
                    .write(temp_file, Compression::new(6));
                gz.write_all(&payload)?;
                let temp_file = gz.finish()?;
                temp_file.persist(&path)?;
            } else {
                let mut temp_file = temp_file;
                temp_file.write_all(&payload)?;
                temp_file.persist(&path)?;
            }
            Ok(())
        });

        match timeout(BLOCKING_IO_TIMEOUT, write_result).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(SnapshotError::Write { id: id.to_string(), source: e }),
            Ok(Err(e)) => Err(SnapshotError::Write { id: id.to_string(), source: anyhow::anyhow!("blocking write task panicked: {e}") }),
            Err(_) => Err(SnapshotError::WriteTimeout(BLOCKING_IO_TIMEOUT)),
        }
    }

    /// Reads a snapshot back by id, transparently trying the compressed
    /// path if the plain one isn't there.
    pub async fn get(&self, id: &str) -> SnapshotResult<DOMSnapshot> {
        let plain = self.dir.join(format!("{id}.json"));
        let gz = self.dir.join(format!("{id}.json.gz"));

        let bytes = if tokio::fs::try_exists(&plain).await.unwrap_or(false) {
            tokio::fs::read(&plain)
                .await
                .map_err(|e| SnapshotError::Read { id: id.to_string(), source: e.into() })?
        } else if tokio::fs::try_exists(&gz).await.unwrap_or(false) {
            let compressed = tokio::fs::read(&gz)
                .await
                .map_err(|e| SnapshotError::Read { id: id.to_string(), source: e.into() })?;
            Self::decompress(compressed).map_err(|e| SnapshotError::Read { id: id.to_string(), source: e })?
        } else {
            return Err(SnapshotError::NotFound(id.to_string()));
        };

        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Read { id: id.to_string(), source: e.into() })
    }

    fn decompress(bytes: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Lists every snapshot id currently on disk, newest first.
    pub async fn list(&self) -> SnapshotResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::Read { id: "<listing>".to_string(), source: e.into() }),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SnapshotError::Read { id: "<listing>".to_string(), source: e.into() })?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let stem = name.strip_suffix(".json.gz").or_else(|| name.strip_suffix(".json"));
            if let Some(stem) = stem {
                ids.push(stem.to_string());
            }
        }
        ids.sort_unstable();
        ids.reverse();
        Ok(ids)
    }

    /// Applies the retention policy: deletes snapshots past `max_age`,
    /// then if still over `max_count`, evicts `Debug` snapshots before
    /// `Failure`/other kinds, oldest first. Returns the number removed.
    pub async fn cleanup(&self) -> SnapshotResult<usize> {
        let ids = self.list().await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(snapshot) = self.get(&id).await {
                records.push(snapshot);
            }
        }

        let now = chrono::Utc::now();
        let max_age = chrono::Duration::from_std(self.retention.max_age).unwrap_or(chrono::Duration::zero());
        let mut to_delete: Vec<String> = Vec::new();
        let mut kept = Vec::new();
        for record in records {
            if now.signed_duration_since(record.created_at) > max_age {
                to_delete.push(record.id.clone());
            } else {
                kept.push(record);
            }
        }

        if kept.len() > self.retention.max_count {
            kept.sort_by(|a, b| {
                let rank = |s: &DOMSnapshot| matches!(s.kind, SnapshotType::Debug) as u8;
                rank(b).cmp(&rank(a)).then(a.created_at.cmp(&b.created_at))
            });
            let excess = kept.len() - self.retention.max_count;
            for record in kept.into_iter().take(excess) {
                to_delete.push(record.id);
            }
        }

        let removed = to_delete.len();
        for id in to_delete {
            let _ = tokio::fs::remove_file(self.dir.join(format!("{id}.json"))).await;
            let _ = tokio::fs::remove_file(self.dir.join(format!("{id}.json.gz"))).await;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    fn test_config(dir: PathBuf) -> EngineConfig {
        EngineConfig::builder().snapshot_dir(dir).build().unwrap()
    }

    #[tokio::test]
    async fn persists_and_reads_back_a_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(&test_config(tmp.path().to_path_buf()));
        let snapshot = store
            .persist("home_score", SnapshotType::Failure, "https://example.test", None, "<html></html>".into(), Some("All strategies failed".into()), 3)
            .await
            .unwrap();
        assert!(snapshot.id.starts_with("failure_home_score_"));
        tmp.child(format!("{}.json", snapshot.id)).assert(predicates::path::exists());

        let read_back = store.get(&snapshot.id).await.unwrap();
        assert_eq!(read_back.dom_content, "<html></html>");
        assert_eq!(read_back.metadata.attempt, 3);
    }

    #[tokio::test]
    async fn compression_round_trips() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::builder()
            .snapshot_dir(tmp.path().to_path_buf())
            .compress_snapshots(true)
            .build()
            .unwrap();
        let store = SnapshotStore::new(&config);
        let snapshot = store
            .persist("away_score", SnapshotType::Debug, "https://example.test", None, "<html>content</html>".into(), None, 1)
            .await
            .unwrap();
        tmp.child(format!("{}.json.gz", snapshot.id)).assert(predicates::path::exists());
        let read_back = store.get(&snapshot.id).await.unwrap();
        assert_eq!(read_back.dom_content, "<html>content</html>");
    }

    #[tokio::test]
    async fn cleanup_evicts_past_max_count() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(&test_config(tmp.path().to_path_buf())).with_retention(RetentionPolicy {
            max_age: Duration::from_secs(u64::MAX / 2),
            max_count: 2,
        });
        for i in 0..5 {
            store
                .persist(&format!("sel_{i}"), SnapshotType::Debug, "https://example.test", None, "<html></html>".into(), None, 1)
                .await
                .unwrap();
        }
        let removed = store.cleanup().await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
