//! Checkpoint sidecar files
//!
//! A checkpoint lists the byte ranges of a file that are not yet known to be
//! on the destination, plus enough metadata to resume without re-deriving
//! size or progress. It lives next to the destination as
//! `<source file name>._chunks_`.

use chrono::{DateTime, Utc};
use resumecp_types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Version of the checkpoint record layout
pub const CHECKPOINT_VERSION: u32 = 1;

/// One outstanding range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    /// Offset of the range
    pub position: u64,
    /// Length of the range
    pub chunk_size: u32,
}

/// Persisted progress of one copy job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Layout version
    pub version: u32,
    /// Source path as given when the job was opened
    pub source: PathBuf,
    /// Destination file path
    pub destination: PathBuf,
    /// Source size when the job was created
    pub size: u64,
    /// First offset not covered by any chunk
    pub next_chunk_position: u64,
    /// Bytes known to be on the destination
    pub bytes_copied: u64,
    /// Chunk size hint in effect when saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_hint: Option<u32>,
    /// When the checkpoint was written
    pub saved_at: DateTime<Utc>,
    /// Outstanding ranges in ascending offset order
    pub chunks: Vec<ChunkRecord>,
}

impl Checkpoint {
    /// Check the record against itself and against the current source size
    pub fn validate(&self, source_size: u64) -> std::result::Result<(), String> {
        if self.version != CHECKPOINT_VERSION {
            return Err(format!("unsupported checkpoint version {}", self.version));
        }
        if self.size != source_size {
            return Err(format!(
                "recorded size {} does not match source size {}",
                self.size, source_size
            ));
        }
        if self.bytes_copied > self.size || self.next_chunk_position > self.size {
            return Err("progress lies beyond the end of the file".to_string());
        }

        let mut pending: u64 = 0;
        let mut previous_end = 0;
        for chunk in &self.chunks {
            if chunk.chunk_size == 0 {
                return Err(format!("empty chunk at {}", chunk.position));
            }
            if chunk.position < previous_end {
                return Err(format!("chunk at {} overlaps its predecessor", chunk.position));
            }
            if chunk.position >= self.size {
                return Err(format!("chunk at {} starts past the end of the file", chunk.position));
            }
            let end = chunk
                .position
                .checked_add(u64::from(chunk.chunk_size))
                .filter(|end| *end <= self.next_chunk_position)
                .ok_or_else(|| {
                    format!(
                        "chunk at {} ends past next chunk position {}",
                        chunk.position, self.next_chunk_position
                    )
                })?;
            pending = pending
                .checked_add(u64::from(chunk.chunk_size))
                .ok_or_else(|| "outstanding chunks overflow".to_string())?;
            previous_end = end;
        }

        let accounted = self
            .bytes_copied
            .checked_add(pending)
            .and_then(|sum| sum.checked_add(self.size - self.next_chunk_position))
            .ok_or_else(|| "chunks overflow the file size".to_string())?;
        if accounted != self.size {
            return Err(format!(
                "chunks account for {} bytes of {}",
                accounted, self.size
            ));
        }

        Ok(())
    }
}

/// Reads and writes checkpoints in one destination directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    suffix: String,
}

impl CheckpointStore {
    /// Store for checkpoints in `dir` named `<source file name><suffix>`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, suffix: S) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
        }
    }

    /// Checkpoint path for a source file
    pub fn path_for(&self, source: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(&self.suffix);
        self.dir.join(name)
    }

    /// Whether a checkpoint file exists for `source`, valid or not
    pub async fn exists(&self, source: &Path) -> bool {
        tokio::fs::try_exists(self.path_for(source))
            .await
            .unwrap_or(false)
    }

    /// Load and consume the checkpoint for `source`.
    ///
    /// Unreadable or inconsistent checkpoints yield `None` and stay on disk.
    /// A checkpoint that loads cleanly is deleted before it is returned.
    pub async fn load(&self, source: &Path, source_size: u64) -> Option<Checkpoint> {
        let path = self.path_for(source);

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read checkpoint, restarting from the beginning");
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_slice(&content) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse checkpoint, restarting from the beginning");
                return None;
            }
        };

        if let Err(reason) = checkpoint.validate(source_size) {
            warn!(path = %path.display(), %reason, "Discarding inconsistent checkpoint, restarting from the beginning");
            return None;
        }

        for chunk in &checkpoint.chunks {
            debug!(position = chunk.position, size = chunk.chunk_size, "Chunk info loaded");
        }

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete loaded checkpoint");
        }

        Some(checkpoint)
    }

    /// Write a checkpoint atomically: temp file, sync, rename over the old one
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.source);
        let mut temp_name = path.clone().into_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let content = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| Error::checkpoint(format!("Failed to serialize checkpoint: {}", e)))?;

        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, &path).await?;
            Ok::<(), io::Error>(())
        };

        write.await.map_err(|e| {
            Error::checkpoint(format!(
                "Failed to write checkpoint '{}': {}",
                path.display(),
                e
            ))
        })?;

        debug!(
            path = %path.display(),
            chunks = checkpoint.chunks.len(),
            bytes_copied = checkpoint.bytes_copied,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Delete the checkpoint for `source`; a missing file is not an error
    pub async fn remove(&self, source: &Path) -> Result<()> {
        let path = self.path_for(source);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::checkpoint(format!(
                "Failed to remove checkpoint '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn checkpoint(size: u64, next: u64, copied: u64, chunks: &[(u64, u32)]) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            source: PathBuf::from("/data/big.bin"),
            destination: PathBuf::from("/backup/big.bin"),
            size,
            next_chunk_position: next,
            bytes_copied: copied,
            chunk_size_hint: Some(65536),
            saved_at: Utc::now(),
            chunks: chunks
                .iter()
                .map(|&(position, chunk_size)| ChunkRecord {
                    position,
                    chunk_size,
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_checkpoint() {
        let cp = checkpoint(300_000, 196_608, 65_536, &[(65_536, 65_536), (131_072, 65_536)]);
        assert!(cp.validate(300_000).is_ok());
    }

    #[test]
    fn test_rejects_overlap() {
        let cp = checkpoint(300_000, 196_608, 65_536, &[(65_536, 70_000), (131_072, 61_072)]);
        assert!(cp.validate(300_000).is_err());
    }

    #[test]
    fn test_rejects_chunk_past_next_position() {
        let cp = checkpoint(300_000, 131_072, 0, &[(0, 65_536), (65_536, 65_537)]);
        assert!(cp.validate(300_000).is_err());
    }

    #[test]
    fn test_rejects_broken_partition() {
        // bytes_copied claims more than the gap between the chunks allows
        let cp = checkpoint(300_000, 196_608, 100_000, &[(65_536, 65_536), (131_072, 65_536)]);
        assert!(cp.validate(300_000).is_err());
    }

    #[test]
    fn test_rejects_chunk_at_end_of_address_space() {
        let cp = checkpoint(10, 10, 9, &[(u64::MAX, 1)]);
        assert!(cp.validate(10).is_err());
    }

    #[test]
    fn test_rejects_chunk_starting_past_end() {
        let cp = checkpoint(10, 10, 9, &[(10, 1)]);
        assert!(cp.validate(10).is_err());
    }

    #[tokio::test]
    async fn test_overflowing_record_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "._chunks_");
        let source = Path::new("/data/big.bin");
        let json = format!(
            r#"{{"version":{},"source":"/data/big.bin","destination":"/backup/big.bin","size":10,"nextChunkPosition":10,"bytesCopied":9,"savedAt":"2024-01-01T00:00:00Z","chunks":[{{"position":18446744073709551615,"chunkSize":1}}]}}"#,
            CHECKPOINT_VERSION
        );
        tokio::fs::write(store.path_for(source), json).await.unwrap();

        assert!(store.load(source, 10).await.is_none());
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let cp = checkpoint(300_000, 196_608, 65_536, &[(65_536, 65_536), (131_072, 65_536)]);
        assert!(cp.validate(299_999).is_err());
    }

    #[test]
    fn test_wire_format_field_names() {
        let cp = checkpoint(8192, 8192, 4096, &[(4096, 4096)]);
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["nextChunkPosition"], 8192);
        assert_eq!(json["bytesCopied"], 4096);
        assert_eq!(json["chunkSizeHint"], 65536);
        assert_eq!(json["chunks"][0]["chunkSize"], 4096);
        assert!(json["savedAt"].is_string());
    }

    #[test]
    fn test_path_for_uses_source_file_name() {
        let store = CheckpointStore::new("/backup", "._chunks_");
        assert_eq!(
            store.path_for(Path::new("/data/big.bin")),
            PathBuf::from("/backup/big.bin._chunks_")
        );
    }

    #[tokio::test]
    async fn test_save_then_load_consumes_file() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "._chunks_");
        let cp = checkpoint(300_000, 196_608, 65_536, &[(65_536, 65_536), (131_072, 65_536)]);

        store.save(&cp).await.unwrap();
        assert!(store.exists(&cp.source).await);

        let loaded = store.load(&cp.source, 300_000).await.unwrap();
        assert_eq!(loaded, cp);
        assert!(!store.exists(&cp.source).await);
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_as_none_and_stays() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "._chunks_");
        let source = Path::new("/data/big.bin");
        tokio::fs::write(store.path_for(source), b"{ not json").await.unwrap();

        assert!(store.load(source, 300_000).await.is_none());
        assert!(store.exists(source).await);
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "._chunks_");
        assert!(store.load(Path::new("/data/none.bin"), 10).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_tolerates_absence() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "._chunks_");
        store.remove(Path::new("/data/none.bin")).await.unwrap();
    }

    proptest! {
        #[test]
        fn test_contiguous_partitions_validate(
            sizes in prop::collection::vec(1u32..100_000, 0..8),
            copied_gap in 0u64..1_000_000,
            tail in 0u64..1_000_000,
        ) {
            // copied prefix, then the outstanding chunks, then unscheduled bytes
            let mut position = copied_gap;
            let mut chunks = Vec::new();
            for size in &sizes {
                chunks.push((position, *size));
                position += u64::from(*size);
            }
            let size = position + tail;
            let cp = checkpoint(size, position, copied_gap, &chunks);
            prop_assert!(cp.validate(size).is_ok());

            let mut skewed = cp.clone();
            skewed.bytes_copied += 1;
            prop_assert!(skewed.validate(size).is_err());
        }
    }
}
