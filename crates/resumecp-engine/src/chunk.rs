//! Chunk reads
//!
//! A chunk is one bounded read of a byte range of the source. Reads are
//! blocking and run on tokio's blocking pool; each one ends in exactly one
//! [`ChunkCompletion`] collected by the job's run loop.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::trace;

/// An outstanding chunk, as recorded in the job's chunk table
#[derive(Debug)]
pub struct ChunkState {
    /// Offset of the range in the source
    pub position: u64,
    /// Length of the range; never changes once the chunk exists
    pub requested_size: u32,
    /// Number of earlier failed reads of this range
    pub attempt: u32,
    /// Source handle handed over by the predecessor, if any
    pub source: Option<File>,
    /// Pause before the read starts
    pub delay: Duration,
}

impl ChunkState {
    /// First attempt at a range
    pub fn new(position: u64, requested_size: u32) -> Self {
        Self {
            position,
            requested_size,
            attempt: 0,
            source: None,
            delay: Duration::ZERO,
        }
    }

    /// Offset one past the end of the range
    pub fn end(&self) -> u64 {
        self.position + u64::from(self.requested_size)
    }
}

/// How a chunk read ended
#[derive(Debug)]
pub enum ReadStatus {
    /// The whole range was read
    Complete,
    /// The stream ended before the range was filled
    EndOfFile,
    /// A read error stopped the chunk; data holds what came before it
    Failed(io::Error),
}

/// Result of one chunk read, delivered to the run loop
#[derive(Debug)]
pub struct ChunkCompletion {
    /// Offset the chunk was launched at
    pub position: u64,
    /// Bytes read from `position`
    pub data: Vec<u8>,
    /// How the read ended
    pub status: ReadStatus,
    /// Time spent reading
    pub elapsed: Duration,
    /// Source handle, returned so it can move on to the successor
    pub source: Option<File>,
}

impl ChunkCompletion {
    /// Number of bytes read
    pub fn bytes_read(&self) -> u32 {
        // A chunk never reads more than its u32 requested size
        self.data.len() as u32
    }

    /// Whether the read stopped on an error
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ReadStatus::Failed(_))
    }
}

/// Read `size` bytes at `position`, in sub-reads of at most `block_size` bytes.
///
/// Opens `path` when no handle is passed in. The handle is returned with the
/// completion unless the read failed, so a retry starts from a fresh open.
pub fn read_chunk(
    path: &Path,
    handle: Option<File>,
    position: u64,
    size: u32,
    block_size: usize,
) -> ChunkCompletion {
    let start = Instant::now();
    let failed = |data: Vec<u8>, error: io::Error| ChunkCompletion {
        position,
        data,
        status: ReadStatus::Failed(error),
        elapsed: start.elapsed(),
        source: None,
    };

    let mut file = match handle {
        Some(file) => file,
        None => match File::open(path) {
            Ok(file) => file,
            Err(e) => return failed(Vec::new(), e),
        },
    };

    if let Err(e) = file.seek(SeekFrom::Start(position)) {
        return failed(Vec::new(), e);
    }

    let wanted = size as usize;
    let block_size = block_size.max(1);
    let mut data = vec![0u8; wanted];
    let mut filled = 0;

    while filled < wanted {
        let end = (filled + block_size).min(wanted);
        match file.read(&mut data[filled..end]) {
            Ok(0) => {
                data.truncate(filled);
                return ChunkCompletion {
                    position,
                    data,
                    status: ReadStatus::EndOfFile,
                    elapsed: start.elapsed(),
                    source: Some(file),
                };
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                data.truncate(filled);
                return failed(data, e);
            }
        }
    }

    ChunkCompletion {
        position,
        data,
        status: ReadStatus::Complete,
        elapsed: start.elapsed(),
        source: Some(file),
    }
}

/// A chunk read ready to be launched
#[derive(Debug)]
pub struct ChunkTask {
    path: Arc<PathBuf>,
    position: u64,
    size: u32,
    delay: Duration,
    source: Option<File>,
    block_size: usize,
}

impl ChunkTask {
    /// Build the task for an outstanding chunk, taking its source handle
    pub fn from_state(path: Arc<PathBuf>, chunk: &mut ChunkState, block_size: usize) -> Self {
        Self {
            path,
            position: chunk.position,
            size: chunk.requested_size,
            delay: chunk.delay,
            source: chunk.source.take(),
            block_size,
        }
    }

    /// Offset of the range this task reads
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Start the read; its completion is collected from `tasks`
    pub fn spawn(self, tasks: &mut JoinSet<ChunkCompletion>) {
        tasks.spawn(self.run());
    }

    async fn run(self) -> ChunkCompletion {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let Self {
            path,
            position,
            size,
            source,
            block_size,
            ..
        } = self;
        trace!(position, size, "reading chunk");

        let result = tokio::task::spawn_blocking(move || {
            read_chunk(&path, source, position, size, block_size)
        })
        .await;

        match result {
            Ok(completion) => completion,
            Err(e) => ChunkCompletion {
                position,
                data: Vec::new(),
                status: ReadStatus::Failed(io::Error::other(e.to_string())),
                elapsed: Duration::ZERO,
                source: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_full_read() {
        let file = source_file(10_000);
        let completion = read_chunk(file.path(), None, 1000, 4096, 1000);

        assert!(matches!(completion.status, ReadStatus::Complete));
        assert_eq!(completion.bytes_read(), 4096);
        assert_eq!(completion.data[0], (1000 % 251) as u8);
        assert!(completion.source.is_some());
    }

    #[test]
    fn test_short_read_at_end_of_file() {
        let file = source_file(10_000);
        let completion = read_chunk(file.path(), None, 8000, 4096, 512);

        assert!(matches!(completion.status, ReadStatus::EndOfFile));
        assert_eq!(completion.bytes_read(), 2000);
    }

    #[test]
    fn test_read_exactly_to_end_is_complete() {
        let file = source_file(8192);
        let completion = read_chunk(file.path(), None, 4096, 4096, 16 * 1024);
        assert!(matches!(completion.status, ReadStatus::Complete));
    }

    #[test]
    fn test_reuses_handle() {
        let file = source_file(20_000);
        let first = read_chunk(file.path(), None, 0, 4096, 4096);
        let handle = first.source;

        // Path is ignored when a handle comes along
        let second = read_chunk(Path::new("/nonexistent"), handle, 4096, 4096, 4096);
        assert!(matches!(second.status, ReadStatus::Complete));
        assert_eq!(second.data[0], (4096 % 251) as u8);
    }

    #[test]
    fn test_missing_source_fails() {
        let completion = read_chunk(Path::new("/no/such/source"), None, 0, 4096, 4096);
        assert!(completion.is_failed());
        assert!(completion.data.is_empty());
        assert!(completion.source.is_none());
    }

    #[tokio::test]
    async fn test_spawned_task_delivers_completion() {
        let file = source_file(9000);
        let path = Arc::new(file.path().to_path_buf());
        let mut chunk = ChunkState::new(4096, 4096);
        chunk.delay = Duration::from_millis(5);

        let mut tasks = JoinSet::new();
        ChunkTask::from_state(path, &mut chunk, 1024).spawn(&mut tasks);

        let completion = tasks.join_next().await.unwrap().unwrap();
        assert_eq!(completion.position, 4096);
        assert_eq!(completion.bytes_read(), 4096);
        assert!(tasks.join_next().await.is_none());
    }
}
