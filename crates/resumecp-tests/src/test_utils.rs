//! Unified test utilities for resumecp integration tests

use resumecp_engine::{CancellationGate, ChunkSizeEstimator, CopyOptions};
use resumecp_types::{ChunkProgress, ChunkSize, CopyStats, Error, ProgressReporter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Byte value derived from the offset, so misplaced chunks show up
    Sequential,
    /// Deterministic pseudo-random bytes
    Random,
}

/// Generate test data with specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Sequential => (0..size).map(|i| ((i * 7 + 13) % 251) as u8).collect(),
        TestDataPattern::Random => {
            // xorshift, seeded so failures reproduce
            let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
            (0..size)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state >> 24) as u8
                })
                .collect()
        }
    }
}

/// Create a file with test data under `temp_dir`, returning its path and contents
pub fn create_test_file(
    temp_dir: &TempDir,
    name: &str,
    size: usize,
    pattern: TestDataPattern,
) -> (PathBuf, Vec<u8>) {
    let path = temp_dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    let data = generate_test_data(size, pattern);
    fs::write(&path, &data).expect("Failed to write test file");
    (path, data)
}

/// Options that keep chunks at the 4KB floor so small files span many chunks
pub fn fast_options() -> CopyOptions {
    CopyOptions {
        initial_chunk_size: ChunkSize::new(ChunkSize::MIN).expect("floor is a valid chunk size"),
        read_block_size: 1024,
        estimator: ChunkSizeEstimator::new(Duration::from_micros(1)),
        sync_data: false,
        ..CopyOptions::default()
    }
}

/// Checkpoint path the engine uses for `source` copied into `destination_dir`
pub fn checkpoint_path(source: &Path, destination_dir: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .expect("source has a file name")
        .to_os_string();
    name.push("._chunks_");
    destination_dir.join(name)
}

/// Everything a reporter was told
#[derive(Debug, Default)]
pub struct RecordedEvents {
    /// `(source, resumed)` per started job
    pub started: Vec<(PathBuf, bool)>,
    /// Every chunk progress record, in order
    pub chunks: Vec<ChunkProgress>,
    /// Destinations reported as skipped
    pub skipped: Vec<PathBuf>,
    /// Sources reported as completed
    pub completed: Vec<PathBuf>,
    /// Sources reported as failed, with the error text
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug)]
enum Stop {
    Token(CancellationToken),
    Gate(CancellationGate),
}

impl Stop {
    fn fire(&self) {
        match self {
            Stop::Token(token) => token.cancel(),
            Stop::Gate(gate) => gate.trigger(),
        }
    }
}

/// Reporter that records events and can cancel a copy after N chunks
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<RecordedEvents>,
    cancel_after: Option<(usize, Stop)>,
    chunks_seen: AtomicUsize,
}

impl RecordingReporter {
    /// Reporter that only records
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that cancels `token` once `chunks` chunk completions were reported
    pub fn cancel_after(chunks: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((chunks, Stop::Token(token))),
            ..Self::default()
        }
    }

    /// Reporter that triggers `gate` once `chunks` chunk completions were reported
    pub fn trigger_after(chunks: usize, gate: CancellationGate) -> Self {
        Self {
            cancel_after: Some((chunks, Stop::Gate(gate))),
            ..Self::default()
        }
    }

    /// Recorded events so far
    pub fn events(&self) -> std::sync::MutexGuard<'_, RecordedEvents> {
        self.events.lock().expect("reporter lock poisoned")
    }
}

impl ProgressReporter for RecordingReporter {
    fn job_started(&self, source: &Path, _destination: &Path, _total_size: u64, resumed: bool) {
        self.events().started.push((source.to_path_buf(), resumed));
    }

    fn chunk_completed(&self, progress: &ChunkProgress) {
        self.events().chunks.push(progress.clone());
        let seen = self.chunks_seen.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, stop)) = &self.cancel_after {
            if seen >= *limit {
                stop.fire();
            }
        }
    }

    fn job_skipped(&self, _source: &Path, destination: &Path) {
        self.events().skipped.push(destination.to_path_buf());
    }

    fn job_completed(&self, source: &Path, _stats: &CopyStats) {
        self.events().completed.push(source.to_path_buf());
    }

    fn job_failed(&self, source: &Path, error: &Error) {
        self.events()
            .failed
            .push((source.to_path_buf(), error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_deterministic() {
        for pattern in [TestDataPattern::Zeros, TestDataPattern::Sequential, TestDataPattern::Random] {
            assert_eq!(generate_test_data(4096, pattern), generate_test_data(4096, pattern));
        }
    }

    #[test]
    fn test_cancel_after_fires_at_limit() {
        let token = CancellationToken::new();
        let reporter = RecordingReporter::cancel_after(2, token.clone());
        let progress = ChunkProgress {
            source: PathBuf::from("a"),
            position: 0,
            bytes: 4096,
            elapsed: Duration::from_millis(1),
            bytes_copied: 4096,
            total_size: 8192,
            failed: false,
            next: None,
        };

        reporter.chunk_completed(&progress);
        assert!(!token.is_cancelled());
        reporter.chunk_completed(&progress);
        assert!(token.is_cancelled());
        assert_eq!(reporter.events().chunks.len(), 2);
    }

    #[test]
    fn test_trigger_after_reaches_gate() {
        let gate = CancellationGate::new();
        let job = gate.register();
        let reporter = RecordingReporter::trigger_after(1, gate.clone());
        reporter.chunk_completed(&ChunkProgress {
            source: PathBuf::from("a"),
            position: 0,
            bytes: 4096,
            elapsed: Duration::from_millis(1),
            bytes_copied: 4096,
            total_size: 4096,
            failed: false,
            next: None,
        });

        assert!(gate.is_triggered());
        assert!(job.is_cancelled());
    }
}
