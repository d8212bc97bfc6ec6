//! Core traits for resumecp operations

use crate::{ChunkProgress, CopyStats, Error};
use std::path::Path;

/// Receives progress from copy jobs
///
/// Called from the job's run loop, never while the job lock is held, so
/// implementations may block briefly (print, redraw a bar) without stalling
/// chunk reads.
pub trait ProgressReporter: Send + Sync {
    /// A job is about to launch its chunks
    fn job_started(&self, source: &Path, destination: &Path, total_size: u64, resumed: bool);

    /// A chunk completed and its bytes are on the destination
    fn chunk_completed(&self, progress: &ChunkProgress);

    /// The destination already existed and was left untouched
    fn job_skipped(&self, source: &Path, destination: &Path);

    /// A job finished copying its file
    fn job_completed(&self, source: &Path, stats: &CopyStats);

    /// A job failed
    fn job_failed(&self, source: &Path, error: &Error);
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn job_started(&self, _source: &Path, _destination: &Path, _total_size: u64, _resumed: bool) {}

    fn chunk_completed(&self, _progress: &ChunkProgress) {}

    fn job_skipped(&self, _source: &Path, _destination: &Path) {}

    fn job_completed(&self, _source: &Path, _stats: &CopyStats) {}

    fn job_failed(&self, _source: &Path, _error: &Error) {}
}
