//! Job bookkeeping
//!
//! Everything a copy job knows about its progress, without any I/O. The run
//! loop in [`crate::job`] holds this behind its lock and feeds it completed
//! reads; the state decides what gets scheduled next.

use crate::checkpoint::{Checkpoint, ChunkRecord, CHECKPOINT_VERSION};
use crate::chunk::{ChunkCompletion, ChunkState, ChunkTask, ReadStatus};
use crate::estimator::{ChunkSizeEstimator, EstimateInput};
use chrono::Utc;
use resumecp_types::{ChunkProgress, ChunkSize, Error, NextChunk, Result, RetryConfig};
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Chunks seeded when a job starts with nothing outstanding
pub const INITIAL_CHUNKS: usize = 2;

/// Consistent copy of a job's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    /// Source size
    pub total_size: u64,
    /// Bytes on the destination
    pub bytes_copied: u64,
    /// First offset not covered by any chunk
    pub next_chunk_position: u64,
    /// Current chunk size hint
    pub chunk_size_hint: u32,
    /// Outstanding chunks as `(position, requested_size)`, ascending
    pub outstanding: Vec<(u64, u32)>,
}

impl JobSnapshot {
    /// Whether every byte is on the destination
    pub fn is_finished(&self) -> bool {
        self.bytes_copied == self.total_size
    }

    /// Percentage copied
    pub fn percent(&self) -> f64 {
        if self.total_size == 0 {
            100.0
        } else {
            100.0 * self.bytes_copied as f64 / self.total_size as f64
        }
    }
}

/// What a completion changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Applied {
    pub bytes: u32,
    pub failed: bool,
    pub successor: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct JobState {
    source: PathBuf,
    total_size: u64,
    bytes_copied: u64,
    next_chunk_position: u64,
    chunk_size_hint: u32,
    outstanding: BTreeMap<u64, ChunkState>,
    messages: VecDeque<ChunkProgress>,
    opening_handle: Option<File>,
}

impl JobState {
    pub fn fresh(source: PathBuf, total_size: u64, hint: ChunkSize, handle: Option<File>) -> Self {
        Self {
            source,
            total_size,
            bytes_copied: 0,
            next_chunk_position: 0,
            chunk_size_hint: hint.get(),
            outstanding: BTreeMap::new(),
            messages: VecDeque::new(),
            opening_handle: handle,
        }
    }

    /// Rebuild from a checkpoint that already passed validation
    pub fn from_checkpoint(
        source: PathBuf,
        checkpoint: &Checkpoint,
        default_hint: ChunkSize,
        handle: Option<File>,
    ) -> Self {
        let hint = checkpoint
            .chunk_size_hint
            .and_then(|hint| ChunkSize::new(hint).ok())
            .unwrap_or(default_hint);

        let outstanding = checkpoint
            .chunks
            .iter()
            .map(|record| {
                (
                    record.position,
                    ChunkState::new(record.position, record.chunk_size),
                )
            })
            .collect();

        Self {
            source,
            total_size: checkpoint.size,
            bytes_copied: checkpoint.bytes_copied,
            next_chunk_position: checkpoint.next_chunk_position,
            chunk_size_hint: hint.get(),
            outstanding,
            messages: VecDeque::new(),
            opening_handle: handle,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }

    pub fn is_finished(&self) -> bool {
        self.bytes_copied == self.total_size
    }

    pub fn is_outstanding(&self, position: u64) -> bool {
        self.outstanding.contains_key(&position)
    }

    fn remaining(&self) -> u64 {
        self.total_size - self.next_chunk_position
    }

    /// Seed the initial chunks if nothing is outstanding and hand the handle
    /// opened with the job to the lowest chunk. Returns the positions to launch.
    pub fn prepare_launch(&mut self) -> Vec<u64> {
        if self.outstanding.is_empty() {
            while self.outstanding.len() < INITIAL_CHUNKS && self.remaining() > 0 {
                let size = self.remaining().min(u64::from(self.chunk_size_hint)) as u32;
                let position = self.next_chunk_position;
                self.outstanding
                    .insert(position, ChunkState::new(position, size));
                self.next_chunk_position += u64::from(size);
            }
        }

        if let Some(handle) = self.opening_handle.take() {
            if let Some(first) = self.outstanding.values_mut().next() {
                first.source = Some(handle);
            }
        }

        self.outstanding.keys().copied().collect()
    }

    /// Task reading the outstanding chunk at `position`
    pub fn task_for(
        &mut self,
        position: u64,
        path: &Arc<PathBuf>,
        block_size: usize,
    ) -> Option<ChunkTask> {
        self.outstanding
            .get_mut(&position)
            .map(|chunk| ChunkTask::from_state(Arc::clone(path), chunk, block_size))
    }

    /// Account for a finished read whose bytes are already on the destination.
    ///
    /// Returns `Ok(None)` when `position` is not outstanding.
    pub fn apply_completion(
        &mut self,
        completion: ChunkCompletion,
        estimator: &ChunkSizeEstimator,
        retry: &RetryConfig,
    ) -> Result<Option<Applied>> {
        let ChunkCompletion {
            position,
            data,
            status,
            elapsed,
            source,
        } = completion;

        let Some(chunk) = self.outstanding.remove(&position) else {
            return Ok(None);
        };

        let bytes = data.len() as u32;
        let read_end = position + u64::from(bytes);
        self.bytes_copied += u64::from(bytes);

        let mut failed = false;
        let successor = match status {
            ReadStatus::Failed(error) if read_end < chunk.end() => {
                failed = true;
                // A read that made progress starts the retry count over
                let attempt = if bytes > 0 { 1 } else { chunk.attempt + 1 };
                let mut remainder = ChunkState::new(read_end, (chunk.end() - read_end) as u32);
                remainder.attempt = attempt;
                remainder.delay = retry.delay_for_attempt(attempt);
                let size = remainder.requested_size;
                self.outstanding.insert(read_end, remainder);

                if attempt > retry.max_retries {
                    return Err(Error::ChunkRead {
                        path: self.source.clone(),
                        position: read_end,
                        attempts: attempt,
                        message: error.to_string(),
                    });
                }

                warn!(
                    position = read_end,
                    size,
                    attempt,
                    error = %error,
                    "Chunk read failed, rescheduling the rest of it"
                );
                Some((read_end, size))
            }
            ReadStatus::EndOfFile if read_end < self.total_size => {
                return Err(Error::SourceChanged {
                    path: self.source.clone(),
                    expected: self.total_size,
                    actual: read_end,
                });
            }
            ReadStatus::EndOfFile => None,
            ReadStatus::Complete | ReadStatus::Failed(_) => {
                self.schedule_successor(bytes, elapsed, estimator, source)
            }
        };

        debug_assert!(self.partition_holds());

        self.messages.push_back(ChunkProgress {
            source: self.source.clone(),
            position,
            bytes,
            elapsed,
            bytes_copied: self.bytes_copied,
            total_size: self.total_size,
            failed,
            next: successor.map(|(position, size)| NextChunk { position, size }),
        });

        Ok(Some(Applied {
            bytes,
            failed,
            successor: successor.map(|(position, _)| position),
        }))
    }

    fn schedule_successor(
        &mut self,
        bytes_read: u32,
        elapsed: std::time::Duration,
        estimator: &ChunkSizeEstimator,
        source: Option<File>,
    ) -> Option<(u64, u32)> {
        if self.remaining() == 0 {
            return None;
        }

        let estimate = estimator.estimate(EstimateInput {
            bytes_read,
            elapsed,
            current_hint: self.chunk_size_hint,
            remaining: self.remaining(),
        });
        if let Some(hint) = estimate.hint {
            self.chunk_size_hint = hint;
        }

        let position = self.next_chunk_position;
        let mut next = ChunkState::new(position, estimate.size);
        next.source = source;
        self.outstanding.insert(position, next);
        self.next_chunk_position += u64::from(estimate.size);

        Some((position, estimate.size))
    }

    /// Progress records queued since the last call
    pub fn take_messages(&mut self) -> Vec<ChunkProgress> {
        self.messages.drain(..).collect()
    }

    pub fn checkpoint(&self, destination: &Path) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            source: self.source.clone(),
            destination: destination.to_path_buf(),
            size: self.total_size,
            next_chunk_position: self.next_chunk_position,
            bytes_copied: self.bytes_copied,
            chunk_size_hint: Some(self.chunk_size_hint),
            saved_at: Utc::now(),
            chunks: self
                .outstanding
                .values()
                .map(|chunk| ChunkRecord {
                    position: chunk.position,
                    chunk_size: chunk.requested_size,
                })
                .collect(),
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            total_size: self.total_size,
            bytes_copied: self.bytes_copied,
            next_chunk_position: self.next_chunk_position,
            chunk_size_hint: self.chunk_size_hint,
            outstanding: self
                .outstanding
                .values()
                .map(|chunk| (chunk.position, chunk.requested_size))
                .collect(),
        }
    }

    /// Copied bytes, outstanding ranges and the unscheduled tail cover the
    /// file exactly, and no outstanding range crosses another or `next`.
    pub fn partition_holds(&self) -> bool {
        let mut pending = 0u64;
        let mut previous_end = 0u64;
        for chunk in self.outstanding.values() {
            if chunk.position < previous_end || chunk.end() > self.next_chunk_position {
                return false;
            }
            pending += u64::from(chunk.requested_size);
            previous_end = chunk.end();
        }
        self.next_chunk_position <= self.total_size
            && self.bytes_copied + pending + self.remaining() == self.total_size
    }
}
