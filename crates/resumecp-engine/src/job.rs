//! Per-file copy jobs
//!
//! A [`CopyJob`] copies one source file to one destination file in chunks.
//! Its run loop collects chunk completions, writes their bytes at their
//! offsets, checkpoints, and launches successors, until every byte is on the
//! destination or the job's cancellation token fires.
//!
//! Ordering per completion: destination write (and sync), checkpoint write,
//! successor launch. A crash at any point leaves a checkpoint that lists no
//! range as done before its bytes reached the destination.

use crate::checkpoint::CheckpointStore;
use crate::chunk::ChunkCompletion;
use crate::estimator::ChunkSizeEstimator;
use crate::state::{JobSnapshot, JobState};
use resumecp_config::Config;
use resumecp_types::{
    ChunkSize, CopyStats, Error, ErrorSeverity, ProgressReporter, Result, RetryConfig,
};
use std::fmt;
use std::fs::File;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Unique identifier for a copy job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tunables of a copy job
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Size of the first chunks of a fresh job
    pub initial_chunk_size: ChunkSize,
    /// Size of each sub-read inside a chunk
    pub read_block_size: usize,
    /// Chunk sizing policy
    pub estimator: ChunkSizeEstimator,
    /// Re-read policy for failed chunks
    pub retry: RetryConfig,
    /// Sync destination data before each checkpoint
    pub sync_data: bool,
    /// Checkpoint file name suffix
    pub checkpoint_suffix: String,
}

impl CopyOptions {
    /// Options from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_chunk_size: config.chunking.initial_chunk_size,
            read_block_size: config.chunking.read_block_size,
            estimator: ChunkSizeEstimator::new(config.chunking.target_chunk_duration),
            retry: config.retry.clone(),
            sync_data: config.checkpoint.sync_data,
            checkpoint_suffix: config.checkpoint.suffix.clone(),
        }
    }
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of [`CopyJob::open`]
#[derive(Debug)]
pub enum OpenOutcome {
    /// The job is ready to run
    Ready(CopyJob),
    /// The destination exists and no checkpoint says it is a partial copy
    Skipped {
        /// The existing destination
        destination: PathBuf,
    },
}

/// Result of [`CopyJob::run`]
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    /// Every byte is on the destination and the checkpoint is gone
    Completed(CopyStats),
    /// The destination appeared between open and run; nothing was written
    Skipped,
    /// Cancelled; progress was saved to `checkpoint`
    Interrupted {
        /// Checkpoint file a rerun resumes from
        checkpoint: PathBuf,
        /// Work done before the interruption
        stats: CopyStats,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationMode {
    /// Fresh copy; fail over to skip if the file exists
    CreateNew,
    /// Continue a partial copy in place
    Resume,
}

/// Copy of one file
#[derive(Debug)]
pub struct CopyJob {
    id: JobId,
    source: Arc<PathBuf>,
    destination: PathBuf,
    mode: DestinationMode,
    options: CopyOptions,
    store: CheckpointStore,
    cancel: CancellationToken,
    state: RwLock<JobState>,
}

impl CopyJob {
    /// Prepare a job, resuming from a checkpoint next to `destination` if one
    /// is valid for the current source.
    pub async fn open(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        options: CopyOptions,
        cancel: CancellationToken,
    ) -> Result<OpenOutcome> {
        let source = source.into();
        let destination = destination.into();

        let (handle, size) = open_source(&source).await?;

        let dir = destination
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let store = CheckpointStore::new(dir, options.checkpoint_suffix.clone());

        let stale_checkpoint = store.exists(&source).await;
        let checkpoint = store.load(&source, size).await;
        let destination_exists = tokio::fs::try_exists(&destination)
            .await
            .map_err(|e| Error::destination_write(&destination, &e))?;

        let hint = options.initial_chunk_size;
        let (state, mode) = match checkpoint {
            Some(checkpoint) if destination_exists => {
                info!(
                    source = %source.display(),
                    bytes_copied = checkpoint.bytes_copied,
                    chunks = checkpoint.chunks.len(),
                    "Resuming from checkpoint"
                );
                let state =
                    JobState::from_checkpoint(source.clone(), &checkpoint, hint, Some(handle));
                (state, DestinationMode::Resume)
            }
            Some(_) => {
                warn!(
                    destination = %destination.display(),
                    "Checkpoint found but the destination is missing, restarting from the beginning"
                );
                let state = JobState::fresh(source.clone(), size, hint, Some(handle));
                (state, DestinationMode::CreateNew)
            }
            None if destination_exists => {
                if stale_checkpoint {
                    warn!(
                        destination = %destination.display(),
                        checkpoint = %store.path_for(&source).display(),
                        "Checkpoint is unusable, leaving the existing file alone"
                    );
                } else {
                    info!(destination = %destination.display(), "File already exists, not overwriting");
                }
                return Ok(OpenOutcome::Skipped { destination });
            }
            None => {
                let state = JobState::fresh(source.clone(), size, hint, Some(handle));
                (state, DestinationMode::CreateNew)
            }
        };

        Ok(OpenOutcome::Ready(Self {
            id: JobId::new(),
            source: Arc::new(source),
            destination,
            mode,
            options,
            store,
            cancel,
            state: RwLock::new(state),
        }))
    }

    /// Job identifier used in logs
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Source file
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination file
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether the job continues a checkpointed copy
    pub fn is_resume(&self) -> bool {
        self.mode == DestinationMode::Resume
    }

    /// Path of this job's checkpoint file
    pub fn checkpoint_path(&self) -> PathBuf {
        self.store.path_for(&self.source)
    }

    /// Consistent copy of the job's progress
    pub async fn snapshot(&self) -> JobSnapshot {
        self.state.read().await.snapshot()
    }

    /// Copy until done or cancelled
    pub async fn run(&self, reporter: &dyn ProgressReporter) -> Result<CopyOutcome> {
        let span = info_span!("copy", job = %self.id);
        let result = self.drive(reporter).instrument(span).await;

        if let Err(e) = &result {
            if e.severity() >= ErrorSeverity::High {
                error!(job = %self.id, source = %self.source.display(), error = %e, "Copy failed");
            } else {
                warn!(job = %self.id, source = %self.source.display(), error = %e, "Copy of file failed");
            }
            reporter.job_failed(&self.source, e);
        }
        result
    }

    async fn drive(&self, reporter: &dyn ProgressReporter) -> Result<CopyOutcome> {
        let started = Instant::now();
        let mut stats = CopyStats::new();
        let mut tasks = JoinSet::new();

        let (dest, total_size) = {
            let mut state = self.state.write().await;
            let positions = state.prepare_launch();

            let Some(dest) = self.open_destination().await? else {
                reporter.job_skipped(&self.source, &self.destination);
                return Ok(CopyOutcome::Skipped);
            };

            if !state.is_finished() {
                self.store.save(&state.checkpoint(&self.destination)).await?;
            }

            for position in positions {
                if let Some(task) =
                    state.task_for(position, &self.source, self.options.read_block_size)
                {
                    task.spawn(&mut tasks);
                }
            }

            (Mutex::new(dest), state.total_size())
        };

        info!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            total_size,
            resumed = self.is_resume(),
            "Copy started"
        );
        reporter.job_started(&self.source, &self.destination, total_size, self.is_resume());

        loop {
            let finished = self.state.read().await.is_finished();
            if finished {
                break;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return self.interrupt(stats, started).await;
                }
                joined = tasks.join_next() => {
                    let completion = match joined {
                        Some(Ok(completion)) => completion,
                        Some(Err(e)) => {
                            return Err(Error::other(format!("Chunk task failed: {}", e)));
                        }
                        None => {
                            return Err(Error::other("No chunk reads in flight for an unfinished copy"));
                        }
                    };

                    self.complete_chunk(completion, &dest, &mut tasks, &mut stats).await?;

                    let messages = self.state.write().await.take_messages();
                    for progress in &messages {
                        reporter.chunk_completed(progress);
                    }
                }
            }
        }

        self.store.remove(&self.source).await?;

        stats.files_copied = 1;
        stats.files_resumed = u64::from(self.is_resume());
        stats.duration = started.elapsed();
        info!(
            source = %self.source.display(),
            bytes_copied = stats.bytes_copied,
            chunks = stats.chunks_completed,
            duration_ms = stats.duration.as_millis() as u64,
            "Copy completed"
        );
        reporter.job_completed(&self.source, &stats);

        Ok(CopyOutcome::Completed(stats))
    }

    async fn complete_chunk(
        &self,
        completion: ChunkCompletion,
        dest: &Mutex<tokio::fs::File>,
        tasks: &mut JoinSet<ChunkCompletion>,
        stats: &mut CopyStats,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.is_outstanding(completion.position) {
            debug!(position = completion.position, "Ignoring completion of a chunk that is not outstanding");
            return Ok(());
        }

        if !completion.data.is_empty() {
            self.write_destination(dest, completion.position, &completion.data)
                .await?;
        }

        let applied = match state.apply_completion(
            completion,
            &self.options.estimator,
            &self.options.retry,
        ) {
            Ok(Some(applied)) => applied,
            Ok(None) => return Ok(()),
            Err(e) => {
                if matches!(e, Error::ChunkRead { .. }) {
                    // Keep the bytes that did arrive so a rerun resumes after them
                    if let Err(save) = self.store.save(&state.checkpoint(&self.destination)).await {
                        warn!(error = %save, "Failed to save checkpoint after read failure");
                    }
                }
                return Err(e);
            }
        };

        stats.bytes_copied += u64::from(applied.bytes);
        if applied.failed {
            stats.chunk_retries += 1;
        } else {
            stats.chunks_completed += 1;
        }
        debug!(
            bytes = applied.bytes,
            bytes_copied = state.bytes_copied(),
            successor = ?applied.successor,
            "Chunk completed"
        );

        if !state.is_finished() {
            self.store.save(&state.checkpoint(&self.destination)).await?;
        }

        if let Some(position) = applied.successor {
            if let Some(task) = state.task_for(position, &self.source, self.options.read_block_size) {
                task.spawn(tasks);
            }
        }

        Ok(())
    }

    async fn write_destination(
        &self,
        dest: &Mutex<tokio::fs::File>,
        position: u64,
        data: &[u8],
    ) -> Result<()> {
        let mut file = dest.lock().await;
        let write = async {
            file.seek(SeekFrom::Start(position)).await?;
            file.write_all(data).await?;
            file.flush().await?;
            if self.options.sync_data {
                file.sync_data().await?;
            }
            Ok::<(), io::Error>(())
        };

        write
            .await
            .map_err(|e| Error::destination_write(&self.destination, &e))
    }

    async fn open_destination(&self) -> Result<Option<tokio::fs::File>> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        match self.mode {
            DestinationMode::CreateNew => {
                options.create_new(true);
            }
            DestinationMode::Resume => {}
        }

        match options.open(&self.destination).await {
            Ok(file) => Ok(Some(file)),
            Err(e)
                if e.kind() == io::ErrorKind::AlreadyExists
                    && self.mode == DestinationMode::CreateNew =>
            {
                info!(destination = %self.destination.display(), "File already exists, not overwriting");
                Ok(None)
            }
            Err(e) => Err(Error::destination_write(&self.destination, &e)),
        }
    }

    async fn interrupt(&self, mut stats: CopyStats, started: Instant) -> Result<CopyOutcome> {
        let state = self.state.read().await;
        let checkpoint = state.checkpoint(&self.destination);
        self.store.save(&checkpoint).await?;

        stats.duration = started.elapsed();
        info!(
            source = %self.source.display(),
            bytes_copied = checkpoint.bytes_copied,
            total_size = checkpoint.size,
            chunks = checkpoint.chunks.len(),
            "Copy interrupted, progress saved"
        );

        Ok(CopyOutcome::Interrupted {
            checkpoint: self.checkpoint_path(),
            stats,
        })
    }
}

async fn open_source(source: &Path) -> Result<(File, u64)> {
    let path = source.to_path_buf();
    let opened = tokio::task::spawn_blocking(move || -> io::Result<(File, u64)> {
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    })
    .await
    .map_err(|e| Error::other(format!("Source open task failed: {}", e)))?;

    opened.map_err(|e| Error::source_open(source, &e))
}
