//! Resumable chunked copy engine for resumecp
//!
//! Files are copied as a series of contiguous byte ranges. At most two
//! ranges are in flight per file, their size adapts to measured throughput,
//! and every completed range is recorded in a checkpoint next to the
//! destination so an interrupted copy picks up where it stopped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use resumecp_engine::{copy_path, CancellationGate, CopyOptions};
//! use resumecp_types::SilentReporter;
//! use std::path::Path;
//!
//! # async fn example() -> resumecp_types::Result<()> {
//! let gate = CancellationGate::new();
//! gate.listen_for_interrupt();
//!
//! let summary = copy_path(
//!     Path::new("/data/big.iso"),
//!     Path::new("/mnt/backup"),
//!     &CopyOptions::default(),
//!     &gate,
//!     &SilentReporter,
//! )
//! .await?;
//!
//! if summary.interrupted {
//!     println!("Aborted, run this command again to resume copying.");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod checkpoint;
pub mod chunk;
pub mod estimator;
pub mod job;
mod state;
pub mod tree;

pub use cancel::CancellationGate;
pub use checkpoint::{Checkpoint, CheckpointStore, ChunkRecord, CHECKPOINT_VERSION};
pub use chunk::{read_chunk, ChunkCompletion, ChunkState, ChunkTask, ReadStatus};
pub use estimator::{ChunkEstimate, ChunkSizeEstimator, EstimateInput};
pub use job::{CopyJob, CopyOptions, CopyOutcome, JobId, OpenOutcome};
pub use state::{JobSnapshot, INITIAL_CHUNKS};
pub use tree::{copy_file, copy_path, CopySummary};
