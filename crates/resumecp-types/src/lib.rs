//! Core type system and error handling for resumecp
//!
//! This crate provides the foundational types shared across the resumecp
//! workspace:
//!
//! - **Error handling**: one error type with kinds and severity levels
//! - **Configuration values**: validated chunk sizes and retry policy
//! - **Progress**: per-chunk progress records and the reporter trait
//! - **Statistics**: per-file and per-tree copy counters
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use resumecp_types::{ChunkSize, CopyStats, Result};
//!
//! fn example_operation() -> Result<CopyStats> {
//!     let mut stats = CopyStats::new();
//!     stats.files_copied = 1;
//!     stats.bytes_copied = u64::from(ChunkSize::default().get());
//!     Ok(stats)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ChunkSize, RetryConfig};
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::*;
pub use types::*;
