//! Configuration management system for resumecp
//!
//! Configuration is layered: built-in defaults, then an optional YAML, TOML or
//! JSON file, then `RESUMECP__<SECTION>__<KEY>` environment variables.
//!
//! # Examples
//!
//! ```rust
//! use resumecp_config::{Config, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("resumecp.yaml")
//!     .add_env_prefix("RESUMECP")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Initial chunk size: {}", config.chunking.initial_chunk_size.get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use resumecp_types::{ChunkSize, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for resumecp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chunk sizing and reading
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Re-reads of failed chunks
    #[serde(default)]
    pub retry: RetryConfig,
    /// Checkpoint sidecar files
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chunk sizing and reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Size of the first chunks of a fresh job
    #[serde(default)]
    pub initial_chunk_size: ChunkSize,
    /// How long one chunk should take to read; the estimator scales toward it
    #[serde(default = "default_target_chunk_duration")]
    pub target_chunk_duration: Duration,
    /// Size of each sub-read inside a chunk
    #[serde(default = "default_read_block_size")]
    pub read_block_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: ChunkSize::default(),
            target_chunk_duration: default_target_chunk_duration(),
            read_block_size: default_read_block_size(),
        }
    }
}

fn default_target_chunk_duration() -> Duration {
    Duration::from_secs(10)
}

fn default_read_block_size() -> usize {
    16 * 1024
}

/// Checkpoint sidecar files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Suffix appended to the source file name to form the sidecar name
    #[serde(default = "default_checkpoint_suffix")]
    pub suffix: String,
    /// Sync destination data to stable storage before each checkpoint write
    #[serde(default = "default_sync_data")]
    pub sync_data: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            suffix: default_checkpoint_suffix(),
            sync_data: default_sync_data(),
        }
    }
}

fn default_checkpoint_suffix() -> String {
    "._chunks_".to_string()
}

fn default_sync_data() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when neither RUST_LOG nor a command-line flag sets one
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit log records as JSON lines
    #[serde(default)]
    pub json_format: bool,
    /// Enable colored output
    #[serde(default = "default_colored_output")]
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            colored_output: default_colored_output(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_colored_output() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.initial_chunk_size.get(), 64 * 1024);
        assert_eq!(config.chunking.target_chunk_duration, Duration::from_secs(10));
        assert_eq!(config.chunking.read_block_size, 16 * 1024);
        assert_eq!(config.checkpoint.suffix, "._chunks_");
        assert!(config.checkpoint.sync_data);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("chunking:\n  read_block_size: 4096\n").unwrap();
        assert_eq!(config.chunking.read_block_size, 4096);
        assert_eq!(config.chunking.initial_chunk_size, ChunkSize::default());
        assert_eq!(config.checkpoint.suffix, "._chunks_");
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let result: Result<Config, _> =
            serde_yaml::from_str("chunking:\n  initial_chunk_size: 100\n");
        assert!(result.is_err());
    }
}
