//! Configuration types for resumecp
//!
//! Validated value types shared by the config crate and the engine.

use std::time::Duration;

/// Chunk size in bytes, bounded by the estimator's floor and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct ChunkSize(u32);

impl ChunkSize {
    /// Smallest chunk the estimator will propose (4KB)
    pub const MIN: u32 = 4 * 1024;
    /// Largest chunk the estimator will propose (64MB)
    pub const MAX: u32 = 64 * 1024 * 1024;
    /// Size of the first chunks of a fresh job (64KB)
    pub const DEFAULT: u32 = 64 * 1024;

    /// Create a new chunk size with validation
    pub fn new(size: u32) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Chunk size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Chunk size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the chunk size value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u32> for ChunkSize {
    type Error = String;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<ChunkSize> for u32 {
    fn from(size: ChunkSize) -> Self {
        size.0
    }
}

/// Retry policy for chunks whose read failed
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryConfig {
    /// Maximum number of re-reads of one range before the job gives up
    pub max_retries: u32,
    /// Delay before the first re-read
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, String> {
        let config = Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants `new` enforces, for values deserialized elsewhere
    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier <= 1.0 {
            return Err("Backoff multiplier must be greater than 1.0".to_string());
        }
        if self.initial_delay > self.max_delay {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }
        Ok(())
    }

    /// Delay before re-reading a range for the given attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1).min(64) as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
