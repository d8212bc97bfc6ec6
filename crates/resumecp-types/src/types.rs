//! Core data types for resumecp
//!
//! Statistics and progress records exchanged between the engine and its
//! front ends.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Transfer rate in bytes per second
pub type TransferRate = f64;

/// Copy statistics, per file or accumulated over a tree
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyStats {
    /// Number of files copied to completion
    pub files_copied: u64,
    /// Number of files whose copy was resumed from a checkpoint
    pub files_resumed: u64,
    /// Number of files skipped because the destination already existed
    pub files_skipped: u64,
    /// Number of directories created
    pub directories_created: u64,
    /// Number of files that failed
    pub errors: u64,
    /// Bytes written to destinations during this run
    pub bytes_copied: u64,
    /// Chunks completed during this run
    pub chunks_completed: u64,
    /// Chunks rescheduled after a failed read
    pub chunk_retries: u64,
    /// Wall time
    pub duration: Duration,
}

impl CopyStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the overall transfer rate
    pub fn transfer_rate(&self) -> TransferRate {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_copied as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &CopyStats) {
        self.files_copied += other.files_copied;
        self.files_resumed += other.files_resumed;
        self.files_skipped += other.files_skipped;
        self.directories_created += other.directories_created;
        self.errors += other.errors;
        self.bytes_copied += other.bytes_copied;
        self.chunks_completed += other.chunks_completed;
        self.chunk_retries += other.chunk_retries;
        self.duration += other.duration;
    }
}

/// A chunk scheduled to follow a completed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NextChunk {
    /// Offset of the successor
    pub position: u64,
    /// Requested size of the successor
    pub size: u32,
}

/// One completed chunk, as queued for the progress consumer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkProgress {
    /// Source file of the job
    pub source: PathBuf,
    /// Offset of the completed chunk
    pub position: u64,
    /// Bytes read and written for this chunk
    pub bytes: u32,
    /// Time the read took
    pub elapsed: Duration,
    /// Bytes copied so far for the file
    pub bytes_copied: u64,
    /// Size of the file
    pub total_size: u64,
    /// Whether the read failed before its range was exhausted
    pub failed: bool,
    /// The chunk scheduled in its place, if any
    pub next: Option<NextChunk>,
}

impl ChunkProgress {
    /// Percentage of the file copied
    pub fn percent(&self) -> f64 {
        if self.total_size > 0 {
            100.0 * self.bytes_copied as f64 / self.total_size as f64
        } else {
            100.0
        }
    }

    /// Measured read rate for this chunk, `None` when the elapsed time is too short to measure
    pub fn rate(&self) -> Option<TransferRate> {
        if self.elapsed >= Duration::from_micros(1) && self.bytes > 0 {
            Some(f64::from(self.bytes) / self.elapsed.as_secs_f64())
        } else {
            None
        }
    }
}

impl fmt::Display for ChunkProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% done {} bytes, chunk @{} {} bytes",
            self.percent(),
            group_digits(self.bytes_copied),
            group_digits(self.position),
            group_digits(u64::from(self.bytes)),
        )?;
        if let Some(rate) = self.rate() {
            write!(f, " {}", format_rate(rate))?;
        }
        if self.failed {
            write!(f, " (read failed)")?;
        }
        if let Some(next) = self.next {
            write!(
                f,
                ", next chunk {} size {}",
                group_digits(next.position),
                group_digits(u64::from(next.size))
            )?;
        }
        Ok(())
    }
}

/// Format a number with thousands separators: `1234567` -> `1,234,567`
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a byte rate with decimal units
pub fn format_rate(rate: TransferRate) -> String {
    if rate > 1_000_000.0 {
        format!("{:.1} MB/s", rate / 1_000_000.0)
    } else if rate > 1_000.0 {
        format!("{:.1} KB/s", rate / 1_000.0)
    } else {
        format!("{:.1} Bytes/s", rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0")]
    #[case(999, "999")]
    #[case(1000, "1,000")]
    #[case(65536, "65,536")]
    #[case(150_000_000, "150,000,000")]
    #[case(1_000_000_000_000, "1,000,000,000,000")]
    fn test_group_digits(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(group_digits(n), expected);
    }

    #[test]
    fn test_format_rate_units() {
        assert_eq!(format_rate(512.0), "512.0 Bytes/s");
        assert_eq!(format_rate(2_500.0), "2.5 KB/s");
        assert_eq!(format_rate(12_300_000.0), "12.3 MB/s");
    }

    #[test]
    fn test_chunk_progress_line() {
        let progress = ChunkProgress {
            source: PathBuf::from("disk.img"),
            position: 65536,
            bytes: 65536,
            elapsed: Duration::from_millis(100),
            bytes_copied: 131072,
            total_size: 262144,
            failed: false,
            next: Some(NextChunk {
                position: 131072,
                size: 131072,
            }),
        };

        let line = progress.to_string();
        assert_eq!(
            line,
            "50.0% done 131,072 bytes, chunk @65,536 65,536 bytes 655.4 KB/s, next chunk 131,072 size 131,072"
        );
    }

    #[test]
    fn test_chunk_progress_without_rate() {
        let progress = ChunkProgress {
            source: PathBuf::from("disk.img"),
            position: 0,
            bytes: 0,
            elapsed: Duration::ZERO,
            bytes_copied: 0,
            total_size: 100,
            failed: true,
            next: None,
        };

        assert_eq!(progress.rate(), None);
        assert_eq!(progress.to_string(), "0.0% done 0 bytes, chunk @0 0 bytes (read failed)");
    }

    #[test]
    fn test_copy_stats_merge() {
        let mut stats1 = CopyStats::new();
        stats1.files_copied = 5;
        stats1.bytes_copied = 1000;
        stats1.chunk_retries = 1;

        let mut stats2 = CopyStats::new();
        stats2.files_copied = 3;
        stats2.files_skipped = 2;
        stats2.bytes_copied = 500;

        stats1.merge(&stats2);
        assert_eq!(stats1.files_copied, 8);
        assert_eq!(stats1.files_skipped, 2);
        assert_eq!(stats1.bytes_copied, 1500);
        assert_eq!(stats1.chunk_retries, 1);
    }

    #[test]
    fn test_transfer_rate() {
        let mut stats = CopyStats::new();
        assert_eq!(stats.transfer_rate(), 0.0);

        stats.bytes_copied = 2048;
        stats.duration = Duration::from_secs(2);
        assert_eq!(stats.transfer_rate(), 1024.0);
    }
}
