//! Adaptive chunk sizing
//!
//! The estimator scales the next chunk so that reading it takes roughly the
//! target duration at the throughput the previous chunk achieved. It is pure:
//! no clocks, no I/O, so every policy decision is testable in isolation.

use resumecp_types::ChunkSize;
use std::time::Duration;

/// Elapsed times below this are clock noise and carry no throughput signal
pub const CLOCK_RESOLUTION: Duration = Duration::from_micros(10);

/// Measurement of a completed chunk plus the job's scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimateInput {
    /// Bytes the completed chunk read
    pub bytes_read: u32,
    /// How long the read took
    pub elapsed: Duration,
    /// The job's running chunk size hint
    pub current_hint: u32,
    /// Bytes not yet covered by any chunk
    pub remaining: u64,
}

/// Size chosen for the next chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEstimate {
    /// Requested size of the next chunk
    pub size: u32,
    /// New value for the job's hint, when the measurement produced a usable one
    pub hint: Option<u32>,
}

/// Computes the next chunk size from the previous chunk's throughput
#[derive(Debug, Clone, Copy)]
pub struct ChunkSizeEstimator {
    target: Duration,
    floor: u32,
    ceiling: u32,
}

impl Default for ChunkSizeEstimator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ChunkSizeEstimator {
    /// Estimator aiming at chunks that take `target` to read
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            floor: ChunkSize::MIN,
            ceiling: ChunkSize::MAX,
        }
    }

    /// Target duration of one chunk
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Choose the size of the chunk that follows a completed one.
    ///
    /// `input.remaining` must be non-zero; the returned size never exceeds it.
    pub fn estimate(&self, input: EstimateInput) -> ChunkEstimate {
        let floor = u64::from(self.floor);
        let ceiling = u64::from(self.ceiling);

        let mut candidate = u64::from(input.current_hint);
        let mut measured = false;

        if input.elapsed >= CLOCK_RESOLUTION {
            let scaled = f64::from(input.bytes_read) * self.target.as_secs_f64()
                / input.elapsed.as_secs_f64();
            // `as` saturates, so absurd ratios land on u64::MAX and get clamped below
            let scaled = scaled as u64;

            if scaled >= floor {
                candidate = scaled;
                measured = true;
            }
        }

        // Merge the tail first; the ceiling applies to the merged size too
        let remaining = input.remaining;
        if remaining <= candidate || remaining - candidate < candidate / 2 {
            candidate = remaining;
        }

        let mut hint = None;
        if candidate > ceiling {
            candidate = ceiling;
        } else if measured && candidate >= floor {
            hint = Some(candidate as u32);
        }

        ChunkEstimate {
            size: candidate.min(remaining) as u32,
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const KB: u32 = 1024;
    const MB: u32 = 1024 * 1024;

    fn input(bytes_read: u32, elapsed: Duration, current_hint: u32, remaining: u64) -> EstimateInput {
        EstimateInput {
            bytes_read,
            elapsed,
            current_hint,
            remaining,
        }
    }

    #[test]
    fn test_scales_up_after_fast_first_chunk() {
        // 150,000,000-byte file, first 64KB chunk took half a second
        let estimator = ChunkSizeEstimator::default();
        let remaining = 150_000_000 - 2 * u64::from(64 * KB);
        let estimate = estimator.estimate(input(64 * KB, Duration::from_millis(500), 64 * KB, remaining));

        assert!(estimate.size > 64 * KB);
        assert!(estimate.size <= 64 * MB);
        assert_eq!(estimate.size, 20 * 64 * KB);
        assert_eq!(estimate.hint, Some(20 * 64 * KB));
    }

    #[test]
    fn test_negligible_elapsed_reuses_hint() {
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(64 * KB, Duration::from_micros(3), 128 * KB, 10 * u64::from(MB)));

        assert_eq!(estimate.size, 128 * KB);
        assert_eq!(estimate.hint, None);
    }

    #[test]
    fn test_below_floor_falls_back_to_hint() {
        // 4KB over 20 seconds would give a 2KB candidate
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(4 * KB, Duration::from_secs(20), 64 * KB, 10 * u64::from(MB)));

        assert_eq!(estimate.size, 64 * KB);
        assert_eq!(estimate.hint, None);
    }

    #[test]
    fn test_ceiling_clamps_without_updating_hint() {
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(64 * MB, Duration::from_millis(100), 32 * MB, 10_000 * u64::from(MB)));

        assert_eq!(estimate.size, 64 * MB);
        assert_eq!(estimate.hint, None);
    }

    #[rstest]
    // remaining fits in the candidate
    #[case(1_000_000, 1_000_000)]
    // leftover after the candidate would be under half a candidate
    #[case(1_500_000, 1_500_000)]
    // leftover is exactly half: keep the candidate
    #[case(1_966_080, 1_310_720)]
    // plenty left
    #[case(10_000_000, 1_310_720)]
    fn test_tail_merge(#[case] remaining: u64, #[case] expected: u32) {
        // candidate is 1,310,720 (64KB in 0.5s scaled to 10s)
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(64 * KB, Duration::from_millis(500), 64 * KB, remaining));
        assert_eq!(estimate.size, expected);
    }

    #[test]
    fn test_merged_tail_past_ceiling_is_clamped() {
        // 6MB in 1s gives a 60MB candidate; 80MB left would leave a 20MB sliver,
        // so the tail is merged and the merged size clamped to the ceiling
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(6 * MB, Duration::from_secs(1), 64 * KB, 80 * u64::from(MB)));

        assert_eq!(estimate.size, 64 * MB);
        assert_eq!(estimate.hint, None);
    }

    #[test]
    fn test_merged_tail_within_ceiling_becomes_hint() {
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(64 * KB, Duration::from_millis(500), 64 * KB, 1_500_000));

        assert_eq!(estimate.size, 1_500_000);
        assert_eq!(estimate.hint, Some(1_500_000));
    }

    #[test]
    fn test_tail_merge_respects_ceiling() {
        let estimator = ChunkSizeEstimator::default();
        let remaining = u64::from(64 * MB) + 1;
        let estimate = estimator.estimate(input(64 * MB, Duration::from_millis(10), 64 * MB, remaining));
        assert_eq!(estimate.size, 64 * MB);
    }

    #[test]
    fn test_small_remaining_is_taken_whole() {
        let estimator = ChunkSizeEstimator::default();
        let estimate = estimator.estimate(input(64 * KB, Duration::from_millis(500), 64 * KB, 100));
        assert_eq!(estimate.size, 100);
    }

    proptest! {
        #[test]
        fn test_estimate_bounds(
            bytes_read in 0u32..=(64 * MB),
            elapsed_us in 0u64..100_000_000u64,
            hint in ChunkSize::MIN..=ChunkSize::MAX,
            remaining in 1u64..=(1u64 << 40),
        ) {
            let estimator = ChunkSizeEstimator::default();
            let estimate = estimator.estimate(input(bytes_read, Duration::from_micros(elapsed_us), hint, remaining));

            let size = u64::from(estimate.size);
            prop_assert!(size <= remaining);
            prop_assert!(estimate.size <= ChunkSize::MAX);
            prop_assert!(size >= remaining.min(u64::from(ChunkSize::MIN)));

            if let Some(new_hint) = estimate.hint {
                prop_assert!(new_hint >= ChunkSize::MIN && new_hint <= ChunkSize::MAX);
            }

            // No sliver: a non-final chunk leaves at least half of itself behind,
            // unless the ceiling forced the split
            let left = remaining - size;
            if left > 0 && remaining <= u64::from(ChunkSize::MAX) {
                prop_assert!(left >= size / 2);
            }
        }
    }
}
