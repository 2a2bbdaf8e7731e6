//! Progress accounting and event throttling.
//!
//! Each worker owns one `ProgressTracker` holding the state that progress
//! callbacks mutate: last byte count, last sample wall-clock, last emit
//! wall-clock. The durable record is written for every sample; event
//! emissions are rate-limited to one per second per job, except for the
//! final 100% which always goes out.

use std::time::{Duration, Instant};

use grabbit_core::ProgressPatch;

/// Minimum wall-clock gap between progress event emissions for one job.
pub const EMIT_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the wall-clock delta in the speed calculation.
const MIN_DELTA_SECS: f64 = 0.001;

/// Per-job progress state machine.
pub struct ProgressTracker {
    last_bytes: u64,
    last_tick: Instant,
    last_emit: Option<Instant>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_bytes: 0,
            last_tick: Instant::now(),
            last_emit: None,
        }
    }

    /// Fold a `(current, total)` byte sample into a progress patch.
    ///
    /// Speed is instantaneous: `(current - last) / 1024 / Δt` KiB/s, with Δt
    /// floored at one millisecond. Progress is a percentage rounded to one
    /// decimal; the remaining-time estimate only exists while speed is
    /// positive.
    pub fn sample(&mut self, current: u64, total: u64) -> ProgressPatch {
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick).as_secs_f64().max(MIN_DELTA_SECS);

        #[allow(clippy::cast_precision_loss)]
        let speed = (current.saturating_sub(self.last_bytes) as f64 / 1024.0 / delta * 10.0)
            .round()
            / 10.0;
        self.last_bytes = current;
        self.last_tick = now;

        #[allow(clippy::cast_precision_loss)]
        let progress = if total > 0 {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        #[allow(clippy::cast_precision_loss)]
        let pending_time = if speed > 0.0 && total > current {
            Some((total - current) as f64 / (speed * 1024.0))
        } else {
            None
        };

        ProgressPatch {
            progress,
            downloaded_bytes: current,
            total_bytes: total,
            speed,
            pending_time,
        }
    }

    /// Whether an event may be emitted now (and records the emission).
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < EMIT_INTERVAL => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Seconds since the last emission (for side-channel cadence checks).
    #[must_use]
    pub fn since_last_emit(&self) -> Option<Duration> {
        self.last_emit.map(|t| t.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emit_is_allowed_then_throttled() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.should_emit());
        assert!(!tracker.should_emit());
    }

    #[test]
    fn emit_reopens_after_the_interval() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.should_emit());
        std::thread::sleep(Duration::from_millis(1050));
        assert!(tracker.should_emit());
    }

    #[test]
    fn sample_computes_percentage_and_bytes() {
        let mut tracker = ProgressTracker::new();
        let patch = tracker.sample(425, 1000);
        assert!((patch.progress - 42.5).abs() < f64::EPSILON);
        assert_eq!(patch.downloaded_bytes, 425);
        assert_eq!(patch.total_bytes, 1000);
        assert!(patch.speed > 0.0);
    }

    #[test]
    fn zero_total_keeps_progress_and_eta_empty() {
        let mut tracker = ProgressTracker::new();
        let patch = tracker.sample(1234, 0);
        assert!((patch.progress - 0.0).abs() < f64::EPSILON);
        assert_eq!(patch.pending_time, None);
    }

    #[test]
    fn speed_uses_byte_delta_not_absolute() {
        let mut tracker = ProgressTracker::new();
        tracker.sample(1_000_000, 2_000_000);
        std::thread::sleep(Duration::from_millis(20));
        let patch = tracker.sample(1_000_000, 2_000_000);
        // No new bytes between samples: speed collapses to zero
        assert!((patch.speed - 0.0).abs() < f64::EPSILON);
        assert_eq!(patch.pending_time, None);
    }
}
