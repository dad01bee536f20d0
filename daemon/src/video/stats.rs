//! Playback statistics tracking
//!
//! Counters for a single playback session:
//! - Frames emitted and skipped
//! - Display write failures
//! - How far behind schedule frames went out

use std::time::{Duration, Instant};

/// Emissions later than this count as late
pub const LATE_THRESHOLD: Duration = Duration::from_millis(10);

/// Tracks playback statistics for one session
#[derive(Debug, Clone)]
pub struct PlaybackStats {
    /// Frames handed to the display
    frames_emitted: u64,

    /// Frames dropped because they failed to decode
    frames_skipped: u64,

    /// Frames the display refused or failed to transfer
    write_failures: u64,

    /// Frames emitted more than `LATE_THRESHOLD` after their deadline
    frames_late: u64,

    /// Largest lateness seen this session
    worst_lateness: Duration,

    /// When the session started
    started: Instant,
}

impl PlaybackStats {
    /// Create new statistics tracker
    pub fn new() -> Self {
        Self {
            frames_emitted: 0,
            frames_skipped: 0,
            write_failures: 0,
            frames_late: 0,
            worst_lateness: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Record a frame that reached the display `lateness` after its deadline
    pub fn record_emitted(&mut self, lateness: Duration) {
        self.frames_emitted += 1;
        if lateness > LATE_THRESHOLD {
            self.frames_late += 1;
        }
        self.worst_lateness = self.worst_lateness.max(lateness);
    }

    pub fn record_skipped(&mut self) {
        self.frames_skipped += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn frames_late(&self) -> u64 {
        self.frames_late
    }

    pub fn worst_lateness(&self) -> Duration {
        self.worst_lateness
    }

    /// Wall-clock time since the session started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Share of emitted frames that went out late, as a percentage
    pub fn late_rate(&self) -> f64 {
        if self.frames_emitted == 0 {
            0.0
        } else {
            (self.frames_late as f64 / self.frames_emitted as f64) * 100.0
        }
    }

    /// Log a one-line summary
    pub fn log_summary(&self, label: &str) {
        log::info!(
            "{}: {} emitted, {} skipped, {} write failures in {:.1}s ({:.1}% late, worst {:.1}ms)",
            label,
            self.frames_emitted,
            self.frames_skipped,
            self.write_failures,
            self.elapsed().as_secs_f64(),
            self.late_rate(),
            self.worst_lateness.as_secs_f64() * 1000.0
        );
    }
}

impl Default for PlaybackStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_frames_counted() {
        let mut stats = PlaybackStats::new();
        stats.record_emitted(Duration::from_millis(1));
        stats.record_emitted(Duration::from_millis(25));
        stats.record_emitted(Duration::ZERO);
        stats.record_emitted(Duration::from_millis(12));

        assert_eq!(stats.frames_emitted(), 4);
        assert_eq!(stats.frames_late(), 2);
        assert_eq!(stats.worst_lateness(), Duration::from_millis(25));
        assert!((stats.late_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_session_rate() {
        let mut stats = PlaybackStats::new();
        stats.record_skipped();
        stats.record_write_failure();
        assert_eq!(stats.late_rate(), 0.0);
        assert_eq!(stats.frames_skipped(), 1);
        assert_eq!(stats.write_failures(), 1);
    }
}
