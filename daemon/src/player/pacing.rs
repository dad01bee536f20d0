//! Wall-clock pacing for one playback session
//!
//! Every frame gets an offset from the session start: its presentation
//! timestamp relative to the first timestamp seen, or `index / fps` when the
//! frame carries none. The player sleeps until `start + offset` and then
//! emits. A frame is never emitted before its deadline; frames behind
//! schedule go out immediately. Each session builds a fresh clock, so delay
//! accumulated by one video never leaks into the next.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PacingClock {
    start: Instant,
    baseline: Option<Duration>,
    fps: f64,
}

impl PacingClock {
    /// Start a clock now. `fps` must be positive and finite.
    pub fn start(fps: f64) -> Self {
        Self::starting_at(Instant::now(), fps)
    }

    pub fn starting_at(start: Instant, fps: f64) -> Self {
        debug_assert!(fps.is_finite() && fps > 0.0);
        Self {
            start,
            baseline: None,
            fps,
        }
    }

    /// Offset from the session start at which frame `index` is due
    ///
    /// The first timestamp seen becomes the zero point. Timestamps earlier
    /// than it are due immediately.
    pub fn offset(&mut self, index: u64, timestamp: Option<Duration>) -> Duration {
        match timestamp {
            Some(ts) => {
                let baseline = *self.baseline.get_or_insert(ts);
                ts.saturating_sub(baseline)
            }
            None => Duration::from_secs_f64(index as f64 / self.fps),
        }
    }

    /// Absolute deadline for a given offset
    pub fn deadline(&self, offset: Duration) -> Instant {
        self.start + offset
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Block the calling thread until `offset` has passed. Returns how late
    /// the caller is relative to the deadline once it wakes.
    pub fn wait_until(&self, offset: Duration) -> Duration {
        let deadline = self.deadline(offset);
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        Instant::now().saturating_duration_since(deadline)
    }
}
