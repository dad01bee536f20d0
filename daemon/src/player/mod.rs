//! Foreground playback loop
//!
//! The player drains the queue one video at a time. Each video is a session:
//! open it, pace its frames onto the display against a fresh [`PacingClock`],
//! then delete the file. Sessions move through
//! `Opening -> Streaming -> Closed`, and every way of reaching `Closed`
//! (end of stream, decode failure, hitting the duration ceiling) ends with
//! the file being removed exactly once.
//!
//! The player runs on its own OS thread. Both of its waits, the empty queue
//! and the per-frame deadline, block only that thread.

mod pacing;

pub use pacing::PacingClock;

use common::{FrameError, MediaHandle, Resolution};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::{PlayerSettings, QueueSettings};
use crate::display::{DisplayError, DisplaySink};
use crate::log_and_continue;
use crate::queue::QueueConsumer;
use crate::video::stats::PlaybackStats;
use crate::video::{Decoder, FrameSource};

/// How often the startup buffer check looks at the queue
const BUFFER_POLL: Duration = Duration::from_millis(100);

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The source ran out of frames
    Finished,
    /// Stopped at the playback ceiling
    Truncated,
    /// The source could not be opened or broke mid-stream
    Failed(String),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Truncated => write!(f, "truncated"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Result of playing one video
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: String,
    pub outcome: SessionOutcome,
    pub stats: PlaybackStats,
}

/// Consumer half of the pipeline
pub struct Player<C, S> {
    decoder: C,
    sink: S,
    resolution: Resolution,
    max_playback: Duration,
    fallback_fps: f64,
    min_buffered: usize,
    low_water: usize,
}

impl<C: Decoder, S: DisplaySink> Player<C, S> {
    pub fn new(decoder: C, sink: S, player: &PlayerSettings, queue: &QueueSettings) -> Self {
        let resolution = sink.resolution();
        Self {
            decoder,
            sink,
            resolution,
            max_playback: player.max_playback(),
            fallback_fps: player.fallback_fps,
            min_buffered: queue.min_buffered,
            low_water: queue.low_water,
        }
    }

    /// Play videos until the queue's producer is gone and the queue is empty.
    /// Returns the number of sessions played.
    pub fn run(mut self, mut queue: QueueConsumer) -> u64 {
        if self.min_buffered > 1 {
            log::info!(
                "Buffering {} videos before starting playback",
                self.min_buffered
            );
            if !queue.wait_for(self.min_buffered, BUFFER_POLL) {
                log::warn!("Acquirer stopped while buffering, playing what is queued");
            }
        }

        let mut sessions = 0;
        while let Some(handle) = queue.take() {
            self.play(handle);
            sessions += 1;

            let queued = queue.len();
            if queued < self.low_water {
                log::warn!("Queue running low: {} video(s) buffered", queued);
            }
        }

        log::info!("Player stopped after {} sessions", sessions);
        sessions
    }

    /// Play one video and remove its file, whatever happens
    pub fn play(&mut self, handle: MediaHandle) -> SessionReport {
        let id = handle.id().to_string();
        log::info!("Playing {}", handle);

        let (outcome, stats) = self.stream(&handle);

        let label = format!("Session {} {}", id, outcome);
        stats.log_summary(&label);

        log_and_continue!(handle.dispose(), format!("remove scratch file for {}", id));

        SessionReport { id, outcome, stats }
    }

    fn stream(&mut self, handle: &MediaHandle) -> (SessionOutcome, PlaybackStats) {
        let mut stats = PlaybackStats::new();

        log::debug!("{}: opening", handle.id());
        let source = match self.decoder.open(handle, self.resolution) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Could not open {}: {}", handle.id(), e);
                return (SessionOutcome::Failed(e.to_string()), stats);
            }
        };

        let fps = source
            .nominal_fps()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(self.fallback_fps);
        let mut clock = PacingClock::start(fps);
        log::debug!("{}: streaming at nominal {:.2} fps", handle.id(), fps);

        let mut outcome = SessionOutcome::Finished;
        let mut items = source.enumerate();
        loop {
            // The ceiling applies to every pull, frame or not
            if self.ceiling_reached(&clock) {
                outcome = SessionOutcome::Truncated;
                break;
            }
            let Some((index, item)) = items.next() else {
                break;
            };
            if self.ceiling_reached(&clock) {
                outcome = SessionOutcome::Truncated;
                break;
            }

            let decoded = match item {
                Ok(decoded) => decoded,
                Err(FrameError::Corrupt(reason)) => {
                    // The ordinal still advances, keeping later frames on schedule
                    log::debug!("{}: skipping frame {}: {}", handle.id(), index, reason);
                    stats.record_skipped();
                    continue;
                }
                Err(FrameError::Stream(reason)) => {
                    log::warn!("{}: stream ended early: {}", handle.id(), reason);
                    outcome = SessionOutcome::Failed(reason);
                    break;
                }
            };

            let offset = clock.offset(index as u64, decoded.timestamp);
            if offset >= self.max_playback {
                log::debug!(
                    "{}: frame {} due at +{:.1}s, past the ceiling",
                    handle.id(),
                    index,
                    offset.as_secs_f64()
                );
                outcome = SessionOutcome::Truncated;
                break;
            }

            let lateness = clock.wait_until(offset);
            match self.sink.write(&decoded.frame) {
                Ok(()) => {
                    stats.record_emitted(lateness);
                    log::trace!(
                        "{}: frame {} at +{:.1}ms ({:.1}ms late)",
                        handle.id(),
                        index,
                        offset.as_secs_f64() * 1000.0,
                        lateness.as_secs_f64() * 1000.0
                    );
                }
                Err(e) => {
                    stats.record_write_failure();
                    self.report_write_failure(handle, index, &e, stats.write_failures());
                }
            }
        }

        (outcome, stats)
    }

    fn ceiling_reached(&self, clock: &PacingClock) -> bool {
        let reached = clock.elapsed() >= self.max_playback;
        if reached {
            log::debug!(
                "Session reached its {:.1}s ceiling",
                self.max_playback.as_secs_f64()
            );
        }
        reached
    }

    fn report_write_failure(
        &self,
        handle: &MediaHandle,
        index: usize,
        error: &DisplayError,
        count: u64,
    ) {
        // A failing panel fails every frame; only the first gets a warning
        if count == 1 {
            log::warn!("{}: display rejected frame {}: {}", handle.id(), index, error);
        } else {
            log::debug!("{}: display rejected frame {}: {}", handle.id(), index, error);
        }
    }
}

impl<C: Decoder + 'static, S: DisplaySink + 'static> Player<C, S> {
    /// Start [`Player::run`] on a thread named `player`
    ///
    /// The receiver yields the session count once the player stops. Awaiting
    /// it occupies no runtime thread, and dropping the runtime does not wait
    /// for playback to end.
    pub fn spawn(self, queue: QueueConsumer) -> std::io::Result<oneshot::Receiver<u64>> {
        let (done_tx, done_rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("player".to_string())
            .spawn(move || {
                let sessions = self.run(queue);
                if done_tx.send(sessions).is_err() {
                    log::debug!("Player finished with nobody waiting");
                }
            })?;
        Ok(done_rx)
    }
}
