//! Captured frames, frame sources and the live recognition loop.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::recognizer::Recognizer;
use crate::session::{Session, SessionError};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to read capture source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode capture image: {0}")]
    Image(#[from] image::ImageError),
}

/// One captured frame: RGB8 pixels plus provenance.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Row-major RGB8 pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Identifier assigned by the capture surface — a file path, a camera
    /// sequence number. Backends that key side data off the frame use it.
    pub origin: Option<String>,
}

impl Frame {
    /// Convert a decoded image into a frame, normalizing to RGB8.
    pub fn from_image(image: &image::DynamicImage, origin: Option<String>) -> Self {
        let rgb = image.to_rgb8();
        Self {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
            origin,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Where live-mode frames come from.
///
/// No `Send` bound on the future: the live loop runs on the session's
/// single cooperative thread.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// The current frame, or `None` once the capture surface is gone
    /// (stream stopped, snapshot file deleted). `None` ends the live
    /// loop cleanly.
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// Finite scripted source: yields its frames once, then reports the
/// surface as gone.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<Frame>,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        Ok(self.frames.pop_front())
    }
}

/// Counters from one live run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LiveStats {
    /// Completed recognition cycles.
    pub cycles: usize,
    /// Cycles abandoned because the frame or the recognizer failed.
    pub failed_cycles: usize,
}

/// Drive a session from a frame source on a fixed interval until the
/// source reports teardown or `shutdown` flips to `true`.
///
/// The first capture happens one full interval after start. Each cycle is
/// awaited to completion before the next tick is honored, so recognition
/// calls never overlap; after a cycle slower than the interval the timer
/// waits a full interval instead of firing a burst of catch-up ticks.
/// Frame and recognition failures are logged and skipped — they never end
/// the run.
pub async fn run_live<R, S>(
    session: &mut Session<R>,
    source: &mut S,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<LiveStats, SessionError>
where
    R: Recognizer,
    S: FrameSource,
{
    if !session.is_ready() {
        return Err(SessionError::RecognitionUnavailable);
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stats = LiveStats::default();
    info!(interval_ms = interval.as_millis() as u64, "live capture started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as a shutdown request.
                if changed.is_err() || *shutdown.borrow() {
                    info!(cycles = stats.cycles, "live capture stopped");
                    break;
                }
            }
            _ = ticker.tick() => {
                let frame = match source.next_frame().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!(cycles = stats.cycles, "capture surface gone; stopping live capture");
                        break;
                    }
                    Err(err) => {
                        stats.failed_cycles += 1;
                        warn!(error = %err, "frame capture failed; skipping cycle");
                        continue;
                    }
                };
                match session.recognize(&frame).await {
                    Ok(outcome) => {
                        stats.cycles += 1;
                        debug!(
                            faces = outcome.results.len(),
                            newly_present = outcome.reconciliation.transitions.len(),
                            "recognition cycle complete"
                        );
                    }
                    Err(err) => {
                        stats.failed_cycles += 1;
                        warn!(error = %err, "recognition cycle failed; session continues");
                    }
                }
            }
        }
    }

    Ok(stats)
}
