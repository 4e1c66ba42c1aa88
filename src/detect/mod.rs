//! Detection state machines and the loop that drives them.
//!
//! Each detector is an explicit state machine with a single
//! [`Detector::process`] step; [`run_detector`] owns iteration, cancellation
//! and the end-of-stream sentinel.

pub mod beep;
pub mod greeting;

pub use beep::{BeepDetector, BeepState};
pub use greeting::{GreetingEndDetector, GreetingState, NoiseFloor};

use crate::audio::Chunk;
use crate::error::{Result, TriggerError};
use crate::trigger::CancellationFlag;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which tier produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    Beep,
    Vad,
    Timeout,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Beep => "beep",
            DetectionMode::Vad => "vad",
            DetectionMode::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Sent,
}

/// The moment voicemail playback should start.
///
/// `mode` is `None` only for a standalone detector that ran out of audio;
/// the tiered trigger never returns such an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub timestamp_ms: u64,
    pub mode: Option<DetectionMode>,
    pub status: EventStatus,
}

impl DetectionEvent {
    pub fn detected(mode: DetectionMode, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            mode: Some(mode),
            status: EventStatus::Sent,
        }
    }

    /// Sentinel for "stream ended without a detection".
    pub fn exhausted(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            mode: None,
            status: EventStatus::Sent,
        }
    }

    pub fn timeout(max_time_ms: u64) -> Self {
        Self::detected(DetectionMode::Timeout, max_time_ms)
    }

    /// True unless this is the exhaustion sentinel.
    pub fn is_detection(&self) -> bool {
        self.mode.is_some()
    }
}

/// A per-chunk detection state machine.
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    /// Feed one chunk; returns the event on the chunk that confirms detection.
    ///
    /// After an event has been returned, further calls return `None`.
    fn process(&mut self, chunk: &Chunk) -> Option<DetectionEvent>;

    /// Stream time consumed so far.
    fn elapsed_ms(&self) -> u64;
}

/// How a detector run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorOutcome {
    Detected(DetectionEvent),
    /// Ran out of chunks; carries the sentinel event.
    Exhausted(DetectionEvent),
    /// Stopped because the cancellation flag was set; nothing to report.
    Cancelled,
}

impl DetectorOutcome {
    /// The event a standalone run reports (`None` when cancelled).
    pub fn event(&self) -> Option<DetectionEvent> {
        match self {
            DetectorOutcome::Detected(event) | DetectorOutcome::Exhausted(event) => Some(*event),
            DetectorOutcome::Cancelled => None,
        }
    }
}

/// Drive `detector` over `chunks` until it fires, the chunks run out or
/// `cancel` is set.
///
/// Cancellation is checked before every chunk. A decode error partway
/// through the audio (a truncated recording) ends the run as if the audio
/// had ended there; other stream errors are returned.
pub fn run_detector<D, I>(
    detector: &mut D,
    chunks: I,
    cancel: Option<&CancellationFlag>,
) -> Result<DetectorOutcome>
where
    D: Detector + ?Sized,
    I: IntoIterator<Item = Result<Chunk>>,
{
    let cancelled = || cancel.is_some_and(CancellationFlag::is_cancelled);

    for chunk in chunks {
        if cancelled() {
            return Ok(DetectorOutcome::Cancelled);
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(TriggerError::AudioFormat { message }) => {
                warn!(
                    detector = detector.name(),
                    elapsed_ms = detector.elapsed_ms(),
                    "audio ended early: {message}"
                );
                break;
            }
            Err(e) => return Err(e),
        };
        if let Some(event) = detector.process(&chunk) {
            return Ok(DetectorOutcome::Detected(event));
        }
    }

    if cancelled() {
        return Ok(DetectorOutcome::Cancelled);
    }
    Ok(DetectorOutcome::Exhausted(DetectionEvent::exhausted(
        detector.elapsed_ms(),
    )))
}
