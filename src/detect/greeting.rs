//! Greeting-end detection with an adaptive noise floor.
//!
//! Speech is energy well above the line's background level. The background
//! level is tracked by exponential smoothing over quiet chunks only, so a
//! long greeting cannot raise the floor and hide itself. Once enough speech
//! has been heard, a long enough run of non-speech marks the greeting's end.

use crate::audio::Chunk;
use crate::config::{AudioConfig, VadConfig};
use crate::defaults::VAD_FLOOR_EPSILON;
use crate::detect::{DetectionEvent, DetectionMode, Detector};
use crate::dsp;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingState {
    AwaitingSpeech,
    HeardSpeech,
}

/// Background energy estimate owned by one detector run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseFloor {
    value: f32,
    smoothing: f32,
}

impl NoiseFloor {
    pub fn new(initial: f32, smoothing: f32) -> Self {
        Self {
            value: initial,
            smoothing,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// `rms / floor`, or 0 while the floor is effectively zero.
    pub fn ratio(&self, rms: f32) -> f32 {
        if self.value > VAD_FLOOR_EPSILON {
            rms / self.value
        } else {
            0.0
        }
    }

    /// Fold `rms` into the floor if it is background (below `floor * threshold`).
    ///
    /// Returns whether the floor moved.
    pub fn observe(&mut self, rms: f32, threshold: f32) -> bool {
        if rms < self.value * threshold {
            self.value = self.smoothing * self.value + (1.0 - self.smoothing) * rms;
            true
        } else {
            false
        }
    }
}

/// Speech classification for one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechMeasurement {
    pub rms: f32,
    /// Ratio against the floor as it was before this chunk.
    pub ratio: f32,
    pub is_speech: bool,
}

pub struct GreetingEndDetector {
    config: VadConfig,
    chunk_ms: u64,
    speech_frames_required: u32,
    silence_frames_required: u32,
    noise_floor: NoiseFloor,
    state: GreetingState,
    speech_frames: u32,
    silence_frames: u32,
    current_time_ms: u64,
    fired: bool,
}

impl GreetingEndDetector {
    pub fn new(config: &VadConfig, audio: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            chunk_ms: audio.chunk_ms as u64,
            speech_frames_required: config.speech_frames_required(audio.chunk_ms).max(1),
            silence_frames_required: config.silence_frames_required(audio.chunk_ms).max(1),
            noise_floor: NoiseFloor::new(config.initial_noise_floor, config.smoothing),
            state: GreetingState::AwaitingSpeech,
            speech_frames: 0,
            silence_frames: 0,
            current_time_ms: 0,
            fired: false,
        }
    }

    pub fn state(&self) -> GreetingState {
        self.state
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor.value()
    }

    pub fn speech_frames(&self) -> u32 {
        self.speech_frames
    }

    pub fn silence_frames(&self) -> u32 {
        self.silence_frames
    }

    /// Classify one chunk and let the floor learn from it if it is background.
    fn measure(&mut self, samples: &[i16]) -> SpeechMeasurement {
        let rms = dsp::rms(&dsp::normalize(samples));
        let ratio = self.noise_floor.ratio(rms);
        self.noise_floor.observe(rms, self.config.ratio_threshold);
        let is_speech = ratio > self.config.ratio_threshold && rms > self.config.min_energy;
        SpeechMeasurement {
            rms,
            ratio,
            is_speech,
        }
    }

    fn step(&mut self, is_speech: bool) -> Option<DetectionEvent> {
        if is_speech {
            self.speech_frames += 1;
            self.silence_frames = 0;
            if self.state == GreetingState::AwaitingSpeech
                && self.speech_frames >= self.speech_frames_required
            {
                debug!(at_ms = self.current_time_ms, "greeting speech confirmed");
                self.state = GreetingState::HeardSpeech;
            }
            return None;
        }

        match self.state {
            GreetingState::AwaitingSpeech => {
                self.speech_frames = 0;
                None
            }
            GreetingState::HeardSpeech => {
                self.silence_frames += 1;
                self.speech_frames = 0;
                if self.silence_frames >= self.silence_frames_required {
                    info!(
                        timestamp_ms = self.current_time_ms,
                        noise_floor = self.noise_floor.value(),
                        "greeting end confirmed"
                    );
                    Some(DetectionEvent::detected(
                        DetectionMode::Vad,
                        self.current_time_ms,
                    ))
                } else {
                    None
                }
            }
        }
    }
}

impl Detector for GreetingEndDetector {
    fn name(&self) -> &'static str {
        "vad"
    }

    fn process(&mut self, chunk: &Chunk) -> Option<DetectionEvent> {
        if self.fired {
            return None;
        }

        let measurement = self.measure(chunk.samples());
        let event = self.step(measurement.is_speech);
        match event {
            Some(_) => self.fired = true,
            None => self.current_time_ms += self.chunk_ms,
        }
        event
    }

    fn elapsed_ms(&self) -> u64 {
        self.current_time_ms
    }
}
