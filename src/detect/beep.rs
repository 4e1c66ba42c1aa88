//! Answering-machine beep detection.
//!
//! A chunk is tone-present when the strongest Goertzel power in the beep
//! band holds more than `ratio_threshold` of the chunk's total energy. The
//! detector needs `onset_chunks` tone chunks in a row to believe a beep
//! started, then `offset_chunks` non-tone chunks in a row to call its end.

use crate::audio::Chunk;
use crate::config::{AudioConfig, BeepConfig};
use crate::detect::{DetectionEvent, DetectionMode, Detector};
use crate::dsp;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepState {
    Listening,
    Beeping,
}

/// Tone-energy measurement for one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMeasurement {
    /// Mean squared normalized sample.
    pub total_energy: f32,
    /// Strongest normalized Goertzel power across the band.
    pub max_power: f32,
    /// `max_power / total_energy`, or 0 below the energy floor.
    pub ratio: f32,
}

pub struct BeepDetector {
    config: BeepConfig,
    sample_rate: u32,
    chunk_ms: u64,
    state: BeepState,
    beep_counter: u32,
    miss_counter: u32,
    current_time_ms: u64,
    fired: bool,
}

impl BeepDetector {
    pub fn new(config: &BeepConfig, audio: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            sample_rate: audio.target_sample_rate,
            chunk_ms: audio.chunk_ms as u64,
            state: BeepState::Listening,
            beep_counter: 0,
            miss_counter: 0,
            current_time_ms: 0,
            fired: false,
        }
    }

    pub fn state(&self) -> BeepState {
        self.state
    }

    /// Consecutive tone chunks seen while listening.
    pub fn onset_count(&self) -> u32 {
        self.beep_counter
    }

    /// Consecutive non-tone chunks seen while beeping.
    pub fn miss_count(&self) -> u32 {
        self.miss_counter
    }

    pub fn measure(&self, samples: &[i16]) -> ToneMeasurement {
        let normalized = dsp::normalize(samples);
        let total_energy = dsp::mean_square(&normalized);
        let max_power = dsp::max_band_power(&normalized, &self.config.frequencies, self.sample_rate);
        let ratio = if total_energy > self.config.energy_floor {
            max_power / total_energy
        } else {
            0.0
        };
        ToneMeasurement {
            total_energy,
            max_power,
            ratio,
        }
    }

    fn step(&mut self, tone_present: bool) -> Option<DetectionEvent> {
        match self.state {
            BeepState::Listening => {
                if tone_present {
                    self.beep_counter += 1;
                    if self.beep_counter >= self.config.onset_chunks {
                        debug!(at_ms = self.current_time_ms, "beep onset confirmed");
                        self.state = BeepState::Beeping;
                        self.beep_counter = 0;
                        self.miss_counter = 0;
                    }
                } else {
                    self.beep_counter = 0;
                }
            }
            BeepState::Beeping => {
                if tone_present {
                    self.miss_counter = 0;
                } else {
                    self.miss_counter += 1;
                    if self.miss_counter >= self.config.offset_chunks {
                        let timestamp_ms = self.current_time_ms + self.config.buffer_ms;
                        info!(
                            beep_end_ms = self.current_time_ms,
                            timestamp_ms, "beep end confirmed"
                        );
                        return Some(DetectionEvent::detected(DetectionMode::Beep, timestamp_ms));
                    }
                }
            }
        }
        None
    }
}

impl Detector for BeepDetector {
    fn name(&self) -> &'static str {
        "beep"
    }

    fn process(&mut self, chunk: &Chunk) -> Option<DetectionEvent> {
        if self.fired {
            return None;
        }

        let tone_present = self.measure(chunk.samples()).ratio > self.config.ratio_threshold;
        let event = self.step(tone_present);
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
