use crate::defaults;
use crate::error::{Result, TriggerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub beep: BeepConfig,
    pub vad: VadConfig,
    pub trigger: TriggerConfig,
}

/// Canonical chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub chunk_ms: u32,
    pub target_sample_rate: u32,
    pub realtime: bool,
}

/// Beep (tone) detector configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeepConfig {
    pub frequencies: Vec<f32>,
    pub ratio_threshold: f32,
    pub energy_floor: f32,
    pub onset_chunks: u32,
    pub offset_chunks: u32,
    pub buffer_ms: u64,
}

/// Greeting-end (adaptive noise floor VAD) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    pub ratio_threshold: f32,
    pub min_energy: f32,
    pub initial_noise_floor: f32,
    pub smoothing: f32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
}

/// Tiered trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriggerConfig {
    pub max_time_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_ms: defaults::CHUNK_MS,
            target_sample_rate: defaults::TARGET_SAMPLE_RATE,
            realtime: defaults::REALTIME,
        }
    }
}

impl Default for BeepConfig {
    fn default() -> Self {
        Self {
            frequencies: defaults::BEEP_FREQUENCIES.to_vec(),
            ratio_threshold: defaults::BEEP_RATIO_THRESHOLD,
            energy_floor: defaults::BEEP_ENERGY_FLOOR,
            onset_chunks: defaults::BEEP_ONSET_CHUNKS,
            offset_chunks: defaults::BEEP_OFFSET_CHUNKS,
            buffer_ms: defaults::BEEP_BUFFER_MS,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: defaults::VAD_RATIO_THRESHOLD,
            min_energy: defaults::VAD_MIN_ENERGY,
            initial_noise_floor: defaults::VAD_INITIAL_NOISE_FLOOR,
            smoothing: defaults::VAD_SMOOTHING,
            min_speech_ms: defaults::VAD_MIN_SPEECH_MS,
            min_silence_ms: defaults::VAD_MIN_SILENCE_MS,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_time_ms: defaults::MAX_TIME_MS,
        }
    }
}

impl AudioConfig {
    /// Samples per canonical chunk.
    pub fn target_samples(&self) -> usize {
        defaults::target_samples(self.target_sample_rate, self.chunk_ms)
    }

    /// Wall-clock length of one chunk.
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_ms as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_ms == 0 {
            return Err(TriggerError::invalid("audio.chunk_ms", "must be positive"));
        }
        if self.target_sample_rate == 0 {
            return Err(TriggerError::invalid(
                "audio.target_sample_rate",
                "must be positive",
            ));
        }
        if self.target_samples() == 0 {
            return Err(TriggerError::invalid(
                "audio.chunk_ms",
                format!(
                    "{}ms at {}Hz yields an empty chunk",
                    self.chunk_ms, self.target_sample_rate
                ),
            ));
        }
        Ok(())
    }
}

impl VadConfig {
    /// Consecutive speech chunks needed to confirm the greeting started.
    pub fn speech_frames_required(&self, chunk_ms: u32) -> u32 {
        self.min_speech_ms / chunk_ms.max(1)
    }

    /// Consecutive silent chunks needed to confirm the greeting ended.
    pub fn silence_frames_required(&self, chunk_ms: u32) -> u32 {
        self.min_silence_ms / chunk_ms.max(1)
    }
}

fn require_positive(key: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TriggerError::invalid(
            key,
            format!("must be a positive number, got {value}"),
        ))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TriggerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VMTRIGGER_MAX_TIME_MS → trigger.max_time_ms
    /// - VMTRIGGER_CHUNK_MS → audio.chunk_ms
    /// - VMTRIGGER_REALTIME → audio.realtime (true/false/1/0)
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_value("VMTRIGGER_MAX_TIME_MS") {
            match value.parse() {
                Ok(ms) => self.trigger.max_time_ms = ms,
                Err(e) => warn!("ignoring VMTRIGGER_MAX_TIME_MS={value}: {e}"),
            }
        }

        if let Some(value) = env_value("VMTRIGGER_CHUNK_MS") {
            match value.parse() {
                Ok(ms) => self.audio.chunk_ms = ms,
                Err(e) => warn!("ignoring VMTRIGGER_CHUNK_MS={value}: {e}"),
            }
        }

        if let Some(value) = env_value("VMTRIGGER_REALTIME") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.audio.realtime = true,
                "0" | "false" | "no" => self.audio.realtime = false,
                _ => warn!("ignoring VMTRIGGER_REALTIME={value}: expected true or false"),
            }
        }

        self
    }

    /// Check every value before any audio is touched.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;

        let nyquist = self.audio.target_sample_rate as f32 / 2.0;
        if self.beep.frequencies.is_empty() {
            return Err(TriggerError::invalid(
                "beep.frequencies",
                "at least one frequency is required",
            ));
        }
        if let Some(f) = self
            .beep
            .frequencies
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0 && **f < nyquist))
        {
            return Err(TriggerError::invalid(
                "beep.frequencies",
                format!("{f}Hz is outside (0, {nyquist})Hz"),
            ));
        }
        require_positive("beep.ratio_threshold", self.beep.ratio_threshold)?;
        require_positive("beep.energy_floor", self.beep.energy_floor)?;
        if self.beep.onset_chunks == 0 {
            return Err(TriggerError::invalid("beep.onset_chunks", "must be positive"));
        }
        if self.beep.offset_chunks == 0 {
            return Err(TriggerError::invalid(
                "beep.offset_chunks",
                "must be positive",
            ));
        }

        require_positive("vad.ratio_threshold", self.vad.ratio_threshold)?;
        require_positive("vad.min_energy", self.vad.min_energy)?;
        require_positive("vad.initial_noise_floor", self.vad.initial_noise_floor)?;
        if !(self.vad.smoothing > 0.0 && self.vad.smoothing < 1.0) {
            return Err(TriggerError::invalid(
                "vad.smoothing",
                format!("must be in (0, 1), got {}", self.vad.smoothing),
            ));
        }
        if self.vad.min_speech_ms < self.audio.chunk_ms {
            return Err(TriggerError::invalid(
                "vad.min_speech_ms",
                "must be at least one chunk long",
            ));
        }
        if self.vad.min_silence_ms < self.audio.chunk_ms {
            return Err(TriggerError::invalid(
                "vad.min_silence_ms",
                "must be at least one chunk long",
            ));
        }

        if self.trigger.max_time_ms == 0 {
            return Err(TriggerError::invalid(
                "trigger.max_time_ms",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vmtrigger/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vmtrigger").join("config.toml"))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
