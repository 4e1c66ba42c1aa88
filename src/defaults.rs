//! Default configuration constants for vmtrigger.
//!
//! Every tunable used by the normalizer, the detectors and the tiered trigger
//! lives here so the config layer and the detector constructors agree.

/// Canonical chunk duration in milliseconds.
///
/// 20ms is the standard VoIP packetization interval.
pub const CHUNK_MS: u32 = 20;

/// Canonical output sample rate in Hz (narrowband telephony).
pub const TARGET_SAMPLE_RATE: u32 = 8000;

/// Highest source sample rate accepted; the resampling filter grows with
/// the rate ratio.
pub const MAX_SOURCE_SAMPLE_RATE: u32 = 384_000;

/// Emit chunks at wall-clock rate, modelling a live call.
pub const REALTIME: bool = true;

/// Candidate beep tones, 850..=1150 Hz in 50 Hz steps.
///
/// Answering machines do not agree on a single beep frequency; scanning a
/// band tolerates drift across equipment.
pub const BEEP_FREQUENCIES: [f32; 7] = [850.0, 900.0, 950.0, 1000.0, 1050.0, 1100.0, 1150.0];

/// Tone power / total energy ratio above which a chunk counts as tone-present.
pub const BEEP_RATIO_THRESHOLD: f32 = 0.5;

/// Total energy below this is treated as silence (ratio forced to 0).
pub const BEEP_ENERGY_FLOOR: f32 = 1e-6;

/// Consecutive tone chunks needed to confirm a beep started (~200ms).
pub const BEEP_ONSET_CHUNKS: u32 = 10;

/// Consecutive non-tone chunks needed to confirm the beep ended (~80ms).
pub const BEEP_OFFSET_CHUNKS: u32 = 4;

/// Margin added after the beep end so playback does not clip its first word.
pub const BEEP_BUFFER_MS: u64 = 200;

/// How much louder than the noise floor a chunk must be to count as speech.
pub const VAD_RATIO_THRESHOLD: f32 = 1.5;

/// Absolute RMS below which a chunk is never speech.
pub const VAD_MIN_ENERGY: f32 = 0.005;

/// Starting noise floor estimate; adapts to the line within a few seconds.
pub const VAD_INITIAL_NOISE_FLOOR: f32 = 0.01;

/// Exponential smoothing factor for the noise floor (0.95 = slow adaptation).
pub const VAD_SMOOTHING: f32 = 0.95;

/// Floor values at or below this are treated as zero.
pub const VAD_FLOOR_EPSILON: f32 = 1e-6;

/// Speech needed to confirm the greeting started.
pub const VAD_MIN_SPEECH_MS: u32 = 300;

/// Silence after speech needed to confirm the greeting ended.
pub const VAD_MIN_SILENCE_MS: u32 = 1200;

/// Hard cap on how long the tiered trigger waits before falling back.
pub const MAX_TIME_MS: u64 = 25_000;

/// Number of canonical samples in one chunk.
///
/// Returns 0 when the parameters cannot produce a chunk; callers validate.
pub fn target_samples(sample_rate: u32, chunk_ms: u32) -> usize {
    (sample_rate as u64 * chunk_ms as u64 / 1000) as usize
}
