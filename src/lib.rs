//! vmtrigger - decide when to start voicemail playback
//!
//! Listens to a call's audio and picks the single moment to start talking:
//! right after the answering machine's beep, after the greeting ends in
//! sustained silence, or at a hard timeout, whichever comes first.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod detect;
pub mod dsp;
pub mod error;
pub mod trigger;

// Audio input (source → normalizer)
pub use audio::{AudioInput, Chunk, PcmBuffer, SampleSource, StreamNormalizer, WavFile};

// Detection
pub use detect::{
    BeepDetector, DetectionEvent, DetectionMode, Detector, DetectorOutcome, GreetingEndDetector,
    run_detector,
};
pub use trigger::{CancellationFlag, RaceSlot, TieredTrigger};

// Error handling
pub use error::{Result, TriggerError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
