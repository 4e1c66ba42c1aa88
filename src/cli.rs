//! Command-line interface for vmtrigger
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `--version` text, with the git hash when the build embedded one.
fn version() -> &'static str {
    static VERSION: LazyLock<String> = LazyLock::new(crate::version_string);
    VERSION.as_str()
}

/// Decide when to start voicemail playback from call audio
#[derive(Parser, Debug)]
#[command(name = "vmtrigger", version = version(), about = "Decide when to start voicemail playback")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Options shared by every command that reads a recording.
#[derive(Args, Debug, Clone)]
pub struct AudioArgs {
    /// 16-bit PCM WAV file (mono or stereo, any sample rate)
    #[arg(value_name = "WAV")]
    pub input: PathBuf,

    /// Process as fast as possible instead of at call pace
    #[arg(long)]
    pub no_realtime: bool,

    /// Chunk duration in milliseconds
    #[arg(long, value_name = "MS")]
    pub chunk_ms: Option<u32>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Race beep and greeting-end detection against a timeout
    Detect {
        #[command(flatten)]
        audio: AudioArgs,

        /// Give up after this long (default: 25s). Examples: 25000, 25s, 1m
        #[arg(long, short = 't', value_name = "DURATION", value_parser = parse_millis)]
        max_time: Option<u64>,
    },

    /// Run only the beep detector
    Beep {
        #[command(flatten)]
        audio: AudioArgs,
    },

    /// Run only the greeting-end detector
    Vad {
        #[command(flatten)]
        audio: AudioArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Config subcommand actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Parse a duration into milliseconds.
///
/// Bare numbers are milliseconds; anything else goes through `humantime`
/// (`25s`, `1m`, `1m30s`).
pub fn parse_millis(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_millis_accepts_bare_numbers_and_units() {
        assert_eq!(parse_millis("25000"), Ok(25_000));
        assert_eq!(parse_millis("25s"), Ok(25_000));
        assert_eq!(parse_millis("1m30s"), Ok(90_000));
        assert_eq!(parse_millis(" 500ms "), Ok(500));
        assert!(parse_millis("soon").is_err());
    }

    #[test]
    fn detect_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "vmtrigger",
            "-vv",
            "detect",
            "call.wav",
            "--no-realtime",
            "--chunk-ms",
            "10",
            "--max-time",
            "30s",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Detect { audio, max_time } => {
                assert_eq!(audio.input, PathBuf::from("call.wav"));
                assert!(audio.no_realtime);
                assert_eq!(audio.chunk_ms, Some(10));
                assert_eq!(max_time, Some(30_000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn version_flag_reports_build_version() {
        let err = Cli::try_parse_from(["vmtrigger", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert_eq!(
            Cli::command().get_version(),
            Some(crate::version_string().as_str())
        );
    }

    #[test]
    fn beep_requires_input() {
        assert!(Cli::try_parse_from(["vmtrigger", "beep"]).is_err());
    }

    #[test]
    fn config_init_force() {
        let cli = Cli::try_parse_from(["vmtrigger", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
