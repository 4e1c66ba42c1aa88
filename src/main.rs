use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vmtrigger::audio::StreamNormalizer;
use vmtrigger::cli::{AudioArgs, Cli, Commands, ConfigAction};
use vmtrigger::config::Config;
use vmtrigger::detect::{BeepDetector, DetectionEvent, Detector, GreetingEndDetector, run_detector};
use vmtrigger::{TieredTrigger, WavFile};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Detect { audio, max_time } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_audio_args(&mut config, &audio);
            if let Some(ms) = max_time {
                config.trigger.max_time_ms = ms;
            }

            let trigger = TieredTrigger::new(config);
            let event = trigger
                .run(&WavFile::new(&audio.input))
                .with_context(|| format!("detection failed for {}", audio.input.display()))?;
            report(&event)?;
        }
        Commands::Beep { audio } => {
            let config = configured(cli.config.as_deref(), &audio)?;
            let detector = BeepDetector::new(&config.beep, &config.audio);
            run_standalone(detector, &config, &audio.input)?;
        }
        Commands::Vad { audio } => {
            let config = configured(cli.config.as_deref(), &audio)?;
            let detector = GreetingEndDetector::new(&config.vad, &config.audio);
            run_standalone(detector, &config, &audio.input)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "vmtrigger",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise -q/-v pick the level.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(Config::default_path)
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match (explicit, config_path(explicit)) {
        // An explicitly named file must exist
        (Some(path), _) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, Some(path)) => Config::load_or_default(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, None) => Config::default(),
    };
    Ok(config.with_env_overrides())
}

fn apply_audio_args(config: &mut Config, audio: &AudioArgs) {
    if audio.no_realtime {
        config.audio.realtime = false;
    }
    if let Some(ms) = audio.chunk_ms {
        config.audio.chunk_ms = ms;
    }
}

fn configured(explicit: Option<&Path>, audio: &AudioArgs) -> Result<Config> {
    let mut config = load_config(explicit)?;
    apply_audio_args(&mut config, audio);
    config.validate()?;
    Ok(config)
}

fn run_standalone<D: Detector>(mut detector: D, config: &Config, input: &Path) -> Result<()> {
    let source = WavFile::new(input)
        .open_file()
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let chunks = StreamNormalizer::new(Box::new(source), &config.audio)?;
    let outcome = run_detector(&mut detector, chunks, None)?;
    match outcome.event() {
        Some(event) => report(&event),
        None => bail!("{} detector was cancelled", detector.name()),
    }
}

fn report(event: &DetectionEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);

    if std::io::stderr().is_terminal() {
        let mode = event.mode.map(|m| m.as_str()).unwrap_or("none");
        let line = format!("start playback at {} ms ({})", event.timestamp_ms, mode);
        if event.mode.is_some() {
            eprintln!("{}", line.green());
        } else {
            eprintln!("{}", line.yellow());
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(explicit)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => match config_path(explicit) {
            Some(path) => println!("{}", path.display()),
            None => bail!("Could not determine config directory"),
        },
        ConfigAction::Init { force } => {
            let Some(path) = config_path(explicit) else {
                bail!("Could not determine config directory");
            };
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, toml::to_string_pretty(&Config::default())?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}
