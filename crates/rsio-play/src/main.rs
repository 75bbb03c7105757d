mod wav;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use rsio::backend::BackendKind;
use rsio::playback::{PlaybackConfig, Player, SampleSource};
use rsio::Context;
use tracing_subscriber::EnvFilter;

use crate::wav::WavSource;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Dummy,
    Alsa,
    Pulseaudio,
    Jack,
    Coreaudio,
    Wasapi,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> BackendKind {
        match backend {
            Backend::Dummy => BackendKind::Dummy,
            Backend::Alsa => BackendKind::Alsa,
            Backend::Pulseaudio => BackendKind::PulseAudio,
            Backend::Jack => BackendKind::Jack,
            Backend::Coreaudio => BackendKind::CoreAudio,
            Backend::Wasapi => BackendKind::Wasapi,
        }
    }
}

/// Plays a WAV file on an audio output device.
#[derive(Debug, Parser)]
#[command(name = "rsio-play", version)]
struct Cli {
    /// Audio backend. Every built-in backend is tried when omitted.
    #[arg(long, value_enum, env = "RSIO_BACKEND")]
    backend: Option<Backend>,

    /// Id of the output device. Defaults to the backend's default device.
    #[arg(long, value_name = "ID")]
    device: Option<String>,

    /// Use the raw variant of `--device`.
    #[arg(long, requires = "device")]
    raw: bool,

    /// Software latency in seconds.
    #[arg(long, value_name = "SECONDS")]
    latency: Option<f64>,

    /// WAV file to play.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum PlayError {
    #[error("unable to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: hound::Error,
    },
    #[error(transparent)]
    Audio(#[from] rsio::Error),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match play(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rsio-play: {e}");
            ExitCode::FAILURE
        }
    }
}

fn play(cli: &Cli) -> Result<(), PlayError> {
    let source = WavSource::open(&cli.file).map_err(|source| PlayError::Open {
        path: cli.file.display().to_string(),
        source,
    })?;

    let mut context = Context::new();
    match cli.backend {
        Some(backend) => context.connect_backend(backend.into())?,
        None => context.connect()?,
    }
    context.flush_events();

    let device = match &cli.device {
        Some(id) => context.find_output_device(id, cli.raw)?,
        None => context.default_output_device()?,
    };
    device.probe_result()?;

    if let Some(backend) = context.current_backend() {
        println!("Backend: {backend}");
    }
    println!("Output device: {}", device.name());
    println!(
        "Source: {} channels, {} Hz, {} frames",
        source.channel_count(),
        source.sample_rate(),
        source.frame_count()
    );

    let config = PlaybackConfig {
        software_latency: cli.latency.unwrap_or(0.0),
        ..PlaybackConfig::default()
    };
    tracing::debug!(?config, path = %cli.file.display(), "opening player");
    let player = Player::open(&context, &device, Box::new(source), config)?;

    let negotiated = player.negotiated();
    println!(
        "Stream: {} {} Hz, {}, latency {:.3}s",
        negotiated.format, negotiated.sample_rate, negotiated.layout, negotiated.software_latency
    );
    if negotiated.layout_error.is_some() {
        println!("No native layout, remixing to {}", negotiated.layout);
    }

    let report = player.run(&mut context)?;
    println!(
        "Played {} frames in {:.2}s",
        report.samples_fed / report.negotiated.channel_count().max(1),
        report.elapsed.as_secs_f64()
    );

    Ok(())
}
