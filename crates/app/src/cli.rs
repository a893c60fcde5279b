use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cortexlink_decoder::{DecoderSetup, SourceConfig};
use cortexlink_foundation::AppError;
use cortexlink_stream::SimulatedConfig;

#[derive(Parser)]
#[command(name = "cortexlink", version, about = "Online biosignal decoding")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Daemon-backed decoding loop with smoothed console output
    Run(DecodeArgs),
    /// In-process benchmark: N decode cycles, per-second latency and rate
    Speed(SpeedArgs),
    /// Internal: the daemon's worker-process entry point
    #[command(hide = true)]
    DecodeWorker(WorkerArgs),
}

#[derive(Args)]
pub struct DecodeArgs {
    /// Path to a trained model artifact (JSON)
    #[arg(long, conflicts_with = "mock")]
    pub model: Option<PathBuf>,

    /// Mock decoding over the given comma-separated labels, no hardware
    #[arg(long, value_delimiter = ',')]
    pub mock: Option<Vec<String>>,

    /// Feature-frame retention in seconds
    #[arg(long, default_value_t = 1.0)]
    pub buffer_secs: f64,

    /// Simulated stream sampling rate; defaults to the model's rate
    #[arg(long)]
    pub sim_rate: Option<f64>,

    /// Simulated stream channel names; default to the model's channels
    #[arg(long, value_delimiter = ',')]
    pub sim_channels: Option<Vec<String>>,

    /// Fixed RNG seed for the simulated stream
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct SpeedArgs {
    #[command(flatten)]
    pub decode: DecodeArgs,

    /// Number of decode cycles to run
    #[arg(long, default_value_t = 1000)]
    pub cycles: u64,
}

#[derive(Args)]
pub struct WorkerArgs {
    /// Worker spec as JSON, produced by the spawning daemon
    #[arg(long)]
    pub spec: String,
}

/// Turn the CLI flags into the plain decoder setup both `run` and `speed`
/// share. Reads the artifact once to default the simulated stream to the
/// model's rate and channel layout.
pub fn build_setup(args: &DecodeArgs) -> anyhow::Result<DecoderSetup> {
    if let Some(labels) = &args.mock {
        return Ok(DecoderSetup::Mock {
            labels: labels.clone(),
        });
    }
    let Some(model) = &args.model else {
        return Err(AppError::Config("either --model or --mock is required".into()).into());
    };

    let artifact = cortexlink_decoder::ModelArtifact::load(model)?;
    let sim = SimulatedConfig {
        sample_rate: args.sim_rate.unwrap_or(artifact.sample_rate),
        channel_names: args
            .sim_channels
            .clone()
            .unwrap_or_else(|| artifact.channels.clone()),
        step_frames: artifact.step_frames,
        seed: args.seed,
        pace: true,
        ..Default::default()
    };
    Ok(DecoderSetup::Model {
        artifact: model.clone(),
        source: SourceConfig::Simulated(sim),
    })
}
