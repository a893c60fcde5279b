mod cli;
mod sample_loop;
mod speed;

use clap::Parser;
use cortexlink_decoder::{build_decoder, run_worker, DaemonConfig, DecoderDaemon, WorkerSpec};

use crate::cli::{Cli, Command};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::DecodeWorker(args) => {
            let spec: WorkerSpec = serde_json::from_str(&args.spec)?;
            run_worker(&spec)?;
        }
        Command::Speed(args) => {
            let setup = cli::build_setup(&args.decode)?;
            let mut decoder = build_decoder(&setup, args.decode.buffer_secs)?;
            tracing::info!(cycles = args.cycles, "running decode speed benchmark");
            speed::run_speed(decoder.as_mut(), args.cycles)?;
        }
        Command::Run(args) => {
            let setup = cli::build_setup(&args)?;
            let mut config = DaemonConfig::new(setup);
            config.buffer_seconds = args.buffer_secs;
            let mut daemon = DecoderDaemon::new(config)?;
            sample_loop::run_sample_loop(&mut daemon).await?;
        }
    }
    Ok(())
}
