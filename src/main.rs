mod config;
mod error;
mod generator;
mod health_monitor;
mod logging;
mod router;
mod service_point;
mod shutdown;
mod sim;
mod stats;
mod types;
mod vehicle;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use config::Config;
use sim::Simulation;

#[derive(Debug, Parser)]
#[command(name = "gas_station", version, about = "Concurrent gas station simulator")]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a simulation from a JSON configuration file.
    Run {
        /// Path to the configuration file.
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Run the built-in demo layout (default).
    Demo {
        #[command(flatten)]
        options: RunOptions,
    },
}

#[derive(Debug, Default, Args)]
struct RunOptions {
    /// Override the number of vehicles to generate (0 = until stopped).
    #[arg(long)]
    vehicles: Option<u64>,

    /// Stop generating after this many seconds, then drain.
    #[arg(long)]
    run_for: Option<f64>,

    /// Write queue-time statistics as JSON to this path.
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// Warn about workers that hold work without progress for this long.
    #[arg(long)]
    stall_warn_secs: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let (config, options) = match cli.command {
        Some(Command::Run { config, options }) => (Config::from_file(&config)?, options),
        Some(Command::Demo { options }) => (Config::demo(), options),
        None => (Config::demo(), RunOptions::default()),
    };
    run(config, options)
}

fn seconds(flag: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow::anyhow!("--{flag} must be a non-negative number of seconds"))
}

fn run(mut config: Config, options: RunOptions) -> anyhow::Result<()> {
    if let Some(vehicles) = options.vehicles {
        config.generator.vehicle_count = vehicles;
    }
    if config.generator.vehicle_limit().is_none() && options.run_for.is_none() {
        tracing::warn!("no vehicle limit and no --run-for: the run never stops on its own");
    }

    let mut simulation = Simulation::new(config)?;
    if let Some(secs) = options.stall_warn_secs {
        simulation = simulation.with_stall_warning(seconds("stall-warn-secs", secs)?);
    }
    if let Some(secs) = options.run_for {
        let deadline = seconds("run-for", secs)?;
        let stop = simulation.stop_handle();
        std::thread::Builder::new()
            .name("run-timer".to_string())
            .spawn(move || {
                std::thread::sleep(deadline);
                if stop.fire() {
                    tracing::info!("run time elapsed, stopping generator");
                }
            })?;
    }

    let report = simulation.run()?;
    report.print_summary();

    if let Some(path) = options.stats_out {
        report.stats.write_json(&path)?;
        tracing::info!(path = %path.display(), "statistics written");
    }
    if !report.all_drained() {
        anyhow::bail!("run ended with undrained service points");
    }
    Ok(())
}
