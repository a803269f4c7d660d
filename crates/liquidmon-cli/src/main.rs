//! CLI for liquidmon: live host telemetry in your terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "liquidmon")]
#[command(about = "liquidmon: CPU, memory, GPU, battery, clocks and package power")]
#[command(version = liquidmon_core::VERSION)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// JSON config file; missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two host refreshes one interval apart, then print the stats
    Snapshot {
        /// Print the full telemetry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every sampler and print one line per host interval
    Watch {
        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(long)]
        duration: Option<f64>,

        /// Print each line as a JSON snapshot
        #[arg(long)]
        json: bool,

        /// Start the privileged power sampler (prompts for elevation)
        #[arg(long)]
        power: bool,

        /// Override the host sampling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// One process refresh: per-app CPU and the Top-N summary
    Processes {
        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Override the number of apps in the summary
        #[arg(long)]
        top: Option<usize>,
    },

    /// Print core topology and CPU identity
    Topology {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode the last complete sample in a powermetrics output file
    Decode {
        /// Sampler output file (default: configured output path)
        path: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp_millis()
        .init();

    let config = commands::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Snapshot { json } => commands::snapshot::run(&config, json),
        Commands::Watch {
            duration,
            json,
            power,
            interval_ms,
        } => commands::watch::run(
            config,
            commands::watch::WatchOptions {
                duration,
                json,
                power,
                interval_ms,
            },
        ),
        Commands::Processes { json, top } => commands::processes::run(config, json, top),
        Commands::Topology { json } => commands::topology::run(&config, json),
        Commands::Decode { path, json } => commands::decode::run(&config, path.as_deref(), json),
    }
}
