//! CLI entry point for the fleet simulator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fleetsim_registry::MemoryRegistry;
use fleetsim_simulator::config::{Config, DEFAULT_CONFIG_FILE};
use fleetsim_simulator::{FleetReport, RunMode, Simulation};
use fleetsim_transport::LogTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "fleetsim")]
#[command(about = "Simulated IoT device fleet: provision devices and stream telemetry")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to ./fleetsim.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the catalog, then send telemetry until stopped
    Run(RunArgs),

    /// Provision the catalog only
    Provision {
        /// Hub connection string
        #[arg(long)]
        connection_string: Option<String>,

        /// Output file for report (markdown, plus a .json next to it)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Write the default configuration file
    GenerateConfig {
        /// Destination path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Hub connection string
    #[arg(long)]
    connection_string: Option<String>,

    /// Pause between sends of one device, in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop each device after this many messages
    #[arg(short, long)]
    max_messages: Option<u64>,

    /// Stop the fleet after this many seconds
    #[arg(short = 'D', long)]
    duration: Option<u64>,

    /// Seed for reproducible payloads
    #[arg(long)]
    seed: Option<u64>,

    /// Output file for report (markdown, plus a .json next to it)
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mode, config, output) = match cli.command {
        Commands::GenerateConfig { output } => {
            Config::write_default(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Default configuration written to {}", output.display());
            return Ok(());
        }
        Commands::Provision {
            connection_string,
            output,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(cs) = connection_string {
                config.hub.connection_string = cs;
            }
            (RunMode::Provision, config, output)
        }
        Commands::Run(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_run_overrides(&mut config, &args);
            (RunMode::Run, config, args.output)
        }
    };

    init_logging(&config);
    info!("Starting fleetsim v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(MemoryRegistry::new());
    let transport = Arc::new(LogTransport::new().with_bodies(config.transport.log_bodies));
    let simulation = Simulation::new(config, registry, transport)?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let report = simulation.run(mode, shutdown_token).await?;

    report.print_summary();

    if let Some(output_path) = output {
        save_report(&report, &output_path)?;
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("failed to load config from {}", DEFAULT_CONFIG_FILE)),
        None => Ok(Config::default()),
    }
}

fn apply_run_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(cs) = &args.connection_string {
        config.hub.connection_string = cs.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        config.dispatch.interval_ms = interval_ms;
    }
    if let Some(max_messages) = args.max_messages {
        config.dispatch.max_messages = Some(max_messages);
    }
    if let Some(duration) = args.duration {
        config.dispatch.duration_secs = Some(duration);
    }
    if let Some(seed) = args.seed {
        config.dispatch.seed = Some(seed);
    }
}

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level()).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(config.logging.show_target)
                .with_thread_ids(config.logging.show_thread_ids)
                .with_file(config.logging.show_location)
                .with_line_number(config.logging.show_location),
        )
        .with(filter)
        .init();
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("SIGINT received, stopping fleet...");
        }
        _ = terminate => {
            info!("SIGTERM received, stopping fleet...");
        }
    }

    token.cancel();
}

fn save_report(report: &FleetReport, output_path: &str) -> Result<()> {
    let md_path = if output_path.ends_with(".md") {
        output_path.to_string()
    } else {
        format!("{}.md", output_path)
    };

    std::fs::write(&md_path, report.to_markdown())?;
    info!("Markdown report saved to: {}", md_path);

    let json_path = format!("{}.json", md_path.trim_end_matches(".md"));
    std::fs::write(&json_path, report.to_json())?;
    info!("JSON report saved to: {}", json_path);

    Ok(())
}
