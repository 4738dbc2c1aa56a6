//! Garden telemetry — entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use garden_telemetry::TelemetryService;
use garden_telemetry_server::config::ServerConfig;
use garden_telemetry_server::dispatch::{device_uid, DeviceRegistry};
use garden_telemetry_server::seed::{seed_service, SeedPlan};
use garden_telemetry_server::transport::HttpTransport;

#[derive(Parser)]
#[command(
    name = "garden-telemetry",
    about = "Garden sensor telemetry — charts, heatmaps and a device dispatcher over HTTP",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve {
        /// Listen address (host:port). Overrides `server.bind`.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Render a line chart for one source and print the artifact path.
    Graph {
        /// Source id, e.g. 192.168.0.10.
        source: String,

        /// Look-back window in seconds.
        window: u64,

        /// Sensor type, e.g. temperature.
        sensor: String,
    },

    /// Render a heatmap over the configured devices.
    Heatmap {
        /// Sensor type, e.g. humidity.
        sensor: String,
    },

    /// Fill the store with random readings for every heatmap source.
    Seed {
        /// Spread readings over this many days.
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Readings per sensor type.
        #[arg(long, default_value_t = 10_000)]
        count: usize,

        /// RNG seed for reproducible data.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the resolved configuration as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   garden-telemetry completions bash > ~/.local/share/bash-completion/completions/garden-telemetry
    ///   garden-telemetry completions zsh > ~/.zfunc/_garden-telemetry
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let load_config = || ServerConfig::resolve(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let config = load_config()?;
            let addr = addr.unwrap_or_else(|| config.server.bind.clone());
            let service = open_service(&config).await?;
            let devices = DeviceRegistry::new(&config.devices);
            tracing::info!("Garden telemetry server");
            tracing::info!(
                "Store: {}",
                if config.telemetry.store.memory {
                    "memory".to_string()
                } else {
                    config.telemetry.store.path.display().to_string()
                }
            );
            tracing::info!("Artifacts: {}", config.telemetry.artifacts.dir.display());
            HttpTransport::new(service, devices).run(&addr).await?;
        }

        Commands::Graph {
            source,
            window,
            sensor,
        } => {
            let config = load_config()?;
            let service = open_service(&config).await?;
            let chart = tokio::task::spawn_blocking(move || {
                service.get_series(&source, &sensor, window)
            })
            .await??;
            println!("{}", chart.handle.path.display());
        }

        Commands::Heatmap { sensor } => {
            let config = load_config()?;
            let service = open_service(&config).await?;
            let heatmap = tokio::task::spawn_blocking(move || service.get_heatmap(&sensor)).await??;
            for cell in &heatmap.cells {
                match cell.value {
                    Some(v) => println!("  {:<16} {v}", cell.source_id),
                    None => println!("  {:<16} no data", cell.source_id),
                }
            }
            println!("{}", heatmap.artifact.path.display());
        }

        Commands::Seed { days, count, seed } => {
            let config = load_config()?;
            let service = open_service(&config).await?;
            let plan = SeedPlan {
                days,
                readings_per_sensor: count,
                seed,
            };
            let inserted = tokio::task::spawn_blocking(move || {
                let sources: Vec<String> =
                    service.devices().iter().map(|d| d.source_id.clone()).collect();
                seed_service(&service, &sources, &plan, service.now_secs())
            })
            .await??;
            println!("Inserted {inserted} readings");
        }

        Commands::Info => {
            let config = load_config()?;
            let devices: Vec<_> = config
                .devices
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "uid": device_uid(&d.name),
                        "addr": d.addr,
                        "methods": d.methods,
                    })
                })
                .collect();
            let info = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": config,
                "dispatcher": devices,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "garden-telemetry", &mut std::io::stdout());
        }
    }

    Ok(())
}

async fn open_service(config: &ServerConfig) -> anyhow::Result<Arc<TelemetryService>> {
    let telemetry = config.telemetry.clone();
    let service = tokio::task::spawn_blocking(move || TelemetryService::open(&telemetry)).await??;
    Ok(Arc::new(service))
}
