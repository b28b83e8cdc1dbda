//! Hivegate - self-registering reverse proxy
//!
//! Fronts a dynamic pool of homogeneous backend instances. Backends
//! announce themselves at `POST /register`; the proxy load-balances all
//! other traffic across the registered set, probes liveness every few
//! seconds, demotes misbehaving instances, and serves per-backend and
//! aggregate statistics at `GET /stats`.

use clap::{Parser, Subcommand};
use hivegate::{config, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "hivegate")]
#[command(about = "Self-registering reverse proxy with health-aware dispatch", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "HIVEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "HIVEGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Start {
        /// Bind host (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = match &cli.config {
                Some(path) => config::Config::from_file(path)?,
                None => config::Config::default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            info!(
                "Hivegate v{} starting on {}:{}",
                env!("CARGO_PKG_VERSION"),
                config.server.host,
                config.server.port
            );

            hivegate::ProxyServer::new(config)?.run().await?;
        },

        Commands::Validate {
            config: config_path,
        } => match config::Config::validate_file(&config_path) {
            Ok(_) => {
                println!("Configuration valid: {}", config_path.display());
            },
            Err(e) => {
                eprintln!("Configuration errors found:");
                eprintln!("{}", e);
                std::process::exit(1);
            },
        },
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
