//! emowrap - HTTP recording controller for Emotiv EEG headsets
//!
//! Subcommands:
//! - `emowrap serve` - Run the recording server
//! - `emowrap config` - Print the effective configuration and its sources

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emoconf::EmoConfig;
use std::path::PathBuf;

use emowrap::{serve, telemetry};

#[derive(Parser)]
#[command(name = "emowrap")]
#[command(about = "HTTP recording controller for Emotiv EEG headsets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the recording server
    Serve {
        /// Config file (replaces ./emowrap.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// HTTP port to bind
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// OTLP gRPC endpoint for OpenTelemetry (e.g., "localhost:4317")
        #[arg(long)]
        otlp_endpoint: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Config file (replaces ./emowrap.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            otlp_endpoint,
        } => {
            let mut config = EmoConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = port {
                config.infra.bind.http_port = port;
            }
            if let Some(host) = host {
                config.infra.bind.host = host;
            }
            if let Some(endpoint) = otlp_endpoint {
                config.infra.telemetry.otlp_endpoint = endpoint;
            }

            telemetry::init(&config.infra.telemetry)?;
            serve::run(config).await?;
        }
        Commands::Config { config } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                )
                .init();

            let (config, sources) = EmoConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load configuration")?;

            if sources.files.is_empty() {
                println!("# sources: compiled defaults");
            }
            for file in &sources.files {
                println!("# source: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            println!();
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
