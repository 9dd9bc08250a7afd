use anyhow::Result;
use clap::{Parser, Subcommand};
use llm_council::{transport, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "council")]
#[command(author, version, about = "LLM Council - ask several models, let them rank each other, get one answer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (default from config: 8001)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config: 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Authenticate with GitHub Copilot (device flow)
    Auth,

    /// Remove the stored GitHub Copilot credential
    Logout,

    /// Show providers and council configuration
    Status,

    /// List models of the available providers
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "llm_council=debug,council=debug"
    } else {
        "llm_council=info,council=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            tracing::info!(
                "Starting council server on {}:{}",
                config.server.host,
                config.server.port
            );
            transport::run_http_server(config).await?;
        }
        Commands::Init { force } => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => Config::config_path()?,
            };
            transport::cli::run_init(config, &path, force)?;
        }
        Commands::Auth => transport::cli::run_auth(config).await?,
        Commands::Logout => transport::cli::run_logout(config).await?,
        Commands::Status => transport::cli::run_status(config)?,
        Commands::Models => transport::cli::run_models(config)?,
    }

    Ok(())
}
