//! LogRelay Server Binary
//!
//! Receives framed log records over TCP and writes them to rotating files.

use clap::Parser;
use logrelay::config::ServerConfig;
use logrelay::server::LogServer;
use logrelay::sink::default_directives;
use logrelay::RelayError;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logrelay-server")]
#[command(about = "Length-prefixed TCP log record receiver")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/server.toml")]
    config: PathBuf,

    /// Host to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Output file for received records
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force every record through this logger name
    #[arg(long)]
    logname: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives(args.verbose))),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting LogRelay Server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        match &e {
            RelayError::BindFailure { addr, .. } => {
                error!(addr = %addr, "Could not bind listening socket: {}", e)
            }
            _ => error!("Server error: {}", e),
        }
        std::process::exit(1);
    }

    info!("LogRelay Server stopped");
}

async fn run(args: Args) -> logrelay::Result<()> {
    let config_path = if args.config.exists() {
        Some(args.config.as_path())
    } else {
        info!("Config file not found, using defaults");
        None
    };
    let mut config = ServerConfig::load(config_path)?;

    // Override config with CLI arguments
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(output) = args.output {
        config.file.path = output;
    }
    if args.logname.is_some() {
        config.routing.logname = args.logname;
    }
    config.validate()?;

    info!("Listen address: {}", config.server.bind_addr());
    info!("Output file: {}", config.file.path.display());
    info!("Rotation threshold: {} bytes", config.file.max_bytes);

    let server = LogServer::new(config).await?;
    server.run().await
}
