//! screenhop server entry point.
//!
//! Wires the headless primary driver, the configuration, and the server
//! control surface together on the Tokio runtime. Exit codes: 0 clean,
//! 1 configuration error, 2 cannot bind, 3 cannot grab the primary driver,
//! 4 internal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_server::config::ServerConfig;
use screenhop_server::primary::headless::HeadlessPrimary;
use screenhop_server::server::{Server, ServerError};

const EXIT_CONFIG: u8 = 1;
const EXIT_BIND: u8 = 2;
const EXIT_PRIMARY: u8 = 3;
const EXIT_INTERNAL: u8 = 4;

/// Server half of the screenhop input-redirection service.
#[derive(Parser)]
#[command(name = "screenhop-server", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, value_name = "PATH", default_value = "screenhop.toml")]
    config: PathBuf,

    /// Override the primary screen name from the configuration.
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Override the listen address from the configuration.
    #[arg(long, value_name = "HOST:PORT")]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Structured logging; level overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match ServerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("cannot load configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(name) = cli.name {
        config.name = name;
    }
    if let Some(address) = cli.address {
        config.address = address;
    }

    let shape = ScreenShape {
        x: 0,
        y: 0,
        w: config.primary.width,
        h: config.primary.height,
        zone_size: config.primary.zone_size,
    };
    let primary = Arc::new(HeadlessPrimary::new(shape));

    let server = match Server::new(config, primary) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(e) = server.open() {
        error!("cannot acquire primary screen: {e}");
        return ExitCode::from(EXIT_PRIMARY);
    }

    let quitter = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            quitter.quit().await;
        }
    });

    info!(name = %server.primary_screen_name(), "screenhop server starting");
    match server.run().await {
        Ok(()) => {
            info!("screenhop server stopped");
            ExitCode::SUCCESS
        }
        Err(e @ ServerError::Config(_)) => {
            error!("{e}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e @ ServerError::Bind(_)) => {
            error!("{e}");
            ExitCode::from(EXIT_BIND)
        }
        Err(e @ ServerError::Primary(_)) => {
            error!("{e}");
            ExitCode::from(EXIT_PRIMARY)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
