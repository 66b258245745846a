//! Factory
//!
//! Simulated device server and floor controller.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use factory::config::FactoryConfig;
use factory::factory_runtime::ServiceManager;
use factory::floor;
use factory::protocol::Address;

const DEFAULT_LOG_FILTER: &str = "factory=info,factory_runtime=info";

/// Smart factory floor
#[derive(Parser, Debug)]
#[command(name = "factory")]
#[command(about = "Smart factory floor simulator and controller", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./factory.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulated device server and its physics engine
    Server {
        /// Override `server.bind`
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Discover a device server and control it
    Controller {
        /// Override `controller.target`
        #[arg(long)]
        target: Option<Address>,
    },
    /// Simulator and controller in one process, without sockets
    Standalone,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config =
        FactoryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Server { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            run_server(config).await
        }
        Command::Controller { target } => {
            if let Some(target) = target {
                config.controller.target = target;
            }
            run_controller(config).await
        }
        Command::Standalone => run_standalone(config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(config: FactoryConfig) -> Result<()> {
    info!("Starting device server v{}", env!("CARGO_PKG_VERSION"));
    let service_manager = Arc::new(ServiceManager::new());

    floor::start_server(&service_manager, &config)
        .await
        .with_context(|| format!("Failed to start device server on {}", config.server.bind))?;

    shutdown_signal(service_manager).await;
    Ok(())
}

async fn run_controller(config: FactoryConfig) -> Result<()> {
    info!(
        target_address = %config.controller.target,
        "Starting controller v{}",
        env!("CARGO_PKG_VERSION")
    );
    let service_manager = Arc::new(ServiceManager::new());

    floor::start_controller(&service_manager, &config)
        .await
        .context("Failed to start controller")?;

    shutdown_signal(service_manager).await;
    Ok(())
}

async fn run_standalone(config: FactoryConfig) -> Result<()> {
    info!("Starting standalone floor v{}", env!("CARGO_PKG_VERSION"));
    let service_manager = Arc::new(ServiceManager::new());

    floor::start_standalone(&service_manager, &config)
        .await
        .context("Failed to start standalone floor")?;

    shutdown_signal(service_manager).await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then stop every service
async fn shutdown_signal(service_manager: Arc<ServiceManager>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

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
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }

    info!("Shutting down services...");
    if let Err(e) = service_manager.shutdown_all().await {
        warn!("Some services did not shut down cleanly: {}", e);
    }
    info!("Shutdown complete");
}
