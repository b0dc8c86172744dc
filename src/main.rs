use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;

use filter_gateway::config::{load_config, GatewayConfig};
use filter_gateway::filter::Tier;
use filter_gateway::metadata::MetadataWatcher;
use filter_gateway::observability::{logging, metrics};
use filter_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "filter-gateway")]
#[command(about = "Runs storage filters in the request path of an object store", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tier this instance runs as, overriding the configuration.
    #[arg(short, long, value_enum)]
    tier: Option<TierArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    Proxy,
    Object,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Proxy => Tier::Proxy,
            TierArg::Object => Tier::Object,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(tier) = cli.tier {
        config.filters.tier = tier.into();
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "filter-gateway starting");
    tracing::info!(
        tier = %config.filters.tier,
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;

    // Dropping the watcher stops it, so it lives as long as main.
    let _watcher = match server.file_store().and_then(MetadataWatcher::new) {
        Some(watcher) => match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Metadata watcher unavailable, changes need a restart");
                None
            }
        },
        None => None,
    };

    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
