mod api;
mod config;
mod error;
mod feed;
mod filter;
mod network;
mod route_cache;
mod routes;
mod server;
mod state;
mod sync;
mod types;

use anyhow::{ Context, Result };
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

use crate::api::AppState;
use crate::config::ConfigWatcher;
use crate::feed::StateFeed;
use crate::network::{ OpenSkyClient, TrafficSource };
use crate::route_cache::RouteCache;
use crate::routes::RouteResolver;
use crate::state::FeedState;
use crate::sync::{ join_engine, SyncEngine };

#[derive(Parser)]
#[command(name = "flightscope")]
#[command(about = "Live aircraft positions from the OpenSky Network")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value_os_t = config::config_path())]
    config: PathBuf,

    /// Override the listen address from the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flightscope=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting FlightScope");

    // Load and check configuration; these are the only fatal errors
    let file_config = config::load_config(&cli.config)?;
    let mut config = file_config.clone();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    config.validate().context("Invalid configuration")?;
    tracing::info!("Configuration loaded successfully");

    // Initialize shared state
    let feed_state = Arc::new(FeedState::new(config.clone()));
    let source: Arc<dyn TrafficSource> = Arc::new(OpenSkyClient::new(&config.network)?);

    // Start config file watcher
    let config_watcher = ConfigWatcher::new(cli.config.clone(), feed_state.clone(), file_config);
    tokio::spawn(async move {
        if let Err(e) = config_watcher.watch().await {
            tracing::error!("Config watcher error: {}", e);
        }
    });

    // Start the poll loop
    let feed = StateFeed::new(source.clone(), config.sync.max_aircraft);
    let (engine, sync) = SyncEngine::new(feed_state.clone(), feed);
    let engine_task = tokio::spawn(engine.run());

    let routes = Arc::new(
        RouteCache::new(RouteResolver::new(source, config.sync.route_window()))
    );

    let app = AppState {
        feed: feed_state,
        routes,
        sync: sync.clone(),
    };

    server
        ::run_server(&config.server.bind, app, shutdown_signal()).await
        .with_context(|| format!("HTTP server on {} failed", config.server.bind))?;

    sync.shutdown().await;
    join_engine(engine_task).await;
    tracing::info!("FlightScope stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
