use anyhow::{ bail, Context, Result };
use notify::{ Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher };
use serde::{ Deserialize, Serialize };
use std::net::SocketAddr;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::state::FeedState;

/// Shortest allowed poll period in seconds
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
/// Longest allowed poll period in seconds
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Bulk state vector endpoint
    #[serde(default = "default_states_url")]
    pub states_url: String,

    /// Per-aircraft flight history endpoint
    #[serde(default = "default_flights_url")]
    pub flights_url: String,

    /// User-Agent sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on any single upstream request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Seconds between polls, clamped to 1..=60 when read
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Max aircraft kept per snapshot
    #[serde(default = "default_max_aircraft")]
    pub max_aircraft: usize,

    /// Look-back window for route lookups in seconds
    #[serde(default = "default_route_window")]
    pub route_window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP API
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Marker clustering on the map; only relayed to the client
    #[serde(default = "default_false")]
    pub clustering: bool,
}

// Default value functions
fn default_states_url() -> String {
    "https://opensky-network.org/api/states/all".to_string()
}
fn default_flights_url() -> String {
    "https://opensky-network.org/api/flights/aircraft".to_string()
}
fn default_user_agent() -> String {
    "FlightScope/1.0".to_string()
}
fn default_request_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    15
}
fn default_max_aircraft() -> usize {
    crate::feed::DEFAULT_MAX_AIRCRAFT
}
fn default_route_window() -> u64 {
    crate::routes::DEFAULT_ROUTE_WINDOW.as_secs()
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_false() -> bool {
    false
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            states_url: default_states_url(),
            flights_url: default_flights_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_aircraft: default_max_aircraft(),
            route_window_secs: default_route_window(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { clustering: default_false() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            sync: SyncConfig::default(),
            server: ServerConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Clamp a requested poll period into the supported range
pub fn clamp_poll_interval(secs: u64) -> u64 {
    secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(clamp_poll_interval(self.poll_interval_secs))
    }

    pub fn route_window(&self) -> Duration {
        Duration::from_secs(self.route_window_secs)
    }
}

impl AppConfig {
    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<()> {
        for url in [&self.network.states_url, &self.network.flights_url] {
            reqwest::Url::parse(url).with_context(|| format!("Invalid upstream URL '{}'", url))?;
        }
        if self.network.request_timeout_secs == 0 {
            bail!("network.request_timeout_secs must be at least 1");
        }
        if self.sync.max_aircraft == 0 {
            bail!("sync.max_aircraft must be at least 1");
        }
        self.server.bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address '{}'", self.server.bind))?;
        Ok(())
    }
}

/// Default config file path
pub fn config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

/// Load configuration from file or create default
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs
            ::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    } else {
        tracing::warn!("{} not found, creating default configuration", path.display());
        let config = AppConfig::default();
        save_config(path, &config)?;
        Ok(config)
    }
}

/// Save configuration to file
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;

    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Configuration file watcher with hot-reload
///
/// A new poll interval reaches the sync engine through the shared state and
/// takes effect on its next tick. Values set at runtime through the API stay
/// in place until the file itself changes them.
pub struct ConfigWatcher {
    path: PathBuf,
    state: Arc<FeedState>,
    /// Last configuration read from the file
    loaded: AppConfig,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, state: Arc<FeedState>, loaded: AppConfig) -> Self {
        Self { path, state, loaded }
    }

    /// Start watching the config file for changes
    pub async fn watch(mut self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(1);

        let mut watcher = RecommendedWatcher::new(move |res| {
            let _ = tx.blocking_send(res);
        }, NotifyConfig::default())?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!("Config file watcher started on {}", self.path.display());

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) => {
                    tracing::debug!("Config file event: {:?}", event);

                    // Let the editor finish writing
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    self.reload();
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }

        Ok(())
    }

    fn reload(&mut self) {
        let config = match load_config(&self.path).and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to reload config: {:#}", e);
                return;
            }
        };

        if config == self.loaded {
            return;
        }

        self.state.apply_reloaded_config(&self.loaded, &config);
        self.loaded = config;
        tracing::info!("Configuration reloaded successfully");
    }
}
