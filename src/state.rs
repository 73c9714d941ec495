use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ clamp_poll_interval, AppConfig };
use crate::types::Snapshot;

/// Thread-safe state shared between the sync engine and the HTTP handlers
pub struct FeedState {
    /// Latest snapshot, replaced wholesale each cycle
    snapshot: RwLock<Arc<Snapshot>>,

    /// Configuration (hot-reloadable)
    config: RwLock<AppConfig>,

    /// Sync engine status
    sync_status: RwLock<SyncStatus>,
}

/// Observable phase of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Fetching,
    /// Last cycle produced no usable data; still renderable
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_fetch_at: Option<i64>,
    pub last_success_at: Option<i64>,
    pub aircraft_count: usize,
    pub cycles: u64,
    pub consecutive_failures: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_fetch_at: None,
            last_success_at: None,
            aircraft_count: 0,
            cycles: 0,
            consecutive_failures: 0,
        }
    }
}

impl SyncStatus {
    /// True only while a fetch is in flight
    pub fn validating(&self) -> bool {
        self.phase == SyncPhase::Fetching
    }
}

impl FeedState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            config: RwLock::new(config),
            sync_status: RwLock::new(SyncStatus::default()),
        }
    }

    // Snapshot management

    /// Get the latest snapshot (read-only)
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Mark the start of a poll cycle
    pub fn begin_fetch(&self) {
        self.sync_status.write().phase = SyncPhase::Fetching;
    }

    /// Replace the snapshot and settle the phase
    pub fn publish_snapshot(&self, snapshot: Snapshot) {
        let degraded = snapshot.is_degraded();
        let fetched_at = snapshot.fetched_at;
        let count = snapshot.states.len();

        *self.snapshot.write() = Arc::new(snapshot);

        // Update sync status
        let mut status = self.sync_status.write();
        status.cycles += 1;
        status.aircraft_count = count;
        status.last_fetch_at = fetched_at;
        if degraded {
            status.phase = SyncPhase::Degraded;
            status.consecutive_failures += 1;
        } else {
            status.phase = SyncPhase::Idle;
            status.consecutive_failures = 0;
            status.last_success_at = fetched_at;
        }
    }

    /// Get sync status
    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status.read().clone()
    }

    // Configuration management

    /// Apply a reloaded config file on top of the running configuration.
    ///
    /// Settings that can also be changed at runtime (poll period, clustering)
    /// only take the file value when the file changed it since `previous`, so
    /// an edit elsewhere in the file keeps the runtime override.
    pub fn apply_reloaded_config(&self, previous: &AppConfig, reloaded: &AppConfig) {
        let mut config = self.config.write();
        let mut next = reloaded.clone();

        if reloaded.sync.poll_interval_secs == previous.sync.poll_interval_secs {
            next.sync.poll_interval_secs = config.sync.poll_interval_secs;
        }
        if reloaded.display.clustering == previous.display.clustering {
            next.display.clustering = config.display.clustering;
        }

        *config = next;
    }

    /// Get current configuration
    pub fn get_config(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Period to wait before the next scheduled poll
    pub fn poll_interval(&self) -> Duration {
        self.config.read().sync.poll_interval()
    }

    /// Change the poll period, returning the clamped value in seconds
    pub fn set_poll_interval(&self, secs: u64) -> u64 {
        let secs = clamp_poll_interval(secs);
        self.config.write().sync.poll_interval_secs = secs;
        secs
    }

    pub fn clustering(&self) -> bool {
        self.config.read().display.clustering
    }

    pub fn set_clustering(&self, enabled: bool) {
        self.config.write().display.clustering = enabled;
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
