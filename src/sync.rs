use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{ self, Instant };

use crate::feed::StateFeed;
use crate::state::FeedState;

/// Commands accepted by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Fetch now, outside the timer
    RetryNow,
    /// Stop the poll loop
    Shutdown,
}

/// Control surface for the sync engine
///
/// Retries go through the engine's command channel; settings the loop only
/// reads at the next tick are written straight into shared state.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<SyncCommand>,
    state: Arc<FeedState>,
}

impl SyncHandle {
    /// Request an out-of-band fetch. Returns false once the engine has stopped.
    pub fn retry_now(&self) -> bool {
        match self.commands.try_send(SyncCommand::RetryNow) {
            Ok(()) => true,
            // retries already queued will pick up fresh data
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Change the poll period; the wait already scheduled is left alone
    pub fn set_poll_interval(&self, secs: u64) -> u64 {
        let secs = self.state.set_poll_interval(secs);
        tracing::info!("Poll interval set to {}s, applies from the next tick", secs);
        secs
    }

    /// Presentational toggle, relayed to clients only
    pub fn set_clustering(&self, enabled: bool) {
        self.state.set_clustering(enabled);
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(SyncCommand::Shutdown).await;
    }
}

/// Poll loop driving the state feed
///
/// Idle -> Fetching -> Idle | Degraded, every poll interval, forever. Degraded
/// cycles do not back off.
pub struct SyncEngine {
    state: Arc<FeedState>,
    feed: StateFeed,
    commands: mpsc::Receiver<SyncCommand>,
}

impl SyncEngine {
    pub fn new(state: Arc<FeedState>, feed: StateFeed) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::channel(8);
        let handle = SyncHandle {
            commands: tx,
            state: state.clone(),
        };
        (Self { state, feed, commands: rx }, handle)
    }

    /// Main run loop - first poll immediately, then on every tick
    pub async fn run(mut self) {
        tracing::info!("Sync engine started, polling every {:?}", self.state.poll_interval());

        let mut next_tick = Instant::now();

        loop {
            tokio::select! {
                _ = time::sleep_until(next_tick) => {
                    self.run_cycle().await;
                    // Read the period only now so changes apply from this tick on
                    next_tick = Instant::now() + self.state.poll_interval();
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SyncCommand::RetryNow) => {
                            tracing::info!("Manual retry requested");
                            self.run_cycle().await;
                        }
                        Some(SyncCommand::Shutdown) | None => {
                            tracing::info!("Sync engine stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn run_cycle(&mut self) {
        self.feed.set_max_aircraft(self.state.get_config().sync.max_aircraft);
        self.state.begin_fetch();

        let snapshot = self.feed.fetch_snapshot().await;

        match &snapshot.message {
            Some(message) => {
                tracing::warn!("Poll cycle degraded: {}", message);
            }
            None => {
                tracing::info!("Aircraft data updated - {} aircraft", snapshot.states.len());
            }
        }

        self.state.publish_snapshot(snapshot);
    }
}

/// Wait for a spawned engine task to end, reporting a panic instead of dropping it
pub async fn join_engine(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Sync engine task failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::feed::tests::row;
    use crate::network::TrafficSource;
    use crate::state::SyncPhase;
    use crate::types::{ FlightRecord, StatesResponse };
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Counts polls; answers 429 while `failing` is set
    #[derive(Default)]
    struct CountingStates {
        polls: AtomicUsize,
        failing: AtomicBool,
        hold: Option<Arc<Notify>>,
    }

    impl CountingStates {
        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TrafficSource for CountingStates {
        async fn fetch_states(&self) -> Result<StatesResponse, UpstreamError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(UpstreamError::Status { status: 429 });
            }
            Ok(StatesResponse { time: Some(1), states: Some(vec![row("abc123", Some("TEST1"))]) })
        }

        async fn fetch_flights(&self, _: &str, _: i64, _: i64) -> Result<Vec<FlightRecord>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    fn start(source: Arc<CountingStates>) -> (Arc<FeedState>, SyncHandle, JoinHandle<()>) {
        let state = Arc::new(FeedState::default());
        let feed = StateFeed::new(source, 200);
        let (engine, handle) = SyncEngine::new(state.clone(), feed);
        let task = tokio::spawn(engine.run());
        (state, handle, task)
    }

    async fn advance_secs(secs: u64) {
        time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_runs_immediately_then_on_period() {
        let source = Arc::new(CountingStates::default());
        let (state, _handle, _task) = start(source.clone());

        advance_secs(1).await;
        assert_eq!(source.polls(), 1);
        assert_eq!(state.snapshot().states.len(), 1);
        assert_eq!(state.sync_status().phase, SyncPhase::Idle);

        advance_secs(15).await;
        assert_eq!(source.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_period_does_not_cut_pending_wait() {
        let source = Arc::new(CountingStates::default());
        let (_state, handle, _task) = start(source.clone());

        advance_secs(1).await;
        assert_eq!(handle.set_poll_interval(5), 5);

        // the wait scheduled with the old 15s period still runs out at t=15
        advance_secs(13).await;
        assert_eq!(source.polls(), 1);

        advance_secs(2).await;
        assert_eq!(source.polls(), 2);

        // next tick uses the new period: t=20
        advance_secs(5).await;
        assert_eq!(source.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_cycles_keep_polling_without_backoff() {
        let source = Arc::new(CountingStates::default());
        source.failing.store(true, Ordering::SeqCst);
        let (state, _handle, _task) = start(source.clone());

        advance_secs(1).await;
        let snapshot = state.snapshot();
        assert!(snapshot.states.is_empty());
        assert!(snapshot.message.as_deref().is_some_and(|m| !m.is_empty()));
        assert_eq!(state.sync_status().phase, SyncPhase::Degraded);

        advance_secs(30).await;
        assert_eq!(source.polls(), 3);
        assert_eq!(state.sync_status().consecutive_failures, 3);

        source.failing.store(false, Ordering::SeqCst);
        advance_secs(15).await;
        assert_eq!(state.sync_status().phase, SyncPhase::Idle);
        assert_eq!(state.snapshot().message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fetches_out_of_band_without_moving_timer() {
        let source = Arc::new(CountingStates::default());
        let (_state, handle, _task) = start(source.clone());

        advance_secs(1).await;
        assert!(handle.retry_now());
        advance_secs(1).await;
        assert_eq!(source.polls(), 2);

        // scheduled tick still at t=15
        advance_secs(14).await;
        assert_eq!(source.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn validating_only_while_fetching() {
        let hold = Arc::new(Notify::new());
        let source = Arc::new(CountingStates { hold: Some(hold.clone()), ..Default::default() });
        let (state, _handle, _task) = start(source.clone());

        advance_secs(1).await;
        assert_eq!(source.polls(), 1);
        assert!(state.sync_status().validating());

        hold.notify_one();
        advance_secs(1).await;
        assert!(!state.sync_status().validating());
        assert_eq!(state.sync_status().phase, SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let source = Arc::new(CountingStates::default());
        let (_state, handle, task) = start(source.clone());

        advance_secs(1).await;
        handle.shutdown().await;
        assert!(join_engine(task).await);

        assert!(!handle.retry_now());
    }

    #[tokio::test]
    async fn panicked_engine_is_reported_on_join() {
        let task = tokio::spawn(async { panic!("engine blew up") });
        assert!(!join_engine(task).await);
    }
}
