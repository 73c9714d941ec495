use std::sync::Arc;

use crate::network::TrafficSource;
use crate::types::{ AircraftState, Snapshot, StatesResponse };

/// Default cap on aircraft per snapshot, bounds rendering cost downstream
pub const DEFAULT_MAX_AIRCRAFT: usize = 200;

/// Turns the upstream bulk endpoint into snapshots
///
/// `fetch_snapshot` never fails: upstream errors become an empty snapshot
/// carrying a diagnostic message so consumers keep rendering.
pub struct StateFeed {
    source: Arc<dyn TrafficSource>,
    max_aircraft: usize,
}

impl StateFeed {
    pub fn new(source: Arc<dyn TrafficSource>, max_aircraft: usize) -> Self {
        Self { source, max_aircraft }
    }

    pub fn set_max_aircraft(&mut self, max_aircraft: usize) {
        self.max_aircraft = max_aircraft;
    }

    /// Fetch and normalize one snapshot
    pub async fn fetch_snapshot(&self) -> Snapshot {
        let fetched_at = chrono::Utc::now().timestamp();

        match self.source.fetch_states().await {
            Ok(response) => normalize(response, self.max_aircraft, fetched_at),
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), rate_limited = e.is_rate_limited(), "Aircraft fetch degraded: {}", e);
                Snapshot::degraded(e.to_string(), fetched_at)
            }
        }
    }
}

/// Decode, drop undisplayable rows, then cap, preserving upstream order
pub fn normalize(response: StatesResponse, max_aircraft: usize, fetched_at: i64) -> Snapshot {
    let rows = response.states.unwrap_or_default();
    let total = rows.len();

    let states: Vec<AircraftState> = rows
        .iter()
        .filter_map(AircraftState::from_tuple)
        .take(max_aircraft)
        .collect();

    tracing::debug!("Kept {} of {} state vectors", states.len(), total);

    Snapshot {
        states,
        upstream_time: response.time,
        fetched_at: Some(fetched_at),
        message: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::types::FlightRecord;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{ json, Value };

    /// In-memory source returning a fixed states outcome
    pub struct FixedStates {
        pub outcome: Mutex<Option<Result<StatesResponse, UpstreamError>>>,
    }

    impl FixedStates {
        pub fn ok(rows: Vec<Value>) -> Self {
            Self {
                outcome: Mutex::new(Some(Ok(StatesResponse { time: Some(1700000000), states: Some(rows) }))),
            }
        }

        pub fn err(err: UpstreamError) -> Self {
            Self { outcome: Mutex::new(Some(Err(err))) }
        }
    }

    #[async_trait]
    impl TrafficSource for FixedStates {
        async fn fetch_states(&self) -> Result<StatesResponse, UpstreamError> {
            self.outcome
                .lock()
                .take()
                .unwrap_or_else(|| Ok(StatesResponse { time: None, states: None }))
        }

        async fn fetch_flights(&self, _: &str, _: i64, _: i64) -> Result<Vec<FlightRecord>, UpstreamError> {
            Ok(Vec::new())
        }
    }

    pub fn row(id: &str, callsign: Option<&str>) -> Value {
        json!([id, callsign, "United States", 1700000000, 1700000000, -73.8, 40.6,
               3000.0, false, 120.0, 90.0, 0.0, null, 3050.0, null, false, 0, null])
    }

    #[test]
    fn drops_rows_without_id_or_position() {
        let rows = vec![
            row("a1", Some("AAL1")),
            json!([null, "GHOST", "X", null, 1, 1.0, 1.0]),
            json!(["b2", "NOLON", "X", null, 1, null, 1.0]),
            json!(["c3", "NOLAT", "X", null, 1, 1.0, null]),
            row("d4", None),
        ];

        let snapshot = normalize(StatesResponse { time: Some(5), states: Some(rows) }, 200, 10);
        let ids: Vec<&str> = snapshot.states.iter().map(|s| s.id.as_str()).collect();

        assert_eq!(ids, vec!["a1", "d4"]);
        assert_eq!(snapshot.upstream_time, Some(5));
        assert_eq!(snapshot.fetched_at, Some(10));
        assert!(!snapshot.is_degraded());
    }

    #[test]
    fn cap_applies_after_filtering_and_keeps_order() {
        let mut rows = Vec::new();
        for i in 0..500 {
            rows.push(json!([null, "X", "X", null, 1, 1.0, 1.0]));
            rows.push(row(&format!("{:06x}", i), None));
        }

        let snapshot = normalize(StatesResponse { time: None, states: Some(rows) }, 200, 0);

        assert_eq!(snapshot.states.len(), 200);
        assert_eq!(snapshot.states[0].id, "000000");
        assert_eq!(snapshot.states[199].id, format!("{:06x}", 199));
    }

    #[test]
    fn null_states_is_an_empty_healthy_snapshot() {
        let snapshot = normalize(StatesResponse { time: Some(1), states: None }, 200, 0);
        assert!(snapshot.states.is_empty());
        assert!(snapshot.message.is_none());
    }

    #[tokio::test]
    async fn rate_limited_upstream_degrades_instead_of_failing() {
        let feed = StateFeed::new(Arc::new(FixedStates::err(UpstreamError::Status { status: 429 })), 200);

        let snapshot = feed.fetch_snapshot().await;

        assert!(snapshot.states.is_empty());
        assert!(snapshot.message.as_deref().is_some_and(|m| m.contains("429")));
        assert!(snapshot.fetched_at.is_some());
    }

    #[tokio::test]
    async fn healthy_fetch_is_capped() {
        let rows = (0..250).map(|i| row(&format!("{:06x}", i), Some("TEST"))).collect();
        let mut feed = StateFeed::new(Arc::new(FixedStates::ok(rows)), 200);
        feed.set_max_aircraft(50);

        let snapshot = feed.fetch_snapshot().await;

        assert_eq!(snapshot.states.len(), 50);
        assert!(!snapshot.is_degraded());
    }
}
