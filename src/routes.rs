use std::sync::Arc;
use std::time::Duration;

use crate::network::TrafficSource;
use crate::types::{ FlightRecord, RouteProjection };

/// Default look-back window for flight segments
pub const DEFAULT_ROUTE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves the departure/arrival of one aircraft from its recent flights
pub struct RouteResolver {
    source: Arc<dyn TrafficSource>,
    window: Duration,
}

impl RouteResolver {
    pub fn new(source: Arc<dyn TrafficSource>, window: Duration) -> Self {
        Self { source, window }
    }

    /// Route of `icao24` from the most recent flight ending before `now` (unix seconds).
    ///
    /// `None` covers both "no flights in the window" and any upstream failure.
    /// Enrichment is best-effort, so failures are only logged.
    pub async fn resolve_route(&self, icao24: &str, now: i64) -> Option<RouteProjection> {
        let begin = now - (self.window.as_secs() as i64);

        let flights = match self.source.fetch_flights(icao24, begin, now).await {
            Ok(flights) => flights,
            Err(e) => {
                tracing::warn!("Route lookup for {} failed: {}", icao24, e);
                return None;
            }
        };

        match most_recent(&flights) {
            Some(flight) => {
                tracing::debug!(
                    "Route for {} from {} flights: {:?} -> {:?} ({}/{} airport candidates)",
                    flight.icao24,
                    flights.len(),
                    flight.est_departure_airport,
                    flight.est_arrival_airport,
                    flight.departure_airport_candidates_count,
                    flight.arrival_airport_candidates_count
                );
                Some(RouteProjection::from(flight))
            }
            None => {
                tracing::debug!("No flights for {} in the last {:?}", icao24, self.window);
                None
            }
        }
    }
}

/// Flight with the greatest `last_seen`; ties keep the first occurrence
pub fn most_recent(flights: &[FlightRecord]) -> Option<&FlightRecord> {
    flights.iter().fold(None, |best, flight| {
        match best {
            Some(current) if current.last_seen >= flight.last_seen => Some(current),
            _ => Some(flight),
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::types::StatesResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use tokio::sync::Barrier;

    pub fn flight(last_seen: i64, dep: Option<&str>, arr: Option<&str>) -> FlightRecord {
        FlightRecord {
            icao24: "a0b1c2".into(),
            first_seen: last_seen - 3600,
            est_departure_airport: dep.map(str::to_string),
            last_seen,
            est_arrival_airport: arr.map(str::to_string),
            callsign: Some("DAL42   ".into()),
            departure_airport_candidates_count: 0,
            arrival_airport_candidates_count: 0,
        }
    }

    /// Source serving canned flights and recording queries
    pub struct FlightsSource {
        pub flights: Vec<FlightRecord>,
        pub fail: bool,
        pub calls: AtomicUsize,
        pub last_window: Mutex<Option<(i64, i64)>>,
        pub gate: Option<Barrier>,
    }

    impl FlightsSource {
        pub fn new(flights: Vec<FlightRecord>) -> Self {
            Self {
                flights,
                fail: false,
                calls: AtomicUsize::new(0),
                last_window: Mutex::new(None),
                gate: None,
            }
        }

        pub fn failing() -> Self {
            Self { fail: true, ..Self::new(Vec::new()) }
        }

        /// Hold every lookup until `n` of them are in flight
        pub fn gated(flights: Vec<FlightRecord>, n: usize) -> Self {
            Self { gate: Some(Barrier::new(n)), ..Self::new(flights) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TrafficSource for FlightsSource {
        async fn fetch_states(&self) -> Result<StatesResponse, UpstreamError> {
            Ok(StatesResponse { time: None, states: None })
        }

        async fn fetch_flights(
            &self,
            _icao24: &str,
            begin: i64,
            end: i64
        ) -> Result<Vec<FlightRecord>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_window.lock() = Some((begin, end));
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }
            if self.fail {
                return Err(UpstreamError::Status { status: 503 });
            }
            Ok(self.flights.clone())
        }
    }

    #[test]
    fn most_recent_picks_greatest_last_seen() {
        let flights = vec![
            flight(100, Some("EGLL"), Some("KBOS")),
            flight(300, Some("KJFK"), Some("KLAX")),
            flight(200, Some("KLAX"), Some("KSFO"))
        ];

        let best = most_recent(&flights).unwrap();
        assert_eq!(best.last_seen, 300);
        assert_eq!(best.est_departure_airport.as_deref(), Some("KJFK"));
    }

    #[test]
    fn most_recent_tie_keeps_first_occurrence() {
        let flights = vec![
            flight(300, Some("EGLL"), None),
            flight(300, Some("LFPG"), None)
        ];

        assert_eq!(most_recent(&flights).unwrap().est_departure_airport.as_deref(), Some("EGLL"));
        assert!(most_recent(&[]).is_none());
    }

    #[tokio::test]
    async fn resolves_latest_flight_over_trailing_window() {
        let source = Arc::new(
            FlightsSource::new(vec![flight(100, None, None), flight(300, Some("KJFK"), Some("KLAX"))])
        );
        let resolver = RouteResolver::new(source.clone(), DEFAULT_ROUTE_WINDOW);

        let route = resolver.resolve_route("a0b1c2", 1_000_000).await.unwrap();

        assert_eq!(route.departure_airport.as_deref(), Some("KJFK"));
        assert_eq!(route.arrival_airport.as_deref(), Some("KLAX"));
        assert_eq!(route.callsign.as_deref(), Some("DAL42"));
        assert_eq!(route.last_seen_at, 300);
        assert_eq!(*source.last_window.lock(), Some((1_000_000 - 86_400, 1_000_000)));
    }

    #[tokio::test]
    async fn empty_or_failed_lookup_is_not_found() {
        let empty = RouteResolver::new(Arc::new(FlightsSource::new(Vec::new())), DEFAULT_ROUTE_WINDOW);
        assert!(empty.resolve_route("a0b1c2", 1_000).await.is_none());

        let failing = RouteResolver::new(Arc::new(FlightsSource::failing()), DEFAULT_ROUTE_WINDOW);
        assert!(failing.resolve_route("a0b1c2", 1_000).await.is_none());
    }
}
