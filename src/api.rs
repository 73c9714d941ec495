use axum::{
    extract::{ Path, Query, State },
    http::StatusCode,
    Json,
};
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::filter::filter_aircraft;
use crate::route_cache::RouteCache;
use crate::state::{ FeedState, SyncStatus };
use crate::sync::SyncHandle;
use crate::types::{ AircraftState, RouteProjection };

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedState>,
    pub routes: Arc<RouteCache>,
    pub sync: SyncHandle,
}

#[derive(Debug, Default, Deserialize)]
pub struct AircraftQuery {
    /// Callsign or transponder id fragment
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AircraftResponse {
    pub states: Vec<AircraftState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<i64>,
}

/// Route popup payload; unknown airports are `null`, never an error
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub departure: Option<String>,
    pub arrival: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

impl From<Option<RouteProjection>> for RouteResponse {
    fn from(route: Option<RouteProjection>) -> Self {
        match route {
            Some(route) =>
                Self {
                    departure: route.departure_airport,
                    arrival: route.arrival_airport,
                    callsign: route.callsign,
                    first_seen: Some(route.first_seen_at),
                    last_seen: Some(route.last_seen_at),
                },
            None =>
                Self {
                    departure: None,
                    arrival: None,
                    callsign: None,
                    first_seen: None,
                    last_seen: None,
                },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub sync: SyncStatus,
    pub validating: bool,
    pub poll_interval_secs: u64,
    pub clustering: bool,
    pub cached_routes: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub poll_interval_secs: Option<u64>,
    pub clustering: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub poll_interval_secs: u64,
    pub clustering: bool,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub queued: bool,
}

/// `GET /aircraft` - latest snapshot, optionally narrowed by `q`.
/// Always 200; a degraded cycle shows up as empty states plus a message.
pub async fn list_aircraft(
    State(app): State<AppState>,
    Query(query): Query<AircraftQuery>
) -> Json<AircraftResponse> {
    let snapshot = app.feed.snapshot();
    let states = filter_aircraft(&snapshot, query.q.as_deref())
        .into_iter()
        .cloned()
        .collect();

    Json(AircraftResponse {
        states,
        message: snapshot.message.clone(),
        time: snapshot.upstream_time,
        fetched_at: snapshot.fetched_at,
    })
}

/// `GET /aircraft/{id}` - departure and arrival of one aircraft
pub async fn get_route(State(app): State<AppState>, Path(id): Path<String>) -> Json<RouteResponse> {
    let icao24 = id.trim().to_lowercase();
    if !is_icao24(&icao24) {
        tracing::debug!("Ignoring route lookup for invalid id {:?}", id);
        return Json(RouteResponse::from(None));
    }

    let now = chrono::Utc::now().timestamp();
    let route = app.routes.resolve_and_cache(&icao24, now).await;

    Json(RouteResponse::from(route))
}

/// `GET /status`
pub async fn status(State(app): State<AppState>) -> Json<StatusResponse> {
    let sync = app.feed.sync_status();
    let config = app.feed.get_config();

    Json(StatusResponse {
        validating: sync.validating(),
        sync,
        poll_interval_secs: config.sync.poll_interval().as_secs(),
        clustering: config.display.clustering,
        cached_routes: app.routes.len(),
    })
}

/// `POST /sync/retry`
pub async fn retry(State(app): State<AppState>) -> (StatusCode, Json<RetryResponse>) {
    let queued = app.sync.retry_now();
    (StatusCode::ACCEPTED, Json(RetryResponse { queued }))
}

/// `PUT /settings` - poll period (clamped to 1..=60) and clustering toggle
pub async fn update_settings(
    State(app): State<AppState>,
    Json(update): Json<SettingsUpdate>
) -> Json<Settings> {
    if let Some(secs) = update.poll_interval_secs {
        app.sync.set_poll_interval(secs);
    }
    if let Some(clustering) = update.clustering {
        app.sync.set_clustering(clustering);
    }

    Json(Settings {
        poll_interval_secs: app.feed.poll_interval().as_secs(),
        clustering: app.feed.clustering(),
    })
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// 24-bit transponder address in hex
fn is_icao24(id: &str) -> bool {
    id.len() == 6 && id.chars().all(|c| c.is_ascii_hexdigit())
}
