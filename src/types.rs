use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Bulk state response from `/states/all`
#[derive(Debug, Clone, Deserialize)]
pub struct StatesResponse {
    /// Upstream timestamp the state vectors are associated with
    #[serde(default)]
    pub time: Option<i64>,

    /// Positional state vectors; `null` when nothing is being tracked
    #[serde(default)]
    pub states: Option<Vec<Value>>,
}

/// How the upstream obtained an aircraft position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    #[serde(rename = "ads-b")]
    AdsB,
    Asterix,
    Mlat,
    Flarm,
}

impl PositionSource {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PositionSource::AdsB),
            1 => Some(PositionSource::Asterix),
            2 => Some(PositionSource::Mlat),
            3 => Some(PositionSource::Flarm),
            _ => None,
        }
    }
}

/// One observed aircraft, decoded from a positional state vector
///
/// Serialized with the upstream's field names so the map client can keep
/// consuming the familiar shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftState {
    /// ICAO 24-bit transponder address, lowercase hex
    #[serde(rename = "icao24")]
    pub id: String,

    /// Trimmed callsign, `None` when blank
    pub callsign: Option<String>,

    pub origin_country: String,

    /// Unix seconds of the last position update
    #[serde(rename = "time_position")]
    pub time_position_at: Option<i64>,

    /// Unix seconds of the last message of any kind
    #[serde(rename = "last_contact")]
    pub last_contact_at: Option<i64>,

    pub longitude: f64,
    pub latitude: f64,

    #[serde(rename = "geo_altitude")]
    pub geo_altitude_m: Option<f64>,

    pub on_ground: bool,

    /// Ground speed in m/s
    #[serde(rename = "velocity")]
    pub velocity_ms: Option<f64>,

    /// Degrees clockwise from north (0 to 359.9)
    #[serde(rename = "true_track")]
    pub true_track_deg: Option<f64>,

    /// Climb rate in m/s, negative when descending
    #[serde(rename = "vertical_rate")]
    pub vertical_rate_ms: Option<f64>,

    /// Receiver ids that contributed to this vector
    pub sensors: Option<Vec<i64>>,

    #[serde(rename = "baro_altitude")]
    pub baro_altitude_m: Option<f64>,

    pub squawk: Option<String>,

    /// Special purpose indicator
    pub spi: bool,

    pub position_source: Option<PositionSource>,

    pub category: Option<i64>,
}

// Tuple layout of an OpenSky state vector
const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_ORIGIN_COUNTRY: usize = 2;
const IDX_TIME_POSITION: usize = 3;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_GEO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_VERTICAL_RATE: usize = 11;
const IDX_SENSORS: usize = 12;
const IDX_BARO_ALTITUDE: usize = 13;
const IDX_SQUAWK: usize = 14;
const IDX_SPI: usize = 15;
const IDX_POSITION_SOURCE: usize = 16;
const IDX_CATEGORY: usize = 17;

impl AircraftState {
    /// Decode a positional state vector.
    ///
    /// Returns `None` when the row cannot be displayed: it is not an array, or
    /// the transponder id, longitude or latitude is missing. Every other field
    /// is optional and a `null` (or a tuple that is too short) leaves it absent.
    pub fn from_tuple(row: &Value) -> Option<Self> {
        let row = row.as_array()?;

        let id = text_at(row, IDX_ICAO24)?.to_lowercase();
        if id.is_empty() {
            return None;
        }
        let longitude = float_at(row, IDX_LONGITUDE)?;
        let latitude = float_at(row, IDX_LATITUDE)?;

        Some(Self {
            id,
            callsign: text_at(row, IDX_CALLSIGN).map(str::to_string),
            origin_country: text_at(row, IDX_ORIGIN_COUNTRY).unwrap_or_default().to_string(),
            time_position_at: int_at(row, IDX_TIME_POSITION),
            last_contact_at: int_at(row, IDX_LAST_CONTACT),
            longitude,
            latitude,
            geo_altitude_m: float_at(row, IDX_GEO_ALTITUDE),
            on_ground: bool_at(row, IDX_ON_GROUND),
            velocity_ms: float_at(row, IDX_VELOCITY),
            true_track_deg: float_at(row, IDX_TRUE_TRACK),
            vertical_rate_ms: float_at(row, IDX_VERTICAL_RATE),
            sensors: row
                .get(IDX_SENSORS)
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_i64).collect()),
            baro_altitude_m: float_at(row, IDX_BARO_ALTITUDE),
            squawk: text_at(row, IDX_SQUAWK).map(str::to_string),
            spi: bool_at(row, IDX_SPI),
            position_source: int_at(row, IDX_POSITION_SOURCE).and_then(PositionSource::from_code),
            category: int_at(row, IDX_CATEGORY),
        })
    }
}

/// Trimmed, non-empty string at `idx`
fn text_at(row: &[Value], idx: usize) -> Option<&str> {
    row.get(idx)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn float_at(row: &[Value], idx: usize) -> Option<f64> {
    row.get(idx).and_then(Value::as_f64)
}

fn int_at(row: &[Value], idx: usize) -> Option<i64> {
    let value = row.get(idx)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn bool_at(row: &[Value], idx: usize) -> bool {
    row.get(idx).and_then(Value::as_bool).unwrap_or(false)
}

/// Every aircraft observed in one poll cycle
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub states: Vec<AircraftState>,

    /// Upstream timestamp of the state vectors
    pub upstream_time: Option<i64>,

    /// Unix seconds when this cycle's fetch completed; `None` before the first cycle
    pub fetched_at: Option<i64>,

    /// Set when the cycle degraded to an empty result
    pub message: Option<String>,
}

impl Snapshot {
    pub fn degraded(message: String, fetched_at: i64) -> Self {
        Self {
            states: Vec::new(),
            upstream_time: None,
            fetched_at: Some(fetched_at),
            message: Some(message),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.message.is_some()
    }
}

/// One flight segment from `/flights/aircraft`
#[derive(Debug, Clone, Deserialize)]
pub struct FlightRecord {
    pub icao24: String,

    #[serde(rename = "firstSeen")]
    pub first_seen: i64,

    #[serde(rename = "estDepartureAirport")]
    pub est_departure_airport: Option<String>,

    #[serde(rename = "lastSeen")]
    pub last_seen: i64,

    #[serde(rename = "estArrivalAirport")]
    pub est_arrival_airport: Option<String>,

    pub callsign: Option<String>,

    #[serde(rename = "departureAirportCandidatesCount", default)]
    pub departure_airport_candidates_count: i64,

    #[serde(rename = "arrivalAirportCandidatesCount", default)]
    pub arrival_airport_candidates_count: i64,
}

/// Departure/arrival summary for one aircraft
#[derive(Debug, Clone, PartialEq)]
pub struct RouteProjection {
    /// ICAO code of the estimated departure airport
    pub departure_airport: Option<String>,
    /// ICAO code of the estimated arrival airport
    pub arrival_airport: Option<String>,
    pub callsign: Option<String>,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
}

impl From<&FlightRecord> for RouteProjection {
    fn from(record: &FlightRecord) -> Self {
        Self {
            departure_airport: non_blank(record.est_departure_airport.as_deref()),
            arrival_airport: non_blank(record.est_arrival_airport.as_deref()),
            callsign: non_blank(record.callsign.as_deref()),
            first_seen_at: record.first_seen,
            last_seen_at: record.last_seen,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
