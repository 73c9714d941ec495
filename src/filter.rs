use crate::types::{ AircraftState, Snapshot };

/// Aircraft whose callsign or transponder id contains `query`, case-insensitively.
///
/// A missing or blank query keeps every aircraft in snapshot order.
pub fn filter_aircraft<'a>(snapshot: &'a Snapshot, query: Option<&str>) -> Vec<&'a AircraftState> {
    let needle = query.map(str::trim).unwrap_or_default().to_lowercase();
    if needle.is_empty() {
        return snapshot.states.iter().collect();
    }

    snapshot.states
        .iter()
        .filter(|aircraft| matches(aircraft, &needle))
        .collect()
}

fn matches(aircraft: &AircraftState, needle: &str) -> bool {
    aircraft.id.to_lowercase().contains(needle) ||
        aircraft.callsign.as_ref().is_some_and(|cs| cs.to_lowercase().contains(needle))
}
