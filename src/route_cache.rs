use dashmap::DashMap;

use crate::routes::RouteResolver;
use crate::types::RouteProjection;

/// Memoizes resolved routes per aircraft for the life of the process
///
/// Only found routes are stored, so an aircraft without flight history is
/// looked up again next time. Nothing is ever evicted; the snapshot cap keeps
/// the number of distinct ids a session can select bounded.
pub struct RouteCache {
    resolver: RouteResolver,
    routes: DashMap<String, RouteProjection>,
}

impl RouteCache {
    pub fn new(resolver: RouteResolver) -> Self {
        Self {
            resolver,
            routes: DashMap::new(),
        }
    }

    /// Cached route for `icao24`
    pub fn get(&self, icao24: &str) -> Option<RouteProjection> {
        self.routes.get(icao24).map(|entry| entry.value().clone())
    }

    /// Serve from cache, otherwise resolve and store a found route.
    ///
    /// Concurrent calls for the same id may both reach upstream; the second
    /// write replaces the first with equivalent content.
    pub async fn resolve_and_cache(&self, icao24: &str, now: i64) -> Option<RouteProjection> {
        if let Some(route) = self.get(icao24) {
            tracing::debug!("Route cache hit for {}", icao24);
            return Some(route);
        }

        let route = self.resolver.resolve_route(icao24, now).await?;
        self.routes.insert(icao24.to_string(), route.clone());
        tracing::debug!(cached = self.routes.len(), "Cached route for {}", icao24);

        Some(route)
    }

    /// Number of cached routes
    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}
