//! Public transit data operations.
//!
//! One [`TransitService`] instance owns every piece of shared state the
//! layer needs (tiered cache, in-flight map, snapshot memo, virtual
//! pattern cache, request queue) with its collaborators injected, so
//! tests get isolation from fresh instances.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CachePolicy, TieredCache};
use crate::domain::{PatternPolyline, Route, Schedule, Stop, VehiclePosition};
use crate::error::FetchError;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::looproute::{
    generate_virtual_patterns, is_virtual_suffix, physical_suffix, slice_polyline, slice_stops,
    EndpointLoopDetector, LoopDetector, VirtualPattern,
};
use crate::queue::RequestQueue;
use crate::registry::{Source, SourceId, SourceRegistry};
use crate::resolver::{Resolved, SourceResolver};
use crate::resource::Resource;
use crate::snapshot::{DirSnapshots, NoSnapshots, PreloadIndex, SnapshotSource, SnapshotStore};
use crate::store::{DurableStore, MemoryStore};

/// The data-access layer over all registered city networks.
///
/// Results carry app-space identifiers and a `_sourceId` tag naming the
/// network that produced them.
pub struct TransitService {
    registry: Arc<SourceRegistry>,
    cache: TieredCache,
    resolver: SourceResolver,
    snapshots: Arc<SnapshotStore>,
    locale: String,
    detector: Arc<dyn LoopDetector>,
    /// Split decisions for circular routes, keyed by app route id.
    /// Process-wide so stop and polyline slices reuse the same split.
    virtual_patterns: Mutex<HashMap<String, Vec<VirtualPattern>>>,
    /// Sources that answered for an id before; lets later lookups skip
    /// the cross-source hunt.
    known_sources: Mutex<HashMap<String, SourceId>>,
}

/// Builder wiring the service's collaborators.
pub struct TransitServiceBuilder {
    registry: SourceRegistry,
    store: Arc<dyn DurableStore>,
    http: Option<Arc<dyn HttpClient>>,
    snapshots: Arc<dyn SnapshotSource>,
    locale: String,
    detector: Option<Arc<dyn LoopDetector>>,
    loop_exclusions: Vec<String>,
}

impl Default for TransitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitServiceBuilder {
    pub fn new() -> Self {
        Self {
            registry: SourceRegistry::builtin(),
            store: Arc::new(MemoryStore::new()),
            http: None,
            snapshots: Arc::new(NoSnapshots),
            locale: String::from("en"),
            detector: None,
            loop_exclusions: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Inject the durable key-value store backing the cache.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_snapshot_source(mut self, snapshots: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Bundle snapshots from a flat directory of JSON files.
    pub fn with_snapshot_dir(self, root: impl Into<PathBuf>) -> Self {
        self.with_snapshot_source(Arc::new(DirSnapshots::new(root)))
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Route short names that must never be split into virtual halves.
    pub fn with_loop_exclusions(mut self, excluded: impl IntoIterator<Item = String>) -> Self {
        self.loop_exclusions = excluded.into_iter().collect();
        self
    }

    /// Swap the loop detection heuristic entirely.
    pub fn with_loop_detector(mut self, detector: Arc<dyn LoopDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn build(self) -> TransitService {
        let registry = Arc::new(self.registry);
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let snapshots = Arc::new(SnapshotStore::new(
            self.snapshots,
            Arc::clone(&registry),
            self.locale.clone(),
        ));
        let cache = TieredCache::new(
            self.store,
            http,
            Arc::clone(&snapshots),
            RequestQueue::v3(),
        );
        let detector = self
            .detector
            .unwrap_or_else(|| Arc::new(EndpointLoopDetector::new(self.loop_exclusions)));

        TransitService {
            resolver: SourceResolver::new(Arc::clone(&registry), cache.clone()),
            registry,
            cache,
            snapshots,
            locale: self.locale,
            detector,
            virtual_patterns: Mutex::new(HashMap::new()),
            known_sources: Mutex::new(HashMap::new()),
        }
    }
}

impl TransitService {
    pub fn builder() -> TransitServiceBuilder {
        TransitServiceBuilder::new()
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn offline(&self) -> bool {
        self.cache.offline()
    }

    /// Mark the device offline or online. Offline reads skip retries and
    /// fail over to their fallbacks immediately.
    pub fn set_offline(&self, offline: bool) {
        self.cache.set_offline(offline);
    }

    /// Eagerly build the bundled snapshot index. Memoized; concurrent
    /// callers share one load.
    pub async fn preload_snapshots(&self) -> &PreloadIndex {
        self.snapshots.preload().await
    }

    /// All routes across all sources. One source's outage degrades
    /// coverage instead of failing the call.
    pub async fn fetch_routes(&self, policy: CachePolicy) -> Result<Vec<Route>, FetchError> {
        let resource = Resource::Routes {
            locale: self.locale.clone(),
        };
        let mut routes = Vec::new();
        for source in self.aggregate_order() {
            match self.cache.get(source, &resource, policy).await {
                Ok(Some(value)) => match serde_json::from_value::<Vec<Route>>(value) {
                    Ok(list) => {
                        routes.extend(list.into_iter().map(|route| route.normalize(source)));
                    }
                    Err(error) => {
                        warn!(source = %source.id, %error, "routes payload has unexpected shape");
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    warn!(source = %source.id, %error, "routes fetch failed, degrading coverage");
                }
            }
        }
        Ok(routes)
    }

    /// All stops across all sources, de-duplicated by exact coordinates:
    /// a secondary-source stop sitting on a primary stop's position is
    /// merged into its `mergedIds` list.
    pub async fn fetch_stops(&self, policy: CachePolicy) -> Result<Vec<Stop>, FetchError> {
        let resource = Resource::Stops {
            locale: self.locale.clone(),
        };
        let mut stops: Vec<Stop> = Vec::new();
        let mut by_position: HashMap<(u64, u64), usize> = HashMap::new();

        for source in self.aggregate_order() {
            let list = match self.cache.get(source, &resource, policy).await {
                Ok(Some(value)) => match serde_json::from_value::<Vec<Stop>>(value) {
                    Ok(list) => list,
                    Err(error) => {
                        warn!(source = %source.id, %error, "stops payload has unexpected shape");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(error) => {
                    warn!(source = %source.id, %error, "stops fetch failed, degrading coverage");
                    continue;
                }
            };

            for stop in list {
                let stop = stop.normalize(source);
                match by_position.entry(stop.position().bit_key()) {
                    std::collections::hash_map::Entry::Occupied(existing) => {
                        stops[*existing.get()].merged_ids.push(stop.id);
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        vacant.insert(stops.len());
                        stops.push(stop);
                    }
                }
            }
        }

        Ok(stops)
    }

    /// Details of one route. A route with exactly one circular pattern
    /// comes back with two virtual directional patterns instead.
    pub async fn fetch_route_details(
        &self,
        route_id: &str,
        policy: CachePolicy,
    ) -> Result<Route, FetchError> {
        let resolved = self
            .resolve_route(route_id, policy, |_, raw| Resource::RouteDetails {
                raw_route_id: raw.to_string(),
            })
            .await?;

        let source = self.source_of(&resolved);
        let route: Route =
            serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;
        let mut route = route.normalize(source);
        self.virtualize_loop(&mut route);
        Ok(route)
    }

    /// Ordered stops of one pattern. Virtual suffixes are sliced out of
    /// the physical pattern's sequence.
    pub async fn fetch_route_stops(
        &self,
        route_id: &str,
        suffix: &str,
        policy: CachePolicy,
    ) -> Result<Vec<Stop>, FetchError> {
        let virtual_pattern = self.virtual_pattern(route_id, suffix, policy).await;
        let physical = physical_suffix(suffix).to_string();

        let resolved = self
            .resolve_route(route_id, policy, |_, raw| Resource::RouteStops {
                raw_route_id: raw.to_string(),
                suffix: physical.clone(),
            })
            .await?;

        let source = self.source_of(&resolved);
        let stops: Vec<Stop> =
            serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;
        let stops: Vec<Stop> = stops
            .into_iter()
            .map(|stop| stop.normalize(source))
            .collect();

        if is_virtual_suffix(suffix) {
            Ok(slice_stops(
                &stops,
                suffix,
                virtual_pattern.map(|pattern| pattern.slice),
            ))
        } else {
            Ok(stops)
        }
    }

    /// Polylines for the requested pattern suffixes. Virtual suffixes
    /// are sliced at the vertex nearest their recorded split point, so
    /// they stay consistent with the stop slices.
    pub async fn fetch_route_polyline(
        &self,
        route_id: &str,
        suffixes: &[String],
        policy: CachePolicy,
    ) -> Result<Vec<PatternPolyline>, FetchError> {
        let mut physical: Vec<String> = Vec::new();
        for suffix in suffixes {
            let base = physical_suffix(suffix).to_string();
            if !physical.contains(&base) {
                physical.push(base);
            }
        }

        let resolved = self
            .resolve_route(route_id, policy, |_, raw| Resource::Polylines {
                raw_route_id: raw.to_string(),
                suffixes: physical.clone(),
            })
            .await?;

        let polylines: Vec<PatternPolyline> =
            serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;

        let mut out = Vec::with_capacity(suffixes.len());
        for suffix in suffixes {
            let base = physical_suffix(suffix);
            let Some(line) = polylines
                .iter()
                .find(|line| line.pattern_suffix == base)
            else {
                continue;
            };

            if is_virtual_suffix(suffix) {
                let virtual_pattern = self.virtual_pattern(route_id, suffix, policy).await;
                out.push(PatternPolyline {
                    pattern_suffix: suffix.clone(),
                    points: slice_polyline(
                        &line.points,
                        suffix,
                        virtual_pattern.map(|pattern| pattern.split_point),
                    ),
                });
            } else {
                out.push(line.clone());
            }
        }

        Ok(out)
    }

    /// Scheduled departures of one route filtered to the given stops.
    pub async fn fetch_schedule_for_stop(
        &self,
        route_id: &str,
        stop_ids: &[String],
        policy: CachePolicy,
    ) -> Result<Vec<Schedule>, FetchError> {
        let details = self.fetch_route_details(route_id, policy).await?;
        let suffixes: BTreeSet<String> = details
            .patterns
            .iter()
            .map(|pattern| physical_suffix(&pattern.suffix).to_string())
            .collect();

        let mut schedules = Vec::new();
        for suffix in suffixes {
            let resolved = match self
                .resolve_route(route_id, policy, |_, raw| Resource::Schedule {
                    raw_route_id: raw.to_string(),
                    suffix: suffix.clone(),
                })
                .await
            {
                Ok(resolved) => resolved,
                Err(FetchError::NotFound { .. }) => continue,
                Err(error) => return Err(error),
            };

            let source = self.source_of(&resolved);
            let mut schedule: Schedule =
                serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;
            if schedule.pattern_suffix.is_empty() {
                schedule.pattern_suffix = suffix.clone();
            }
            schedule.departures = schedule
                .departures
                .into_iter()
                .map(|mut departures| {
                    departures.stop_id = source.to_app_space(&departures.stop_id);
                    departures
                })
                .filter(|departures| stop_ids.contains(&departures.stop_id))
                .collect();

            if !schedule.departures.is_empty() {
                schedules.push(schedule);
            }
        }

        Ok(schedules)
    }

    /// Live vehicle positions on one pattern. A route with no active
    /// vehicles yields an empty list, not an error. Virtual suffixes
    /// report back under the requested suffix.
    pub async fn fetch_vehicle_positions(
        &self,
        route_id: &str,
        suffix: &str,
        policy: CachePolicy,
    ) -> Result<Vec<VehiclePosition>, FetchError> {
        let physical = physical_suffix(suffix).to_string();
        let resolved = match self
            .resolve_route(route_id, policy, |_, raw| Resource::Positions {
                raw_route_id: raw.to_string(),
                suffixes: vec![physical.clone()],
            })
            .await
        {
            Ok(resolved) => resolved,
            Err(FetchError::NotFound { .. }) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let positions: Vec<VehiclePosition> =
            serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;
        Ok(positions
            .into_iter()
            .map(|mut position| {
                if position.pattern_suffix == physical {
                    position.pattern_suffix = suffix.to_string();
                }
                position
            })
            .collect())
    }

    /// Routes serving one stop.
    pub async fn fetch_stop_routes(
        &self,
        stop_id: &str,
        policy: CachePolicy,
    ) -> Result<Vec<Route>, FetchError> {
        let resolved = self
            .resolver
            .resolve(stop_id, policy, |_, raw| Resource::StopRoutes {
                raw_stop_id: raw.to_string(),
            })
            .await?;

        let source = self.source_of(&resolved);
        let routes: Vec<Route> =
            serde_json::from_value(resolved.payload).map_err(FetchError::decode)?;
        Ok(routes
            .into_iter()
            .map(|route| route.normalize(source))
            .collect())
    }

    /// Live arrival times at one stop, passed through opaquely.
    pub async fn fetch_arrival_times(
        &self,
        stop_id: &str,
        policy: CachePolicy,
    ) -> Result<Value, FetchError> {
        let resolved = self
            .resolver
            .resolve(stop_id, policy, |_, raw| Resource::ArrivalTimes {
                raw_stop_id: raw.to_string(),
            })
            .await?;
        Ok(resolved.payload)
    }

    /// Aggregate reads visit the default source first so its entities
    /// win coordinate merges.
    fn aggregate_order(&self) -> Vec<&Source> {
        self.registry.resolution_order("")
    }

    fn source_of(&self, resolved: &Resolved) -> &Source {
        self.registry
            .get(&resolved.source_id)
            .expect("resolver only yields registered sources")
    }

    /// Resolve a route-scoped resource, remembering which source
    /// answered so later calls skip the hunt.
    async fn resolve_route<F>(
        &self,
        route_id: &str,
        policy: CachePolicy,
        build: F,
    ) -> Result<Resolved, FetchError>
    where
        F: Fn(&Source, &str) -> Resource,
    {
        let hint = self
            .known_sources
            .lock()
            .expect("known-source map lock is not poisoned")
            .get(route_id)
            .cloned();

        let resolved = self
            .resolver
            .resolve_known(hint.as_ref(), route_id, policy, build)
            .await?;

        self.known_sources
            .lock()
            .expect("known-source map lock is not poisoned")
            .insert(route_id.to_string(), resolved.source_id.clone());

        Ok(resolved)
    }

    /// Replace a route's single circular pattern with its two virtual
    /// halves, recording the split so stop and polyline requests for the
    /// virtual suffixes reuse the same decision.
    fn virtualize_loop(&self, route: &mut Route) {
        if route.patterns.len() != 1 {
            return;
        }
        let pattern = route.patterns[0].clone();
        let stops = match &pattern.stops {
            Some(stops) if self.detector.is_loop(stops, &route.short_name) => stops.clone(),
            _ => return,
        };

        let virtuals = generate_virtual_patterns(&pattern, &stops, &route.long_name);
        route.patterns = virtuals
            .iter()
            .map(|virtual_pattern| virtual_pattern.to_pattern(&stops))
            .collect();

        self.virtual_patterns
            .lock()
            .expect("virtual pattern cache lock is not poisoned")
            .insert(route.id.clone(), virtuals.to_vec());
    }

    /// The recorded split for a virtual suffix, deriving it from the
    /// route details on first use in this process.
    async fn virtual_pattern(
        &self,
        route_id: &str,
        suffix: &str,
        policy: CachePolicy,
    ) -> Option<VirtualPattern> {
        if !is_virtual_suffix(suffix) {
            return None;
        }

        let cached = self.lookup_virtual(route_id, suffix);
        if cached.is_some() {
            return cached;
        }

        if let Err(error) = self.fetch_route_details(route_id, policy).await {
            debug!(route_id, %error, "could not derive virtual split from route details");
        }
        self.lookup_virtual(route_id, suffix)
    }

    fn lookup_virtual(&self, route_id: &str, suffix: &str) -> Option<VirtualPattern> {
        self.virtual_patterns
            .lock()
            .expect("virtual pattern cache lock is not poisoned")
            .get(route_id)
            .and_then(|patterns| {
                patterns
                    .iter()
                    .find(|pattern| pattern.suffix == suffix)
                    .cloned()
            })
    }
}
