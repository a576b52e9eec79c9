//! Bundled static-snapshot fallback index.
//!
//! Point-in-time JSON snapshots of each source's data ship with the app
//! and answer requests when both the network and the cache miss. Two
//! modes: an eagerly built in-memory index over every source's route
//! details (memoized, shared across concurrent callers), and an
//! on-demand lookup that serves the narrowest slice matching a resource.
//! Stale snapshot output never blocks the system: absent or unparsable
//! files are logged and treated as misses.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::domain::Route;
use crate::registry::{Source, SourceRegistry};
use crate::resource::{snapshot_key, Resource};

/// Provider of bundled snapshot files by name.
pub trait SnapshotSource: Send + Sync {
    /// Raw file contents, or `None` when the file is not bundled.
    fn read<'a>(
        &'a self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

/// Snapshot files laid out flat in one directory.
#[derive(Debug, Clone)]
pub struct DirSnapshots {
    root: PathBuf,
}

impl DirSnapshots {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SnapshotSource for DirSnapshots {
    fn read<'a>(
        &'a self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move { tokio::fs::read_to_string(self.root.join(file_name)).await.ok() })
    }
}

/// Source for builds that bundle no snapshots; every lookup misses.
#[derive(Debug, Default, Clone)]
pub struct NoSnapshots;

impl SnapshotSource for NoSnapshots {
    fn read<'a>(
        &'a self,
        file_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let _ = file_name;
        Box::pin(async move { None })
    }
}

fn routes_file(source: &Source, locale: &str) -> String {
    format!("{}_routes_{locale}.json", source.id)
}

fn stops_file(source: &Source, locale: &str) -> String {
    format!("{}_stops_{locale}.json", source.id)
}

fn routes_details_file(source: &Source, locale: &str) -> String {
    format!("{}_routes_details_{locale}.json", source.id)
}

fn schedules_file(source: &Source) -> String {
    format!("{}_schedules.json", source.id)
}

fn polylines_file(source: &Source) -> String {
    format!("{}_polylines.json", source.id)
}

/// Eagerly built index over every source's bundled route details, with
/// embedded ids already converted to app space.
#[derive(Debug, Default)]
pub struct PreloadIndex {
    routes: HashMap<String, Route>,
    stop_routes: HashMap<String, BTreeSet<String>>,
}

impl PreloadIndex {
    pub fn route(&self, app_route_id: &str) -> Option<&Route> {
        self.routes.get(app_route_id)
    }

    pub fn routes_for_stop(&self, app_stop_id: &str) -> Option<&BTreeSet<String>> {
        self.stop_routes.get(app_stop_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Memoizing loader and query layer over the bundled snapshots.
pub struct SnapshotStore {
    source: Arc<dyn SnapshotSource>,
    registry: Arc<SourceRegistry>,
    locale: String,
    files: Mutex<HashMap<String, Arc<OnceCell<Option<Arc<Value>>>>>>,
    preload: OnceCell<PreloadIndex>,
}

impl SnapshotStore {
    pub fn new(source: Arc<dyn SnapshotSource>, registry: Arc<SourceRegistry>, locale: impl Into<String>) -> Self {
        Self {
            source,
            registry,
            locale: locale.into(),
            files: Mutex::new(HashMap::new()),
            preload: OnceCell::new(),
        }
    }

    /// One parsed snapshot file, loaded at most once. Concurrent callers
    /// for the same file share the pending load.
    async fn file(&self, name: &str) -> Option<Arc<Value>> {
        let cell = {
            let mut files = self
                .files
                .lock()
                .expect("snapshot memo lock is not poisoned");
            Arc::clone(
                files
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        cell.get_or_init(|| self.load_file(name)).await.clone()
    }

    fn load_file<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Future<Output = Option<Arc<Value>>> + Send + 'a {
        async move {
            let text = match self.source.read(name).await {
                Some(text) => text,
                None => {
                    debug!(file = name, "snapshot file not bundled");
                    return None;
                }
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => Some(Arc::new(value)),
                Err(error) => {
                    warn!(file = name, %error, "snapshot file unparsable, ignoring");
                    None
                }
            }
        }
    }

    /// The preload index, built once on first use. Concurrent callers
    /// share one loading operation.
    pub async fn preload(&self) -> &PreloadIndex {
        self.preload.get_or_init(|| self.build_preload()).await
    }

    async fn build_preload(&self) -> PreloadIndex {
        let mut index = PreloadIndex::default();

        for source in self.registry.sources() {
            let name = routes_details_file(source, &self.locale);
            let value = match self.file(&name).await {
                Some(value) => value,
                None => continue,
            };

            let details = match serde_json::from_value::<Vec<Route>>((*value).clone()) {
                Ok(details) => details,
                Err(error) => {
                    warn!(file = name, %error, "route details snapshot has unexpected shape");
                    continue;
                }
            };

            for route in details {
                let route = route.normalize(source);
                for pattern in &route.patterns {
                    for stop in pattern.stops.iter().flatten() {
                        index
                            .stop_routes
                            .entry(stop.id.clone())
                            .or_default()
                            .insert(route.id.clone());
                    }
                }
                index.routes.insert(route.id.clone(), route);
            }
        }

        index
    }

    /// Narrowest bundled slice answering `resource`, or `None` when the
    /// shape has no snapshot coverage or the data is absent. Payloads
    /// come back in raw upstream shape, exactly as the network would
    /// have produced them. Never performs a network call.
    pub async fn fallback(&self, source: &Source, resource: &Resource) -> Option<Value> {
        match resource {
            Resource::Routes { locale } => self
                .file(&routes_file(source, locale))
                .await
                .map(|value| (*value).clone()),
            Resource::Stops { locale } => self
                .file(&stops_file(source, locale))
                .await
                .map(|value| (*value).clone()),
            Resource::StopRoutes { raw_stop_id } => {
                self.stop_routes_slice(source, raw_stop_id).await
            }
            Resource::ArrivalTimes { .. } => None,
            Resource::RouteDetails { raw_route_id } => {
                self.route_details_slice(source, raw_route_id).await
            }
            Resource::RouteStops {
                raw_route_id,
                suffix,
            } => {
                let details = self.route_details_slice(source, raw_route_id).await?;
                pattern_stops(&details, suffix)
            }
            Resource::StopsOfPatterns {
                raw_route_id,
                suffixes,
            } => {
                let details = self.route_details_slice(source, raw_route_id).await?;
                let entries: Vec<Value> = details
                    .get("stopsOfPatterns")?
                    .as_array()?
                    .iter()
                    .filter(|entry| {
                        entry
                            .get("patternSuffix")
                            .and_then(Value::as_str)
                            .map(|suffix| suffixes.iter().any(|wanted| wanted == suffix))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                (!entries.is_empty()).then(|| Value::Array(entries))
            }
            Resource::Schedule {
                raw_route_id,
                suffix,
            } => {
                let file = self.file(&schedules_file(source)).await?;
                file.get(snapshot_key(raw_route_id, suffix)).cloned()
            }
            Resource::Polylines {
                raw_route_id,
                suffixes,
            } => {
                let file = self.file(&polylines_file(source)).await?;
                let entries: Vec<Value> = suffixes
                    .iter()
                    .filter_map(|suffix| file.get(snapshot_key(raw_route_id, suffix)).cloned())
                    .collect();
                (!entries.is_empty()).then(|| Value::Array(entries))
            }
            Resource::Positions { .. } => None,
        }
    }

    async fn route_details_slice(&self, source: &Source, raw_route_id: &str) -> Option<Value> {
        let file = self
            .file(&routes_details_file(source, &self.locale))
            .await?;
        file.as_array()?
            .iter()
            .find(|route| route.get("id").and_then(Value::as_str) == Some(raw_route_id))
            .cloned()
    }

    /// Routes serving one stop: the intersection of the stop id with the
    /// bundled route details, projected onto the routes-list snapshot.
    async fn stop_routes_slice(&self, source: &Source, raw_stop_id: &str) -> Option<Value> {
        let details = self
            .file(&routes_details_file(source, &self.locale))
            .await?;
        let serving: BTreeSet<&str> = details
            .as_array()?
            .iter()
            .filter(|route| route_serves_stop(route, raw_stop_id))
            .filter_map(|route| route.get("id").and_then(Value::as_str))
            .collect();
        if serving.is_empty() {
            return None;
        }

        let routes = self.file(&routes_file(source, &self.locale)).await?;
        let matched: Vec<Value> = routes
            .as_array()?
            .iter()
            .filter(|route| {
                route
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| serving.contains(id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        (!matched.is_empty()).then(|| Value::Array(matched))
    }
}

fn stops_contain(stops: &Value, raw_stop_id: &str) -> bool {
    stops.as_array().is_some_and(|stops| {
        stops
            .iter()
            .any(|stop| stop.get("id").and_then(Value::as_str) == Some(raw_stop_id))
    })
}

fn route_serves_stop(route: &Value, raw_stop_id: &str) -> bool {
    let side_index = route
        .get("stopsOfPatterns")
        .and_then(Value::as_array)
        .is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.get("stops").is_some_and(|stops| stops_contain(stops, raw_stop_id)))
        });
    if side_index {
        return true;
    }

    route
        .get("patterns")
        .and_then(Value::as_array)
        .is_some_and(|patterns| {
            patterns
                .iter()
                .any(|pattern| pattern.get("stops").is_some_and(|stops| stops_contain(stops, raw_stop_id)))
        })
}

fn pattern_stops(details: &Value, suffix: &str) -> Option<Value> {
    let from_side_index = details
        .get("stopsOfPatterns")
        .and_then(Value::as_array)
        .and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.get("patternSuffix").and_then(Value::as_str) == Some(suffix))
        })
        .and_then(|entry| entry.get("stops").cloned());
    if from_side_index.is_some() {
        return from_side_index;
    }

    details
        .get("patterns")
        .and_then(Value::as_array)
        .and_then(|patterns| {
            patterns
                .iter()
                .find(|pattern| pattern.get("suffix").and_then(Value::as_str) == Some(suffix))
        })
        .and_then(|pattern| pattern.get("stops").cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Programmable snapshot source counting reads per file.
    struct FixtureSnapshots {
        files: HashMap<String, String>,
        reads: AtomicUsize,
    }

    impl FixtureSnapshots {
        fn new(files: impl IntoIterator<Item = (String, String)>) -> Self {
            Self {
                files: files.into_iter().collect(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl SnapshotSource for FixtureSnapshots {
        fn read<'a>(
            &'a self,
            file_name: &'a str,
        ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
            Box::pin(async move {
                self.reads.fetch_add(1, Ordering::SeqCst);
                self.files.get(file_name).cloned()
            })
        }
    }

    fn fixture_details() -> Value {
        json!([{
            "id": "mtr:R1",
            "shortName": "R1",
            "longName": "Ring line",
            "patterns": [{"suffix": "a1", "headsign": "Turnaround"}],
            "stopsOfPatterns": [{
                "patternSuffix": "a1",
                "stops": [
                    {"id": "mtr:S1", "name": "Origin", "lat": 1.0, "lng": 1.0},
                    {"id": "mtr:S2", "name": "Second", "lat": 2.0, "lng": 2.0}
                ]
            }]
        }])
    }

    fn store_with(files: Vec<(String, String)>) -> (SnapshotStore, Arc<FixtureSnapshots>) {
        let source = Arc::new(FixtureSnapshots::new(files));
        let store = SnapshotStore::new(
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            Arc::new(SourceRegistry::builtin()),
            "en",
        );
        (store, source)
    }

    #[tokio::test]
    async fn route_details_slice_matches_raw_id() {
        let (store, _) = store_with(vec![(
            String::from("metro_routes_details_en.json"),
            fixture_details().to_string(),
        )]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let details = store
            .fallback(
                metro,
                &Resource::RouteDetails {
                    raw_route_id: String::from("mtr:R1"),
                },
            )
            .await
            .expect("bundled route found");
        assert_eq!(details.get("shortName"), Some(&json!("R1")));

        let miss = store
            .fallback(
                metro,
                &Resource::RouteDetails {
                    raw_route_id: String::from("mtr:R9"),
                },
            )
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn route_stops_come_from_the_side_index() {
        let (store, _) = store_with(vec![(
            String::from("metro_routes_details_en.json"),
            fixture_details().to_string(),
        )]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let stops = store
            .fallback(
                metro,
                &Resource::RouteStops {
                    raw_route_id: String::from("mtr:R1"),
                    suffix: String::from("a1"),
                },
            )
            .await
            .expect("stops served");
        assert_eq!(stops.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn stop_routes_intersect_with_the_routes_list() {
        let (store, _) = store_with(vec![
            (
                String::from("metro_routes_details_en.json"),
                fixture_details().to_string(),
            ),
            (
                String::from("metro_routes_en.json"),
                json!([
                    {"id": "mtr:R1", "shortName": "R1"},
                    {"id": "mtr:R2", "shortName": "R2"}
                ])
                .to_string(),
            ),
        ]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let routes = store
            .fallback(
                metro,
                &Resource::StopRoutes {
                    raw_stop_id: String::from("mtr:S2"),
                },
            )
            .await
            .expect("serving routes found");
        let routes = routes.as_array().expect("array");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].get("id"), Some(&json!("mtr:R1")));
    }

    #[tokio::test]
    async fn schedule_and_polylines_use_escaped_keys() {
        let (store, _) = store_with(vec![
            (
                String::from("metro_schedules.json"),
                json!({"mtr:R1_a_1": {"patternSuffix": "a:1", "departures": []}}).to_string(),
            ),
            (
                String::from("metro_polylines.json"),
                json!({"mtr:R1_a_1": {"patternSuffix": "a:1", "points": [{"lat": 1.0, "lng": 2.0}]}})
                    .to_string(),
            ),
        ]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let schedule = store
            .fallback(
                metro,
                &Resource::Schedule {
                    raw_route_id: String::from("mtr:R1"),
                    suffix: String::from("a:1"),
                },
            )
            .await;
        assert!(schedule.is_some());

        let polylines = store
            .fallback(
                metro,
                &Resource::Polylines {
                    raw_route_id: String::from("mtr:R1"),
                    suffixes: vec![String::from("a:1")],
                },
            )
            .await
            .expect("polyline found");
        assert_eq!(polylines.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn live_only_shapes_and_absent_files_miss() {
        let (store, _) = store_with(Vec::new());
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        assert!(store
            .fallback(
                metro,
                &Resource::ArrivalTimes {
                    raw_stop_id: String::from("mtr:S1")
                }
            )
            .await
            .is_none());
        assert!(store
            .fallback(
                metro,
                &Resource::Routes {
                    locale: String::from("en")
                }
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn unparsable_files_are_treated_as_misses() {
        let (store, _) = store_with(vec![(
            String::from("metro_routes_en.json"),
            String::from("{not json"),
        )]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        assert!(store
            .fallback(
                metro,
                &Resource::Routes {
                    locale: String::from("en")
                }
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn files_load_at_most_once() {
        let (store, source) = store_with(vec![(
            String::from("metro_routes_en.json"),
            json!([{"id": "mtr:R1"}]).to_string(),
        )]);
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();
        let resource = Resource::Routes {
            locale: String::from("en"),
        };

        for _ in 0..5 {
            assert!(store.fallback(metro, &resource).await.is_some());
        }
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preload_index_normalizes_ids_and_inverts_stops() {
        let (store, _) = store_with(vec![(
            String::from("metro_routes_details_en.json"),
            fixture_details().to_string(),
        )]);

        let index = store.preload().await;
        assert_eq!(index.len(), 1);

        let route = index.route("R1").expect("app-space route id");
        assert_eq!(route.short_name, "R1");
        let stops = route.patterns[0].stops.as_ref().expect("derived stops");
        assert_eq!(stops[0].id, "S1");

        let serving = index.routes_for_stop("S2").expect("stop indexed");
        assert!(serving.contains("R1"));
    }

    #[tokio::test]
    async fn dir_snapshots_read_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metro_routes_en.json");
        tokio::fs::write(&path, b"[]").await.expect("write fixture");

        let source = DirSnapshots::new(dir.path());
        assert_eq!(source.read("metro_routes_en.json").await, Some(String::from("[]")));
        assert_eq!(source.read("missing.json").await, None);
    }
}
