//! End-to-end scenarios through the public service API.

use std::sync::Arc;
use std::time::Duration;

use citytransit_tests::{CachePolicy, RecordingHttp, Source, SourceId, SourceRegistry, TransitService};
use serde_json::json;

/// Two-city registry where the secondary city uses the numeric app
/// prefix `1`, so its route `R1` appears to callers as `1:R1`.
fn two_city_registry() -> SourceRegistry {
    SourceRegistry::new(vec![
        Source {
            id: SourceId::new("city"),
            local_prefix: String::from("cty:"),
            app_prefix: None,
            separator: ':',
            v2_base: String::from("https://city.test/v2"),
            v3_base: String::from("https://city.test/v3"),
            api_key: None,
        },
        Source {
            id: SourceId::new("ring"),
            local_prefix: String::new(),
            app_prefix: Some(String::from("1")),
            separator: ':',
            v2_base: String::from("https://ring.test/v2"),
            v3_base: String::from("https://ring.test/v3"),
            api_key: None,
        },
    ])
    .expect("test registry is valid")
}

fn write_loop_snapshots(dir: &std::path::Path) {
    // Route 1:R1 has a single circular pattern: stops A..F where A and F
    // are the same physical stop, and the headsign names D.
    let details = json!([{
        "id": "R1",
        "shortName": "R1",
        "longName": "Ring line",
        "patterns": [{"suffix": "a1", "headsign": "Delta"}],
        "stopsOfPatterns": [{
            "patternSuffix": "a1",
            "stops": [
                {"id": "SA", "name": "Alpha", "lat": 0.0, "lng": 0.0},
                {"id": "SB", "name": "Bravo", "lat": 1.0, "lng": 0.0},
                {"id": "SC", "name": "Charlie", "lat": 2.0, "lng": 0.0},
                {"id": "SD", "name": "Delta", "lat": 3.0, "lng": 0.0},
                {"id": "SE", "name": "Echo", "lat": 2.0, "lng": 1.0},
                {"id": "SA", "name": "Alpha", "lat": 0.0, "lng": 0.0}
            ]
        }]
    }]);
    std::fs::write(
        dir.join("ring_routes_details_en.json"),
        details.to_string(),
    )
    .expect("write details snapshot");
}

#[tokio::test]
async fn circular_route_in_cache_only_mode_returns_two_virtual_patterns() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_loop_snapshots(dir.path());

    let service = TransitService::builder()
        .with_registry(two_city_registry())
        .with_snapshot_dir(dir.path())
        .build();

    let route = service
        .fetch_route_details("1:R1", CachePolicy::CacheOnly)
        .await
        .expect("bundled route resolves without network");

    assert_eq!(route.id, "1:R1");
    assert_eq!(route.patterns.len(), 2);
    assert_eq!(route.patterns[0].suffix, "a1_PART0");
    assert_eq!(route.patterns[1].suffix, "a1_PART1");

    let outbound = route.patterns[0].stops.as_ref().expect("outbound stops");
    let inbound = route.patterns[1].stops.as_ref().expect("inbound stops");

    // _PART0 spans A..D, _PART1 spans D..F; together they cover every
    // stop and overlap by exactly the split stop.
    let names = |stops: &[citytransit_core::Stop]| {
        stops.iter().map(|stop| stop.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(outbound), ["Alpha", "Bravo", "Charlie", "Delta"]);
    assert_eq!(names(inbound), ["Delta", "Echo", "Alpha"]);
    assert_eq!(outbound.len() + inbound.len(), 6 + 1);
}

#[tokio::test(start_paused = true)]
async fn slow_network_resolves_from_the_fallback_and_still_warms_the_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot_details = json!([{
        "id": "mtr:R9",
        "shortName": "R9 (snapshot)",
        "patterns": []
    }]);
    std::fs::write(
        dir.path().join("metro_routes_details_en.json"),
        snapshot_details.to_string(),
    )
    .expect("write details snapshot");

    let http = Arc::new(RecordingHttp::new().with_delay(Duration::from_secs(5)));
    http.insert(
        "https://api.metropolis-transit.net/v3/routes/mtr%3AR9",
        json!({"id": "mtr:R9", "shortName": "R9 (live)", "patterns": []}).to_string(),
    );

    let service = TransitService::builder()
        .with_http_client(Arc::clone(&http) as Arc<dyn citytransit_core::HttpClient>)
        .with_snapshot_dir(dir.path())
        .build();

    // The network needs 5s; the fallback race answers after 600ms with
    // the bundled snapshot.
    let started = tokio::time::Instant::now();
    let route = service
        .fetch_route_details("R9", CachePolicy::Default)
        .await
        .expect("fallback answers");
    assert_eq!(route.short_name, "R9 (snapshot)");
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert!(started.elapsed() < Duration::from_secs(5));

    // The losing network branch runs to completion and persists its
    // record, so the next read is served fresh from cache.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let route = service
        .fetch_route_details("R9", CachePolicy::Default)
        .await
        .expect("cache answers");
    assert_eq!(route.short_name, "R9 (live)");
    assert_eq!(http.hits(), 1);
}

#[tokio::test]
async fn aggregate_routes_merge_both_cities_into_one_namespace() {
    let http = Arc::new(RecordingHttp::new());
    http.insert(
        "https://api.metropolis-transit.net/v2/routes?locale=en",
        json!([{"id": "mtr:R1", "shortName": "R1"}]).to_string(),
    );
    http.insert(
        "https://api.harborcity-transit.net/v2/routes?locale=en",
        json!([{"id": "hbr:204", "shortName": "204"}]).to_string(),
    );

    let service = TransitService::builder()
        .with_http_client(Arc::clone(&http) as Arc<dyn citytransit_core::HttpClient>)
        .build();

    let routes = service
        .fetch_routes(CachePolicy::Default)
        .await
        .expect("aggregate never fails");

    let ids: Vec<&str> = routes.iter().map(|route| route.id.as_str()).collect();
    assert_eq!(ids, ["R1", "h:204"]);
    assert_eq!(
        routes[0].source_id.as_ref().map(SourceId::as_str),
        Some("metro")
    );
    assert_eq!(
        routes[1].source_id.as_ref().map(SourceId::as_str),
        Some("harbor")
    );
}
