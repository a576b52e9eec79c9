//! Behavior when the device is offline or an upstream is unreachable.

use std::sync::Arc;
use std::time::Duration;

use citytransit_tests::{CachePolicy, FetchError, RecordingHttp, TransitService};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn offline_aggregate_reads_degrade_to_empty_coverage() {
    let http = Arc::new(RecordingHttp::new());
    let service = TransitService::builder()
        .with_http_client(Arc::clone(&http) as Arc<dyn citytransit_core::HttpClient>)
        .build();
    service.set_offline(true);

    let started = tokio::time::Instant::now();
    let routes = service
        .fetch_routes(CachePolicy::Default)
        .await
        .expect("aggregate never fails");

    assert!(routes.is_empty());
    // No retry ladder while offline: both sources fail fast.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(http.hits(), 2);
}

#[tokio::test]
async fn offline_single_lookup_without_fallback_surfaces_the_outage() {
    let http = Arc::new(RecordingHttp::new());
    let service = TransitService::builder()
        .with_http_client(Arc::clone(&http) as Arc<dyn citytransit_core::HttpClient>)
        .build();
    service.set_offline(true);

    let error = service
        .fetch_route_details("R1", CachePolicy::Default)
        .await
        .expect_err("no cache, no snapshot, no network");

    assert_eq!(error, FetchError::Offline);
}

#[tokio::test]
async fn offline_lookup_with_a_bundled_snapshot_still_answers() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("metro_routes_details_en.json"),
        json!([{"id": "mtr:R1", "shortName": "R1", "patterns": []}]).to_string(),
    )
    .expect("write details snapshot");

    let http = Arc::new(RecordingHttp::new());
    let service = TransitService::builder()
        .with_http_client(Arc::clone(&http) as Arc<dyn citytransit_core::HttpClient>)
        .with_snapshot_dir(dir.path())
        .build();
    service.set_offline(true);

    let route = service
        .fetch_route_details("R1", CachePolicy::Default)
        .await
        .expect("snapshot hides the outage");

    assert_eq!(route.id, "R1");
    assert_eq!(route.short_name, "R1");
}
