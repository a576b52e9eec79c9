//! # Citytransit Core
//!
//! Data-access layer for multi-city transit information.
//!
//! ## Overview
//!
//! Two independent city networks answer "give me transit entity X"
//! requests through one merged namespace. The layer stays usable when
//! either upstream is slow, erroring, or unreachable:
//!
//! - **Source registry** with pure, invertible identifier translation
//!   between each upstream's raw namespace and the merged app space
//! - **Tiered request cache** with freshness tiers (fresh / stale /
//!   expired), in-flight de-duplication, detached background refresh,
//!   and a fallback race against bundled snapshots
//! - **Bounded request queue** capping concurrency against the fragile
//!   v3 API generation
//! - **Smart source resolver** hunting entities across sources by
//!   identifier shape
//! - **Static snapshot fallback index** over bundled point-in-time JSON
//! - **Loop route virtualizer** splitting circular routes into two
//!   virtual directional patterns
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Tiered request cache and read policies |
//! | [`domain`] | Transit models (Route, Pattern, Stop, ...) |
//! | [`error`] | Error taxonomy |
//! | [`freshness`] | Cache record freshness tiers |
//! | [`http`] | HTTP transport abstraction |
//! | [`looproute`] | Circular route detection and virtual patterns |
//! | [`queue`] | Bounded concurrency queue for v3 calls |
//! | [`registry`] | Source registry and identifier normalization |
//! | [`resolver`] | Cross-source entity resolution |
//! | [`resource`] | Closed set of upstream resource kinds |
//! | [`retry`] | Retry policy and backoff |
//! | [`service`] | Public operations and service builder |
//! | [`snapshot`] | Bundled snapshot fallback index |
//! | [`store`] | Durable cache store collaborator interface |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use citytransit_core::{CachePolicy, TransitService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = TransitService::builder()
//!         .with_snapshot_dir("snapshots")
//!         .build();
//!
//!     let routes = service.fetch_routes(CachePolicy::default()).await?;
//!     for route in &routes {
//!         println!("{} {}", route.short_name, route.long_name);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! Read paths with any fallback available never fail: network errors are
//! retried, then hidden behind the cached payload or the bundled
//! snapshot. Only single-source lookups with no cache, no snapshot, and
//! no reachable upstream surface an error.

pub mod cache;
pub mod domain;
pub mod error;
pub mod freshness;
pub mod http;
pub mod looproute;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod retry;
pub mod service;
pub mod snapshot;
pub mod store;

// Re-export commonly used types at crate root for convenience

pub use cache::{CachePolicy, TieredCache, CACHE_KEY_PREFIX};
pub use domain::{
    LatLng, Pattern, PatternPolyline, PatternStops, Route, Schedule, Stop, StopDepartures,
    VehiclePosition,
};
pub use error::{FetchError, RegistryError};
pub use freshness::Freshness;
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient};
pub use looproute::{
    generate_virtual_patterns, is_virtual_suffix, physical_suffix, slice_polyline, slice_stops,
    EndpointLoopDetector, LoopDetector, VirtualPattern,
};
pub use queue::{RequestQueue, V3_CONCURRENCY};
pub use registry::{Source, SourceId, SourceRegistry};
pub use resolver::{Resolved, SourceResolver};
pub use resource::{ApiVersion, Resource};
pub use retry::{Backoff, RetryConfig};
pub use service::{TransitService, TransitServiceBuilder};
pub use snapshot::{DirSnapshots, NoSnapshots, PreloadIndex, SnapshotSource, SnapshotStore};
pub use store::{CacheRecord, DurableStore, MemoryStore, StoreError};
