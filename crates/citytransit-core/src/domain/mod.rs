//! Transit domain models.
//!
//! Upstream payloads are mostly opaque to this layer; the models decode
//! only the fields the layer inspects and carry everything else through
//! untouched via `#[serde(flatten)]`.

mod models;

pub use models::{
    LatLng, Pattern, PatternPolyline, PatternStops, Route, Schedule, Stop, StopDepartures,
    VehiclePosition,
};
