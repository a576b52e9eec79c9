use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{Source, SourceId};

/// Geographic coordinate, WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Bit-exact key for coordinate-coincidence merging.
    pub fn bit_key(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lng.to_bits())
    }

    /// Squared Euclidean distance in degree space. Sufficient for
    /// nearest-vertex selection at city scale; no geodesic correction.
    pub fn distance_sq(&self, other: &LatLng) -> f64 {
        let dlat = self.lat - other.lat;
        let dlng = self.lng - other.lng;
        dlat * dlat + dlng * dlng
    }
}

/// A transit stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Ids of coincident stops from other sources merged into this one.
    #[serde(rename = "mergedIds", default, skip_serializing_if = "Vec::is_empty")]
    pub merged_ids: Vec<String>,
    #[serde(rename = "_sourceId", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stop {
    pub fn position(&self) -> LatLng {
        LatLng {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Rewrite the id into app space and tag the owning source.
    pub fn normalize(mut self, source: &Source) -> Self {
        self.id = source.to_app_space(&self.id);
        self.source_id = Some(source.id.clone());
        self
    }
}

/// One directional variant of a route's path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub suffix: String,
    #[serde(default)]
    pub headsign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stops: Option<Vec<Stop>>,
    /// Index range over the physical stop sequence, present on virtual
    /// patterns only.
    #[serde(rename = "_slice", default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<(usize, usize)>,
    /// Coordinate the polyline is sliced at, present on virtual patterns
    /// only.
    #[serde(rename = "_splitPoint", default, skip_serializing_if = "Option::is_none")]
    pub split_point: Option<LatLng>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Side structure carrying the stop sequence of one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStops {
    #[serde(rename = "patternSuffix")]
    pub pattern_suffix: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

/// A transit route with its directional patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    #[serde(rename = "shortName", default)]
    pub short_name: String,
    #[serde(rename = "longName", default)]
    pub long_name: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    /// Side index of per-pattern stop sequences; route details carry it
    /// when `patterns[].stops` is absent.
    #[serde(
        rename = "stopsOfPatterns",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub stops_of_patterns: Vec<PatternStops>,
    #[serde(rename = "_sourceId", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Route {
    /// Rewrite all embedded ids into app space, re-derive `patterns[].stops`
    /// from the side structure when absent, and tag the owning source.
    pub fn normalize(mut self, source: &Source) -> Self {
        self.id = source.to_app_space(&self.id);
        self.source_id = Some(source.id.clone());

        for pattern in &mut self.patterns {
            if pattern.stops.is_none() {
                pattern.stops = self
                    .stops_of_patterns
                    .iter()
                    .find(|entry| entry.pattern_suffix == pattern.suffix)
                    .map(|entry| entry.stops.clone());
            }
            if let Some(stops) = pattern.stops.take() {
                pattern.stops = Some(
                    stops
                        .into_iter()
                        .map(|stop| stop.normalize(source))
                        .collect(),
                );
            }
        }

        for entry in &mut self.stops_of_patterns {
            entry.stops = std::mem::take(&mut entry.stops)
                .into_iter()
                .map(|stop| stop.normalize(source))
                .collect();
        }

        self
    }

    pub fn pattern(&self, suffix: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.suffix == suffix)
    }
}

/// Polyline of one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPolyline {
    #[serde(rename = "patternSuffix")]
    pub pattern_suffix: String,
    #[serde(default)]
    pub points: Vec<LatLng>,
}

/// Scheduled departures of one pattern at one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDepartures {
    #[serde(rename = "stopId")]
    pub stop_id: String,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Schedule payload of one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "patternSuffix", default)]
    pub pattern_suffix: String,
    #[serde(default)]
    pub departures: Vec<StopDepartures>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Live vehicle position on one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    #[serde(rename = "patternSuffix", default)]
    pub pattern_suffix: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceRegistry;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "id": "mtr:0493",
            "name": "Central Station",
            "lat": 54.68,
            "lng": 25.28,
            "zone": "A"
        });

        let stop: Stop = serde_json::from_value(raw).expect("stop decodes");
        assert_eq!(stop.extra.get("zone"), Some(&json!("A")));

        let encoded = serde_json::to_value(&stop).expect("stop encodes");
        assert_eq!(encoded.get("zone"), Some(&json!("A")));
    }

    #[test]
    fn normalize_rewrites_ids_and_tags_source() {
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let route: Route = serde_json::from_value(json!({
            "id": "mtr:R1",
            "shortName": "R1",
            "patterns": [{"suffix": "a1", "headsign": "Center"}],
            "stopsOfPatterns": [{
                "patternSuffix": "a1",
                "stops": [{"id": "mtr:S1", "name": "First", "lat": 1.0, "lng": 2.0}]
            }]
        }))
        .expect("route decodes");

        let route = route.normalize(metro);
        assert_eq!(route.id, "R1");
        assert_eq!(route.source_id.as_ref().map(SourceId::as_str), Some("metro"));

        let stops = route.patterns[0].stops.as_ref().expect("derived from side index");
        assert_eq!(stops[0].id, "S1");
        assert_eq!(
            stops[0].source_id.as_ref().map(SourceId::as_str),
            Some("metro")
        );
    }

    #[test]
    fn explicit_pattern_stops_win_over_side_index() {
        let registry = SourceRegistry::builtin();
        let metro = registry.default_source();

        let route: Route = serde_json::from_value(json!({
            "id": "mtr:R2",
            "patterns": [{
                "suffix": "a1",
                "headsign": "Center",
                "stops": [{"id": "mtr:S9", "name": "Ninth", "lat": 0.0, "lng": 0.0}]
            }],
            "stopsOfPatterns": [{
                "patternSuffix": "a1",
                "stops": [{"id": "mtr:S1", "name": "First", "lat": 1.0, "lng": 2.0}]
            }]
        }))
        .expect("route decodes");

        let route = route.normalize(metro);
        let stops = route.patterns[0].stops.as_ref().expect("kept");
        assert_eq!(stops[0].id, "S9");
    }
}
