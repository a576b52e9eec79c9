//! Loop route virtualization.
//!
//! Some physical routes are genuinely circular: one pattern leaves the
//! origin and returns to it. Such routes display badly as a single
//! direction, so the layer splits the one physical pattern into two
//! virtual directional halves by slicing the stop list and, separately,
//! the polyline at a consistent split point.
//!
//! Both detection and split-point search are heuristic (string matching,
//! nearest-vertex projection), so detection sits behind a trait and the
//! route exclusion list is plain configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{LatLng, Pattern, Stop};

/// Patterns with fewer stops than this are never treated as loops.
pub const MIN_LOOP_STOPS: usize = 5;

/// The headsign stop is searched within the middle of the sequence:
/// indexes in `[0.2n, 0.8n)`.
const SPLIT_WINDOW_LOW: f64 = 0.2;
const SPLIT_WINDOW_HIGH: f64 = 0.8;

const PART_MARKERS: [&str; 2] = ["_PART0", "_PART1"];

/// Detection heuristic for circular patterns.
pub trait LoopDetector: Send + Sync {
    fn is_loop(&self, stops: &[Stop], route_short_name: &str) -> bool;
}

/// Default heuristic: a pattern is circular when it is long enough, its
/// route is not excluded, and its first and last stop share an identifier
/// suffix or a display name.
#[derive(Debug, Default)]
pub struct EndpointLoopDetector {
    excluded_routes: HashSet<String>,
}

impl EndpointLoopDetector {
    /// `excluded` lists route short names that must never be split, even
    /// when their endpoints coincide.
    pub fn new(excluded: impl IntoIterator<Item = String>) -> Self {
        Self {
            excluded_routes: excluded.into_iter().collect(),
        }
    }
}

impl LoopDetector for EndpointLoopDetector {
    fn is_loop(&self, stops: &[Stop], route_short_name: &str) -> bool {
        if stops.len() < MIN_LOOP_STOPS {
            return false;
        }
        if self.excluded_routes.contains(route_short_name) {
            return false;
        }

        let (first, last) = match (stops.first(), stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return false,
        };

        id_suffix(&first.id) == id_suffix(&last.id)
            || (!first.name.is_empty() && first.name == last.name)
    }
}

/// Final `:`-delimited segment of an identifier. Sources prefix their
/// stop ids differently, but a physical stop keeps its trailing segment
/// across namespaces.
fn id_suffix(id: &str) -> &str {
    id.rsplit(':').next().unwrap_or(id)
}

/// One synthetic directional half of a circular pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualPattern {
    /// Physical suffix plus a part marker.
    pub suffix: String,
    pub physical_suffix: String,
    pub headsign: String,
    /// Half-open index range over the physical stop sequence.
    pub slice: (usize, usize),
    /// Coordinate of the split stop; the polyline is sliced at the
    /// vertex nearest to it.
    pub split_point: LatLng,
}

impl VirtualPattern {
    /// Present the virtual half as a normal directional pattern.
    pub fn to_pattern(&self, physical_stops: &[Stop]) -> Pattern {
        Pattern {
            suffix: self.suffix.clone(),
            headsign: self.headsign.clone(),
            stops: Some(slice_stops(physical_stops, &self.suffix, Some(self.slice))),
            slice: Some(self.slice),
            split_point: Some(self.split_point),
            extra: serde_json::Map::new(),
        }
    }
}

/// Index of the part marker in `suffix`, if it carries one.
fn part_index(suffix: &str) -> Option<usize> {
    PART_MARKERS
        .iter()
        .position(|marker| suffix.ends_with(marker))
}

/// Whether a pattern suffix names a virtual half.
pub fn is_virtual_suffix(suffix: &str) -> bool {
    part_index(suffix).is_some()
}

/// The physical pattern suffix behind a possibly-virtual one.
pub fn physical_suffix(suffix: &str) -> &str {
    match part_index(suffix) {
        Some(part) => &suffix[..suffix.len() - PART_MARKERS[part].len()],
        None => suffix,
    }
}

/// Split one circular pattern into its two directional halves.
///
/// The split stop is the one matching the pattern's headsign within the
/// middle of the sequence; when no stop matches, the sequence is split
/// 50/50. The two halves overlap by exactly the split stop, so their
/// concatenation covers every physical stop.
pub fn generate_virtual_patterns(
    pattern: &Pattern,
    stops: &[Stop],
    long_name: &str,
) -> [VirtualPattern; 2] {
    let split = find_split_index(stops, &pattern.headsign);
    let split_stop = &stops[split];

    let outbound_headsign = if split_stop.name.is_empty() {
        pattern.headsign.clone()
    } else {
        split_stop.name.clone()
    };
    let inbound_headsign = stops
        .last()
        .filter(|stop| !stop.name.is_empty())
        .map(|stop| stop.name.clone())
        .unwrap_or_else(|| long_name.to_string());

    [
        VirtualPattern {
            suffix: format!("{}{}", pattern.suffix, PART_MARKERS[0]),
            physical_suffix: pattern.suffix.clone(),
            headsign: outbound_headsign,
            slice: (0, split + 1),
            split_point: split_stop.position(),
        },
        VirtualPattern {
            suffix: format!("{}{}", pattern.suffix, PART_MARKERS[1]),
            physical_suffix: pattern.suffix.clone(),
            headsign: inbound_headsign,
            slice: (split, stops.len()),
            split_point: split_stop.position(),
        },
    ]
}

fn find_split_index(stops: &[Stop], headsign: &str) -> usize {
    let n = stops.len();
    let low = (SPLIT_WINDOW_LOW * n as f64).ceil() as usize;
    let high = ((SPLIT_WINDOW_HIGH * n as f64).ceil() as usize).min(n);

    if !headsign.is_empty() {
        for (index, stop) in stops.iter().enumerate().take(high).skip(low) {
            if stop.name.trim().eq_ignore_ascii_case(headsign.trim()) {
                return index;
            }
        }
    }

    n / 2
}

/// Slice a physical stop sequence for a virtual suffix.
///
/// Applies the recorded slice verbatim when present; otherwise recomputes
/// the 50/50 fallback from the suffix's part marker. Suffixes without a
/// marker get the whole sequence back.
pub fn slice_stops(stops: &[Stop], suffix: &str, slice: Option<(usize, usize)>) -> Vec<Stop> {
    let n = stops.len();
    let (start, end) = match slice {
        Some((start, end)) => (start.min(n), end.min(n)),
        None => match part_index(suffix) {
            Some(0) => (0, n / 2 + 1),
            Some(_) => (n / 2, n),
            None => (0, n),
        },
    };
    stops[start.min(end)..end].to_vec()
}

/// Slice a physical polyline for a virtual suffix.
///
/// With a known split point, the boundary is the vertex nearest to it and
/// that vertex belongs to both halves, keeping the two polylines
/// geometrically consistent with the stop slices. Without one, the point
/// list is split 50/50.
pub fn slice_polyline(points: &[LatLng], suffix: &str, split_point: Option<LatLng>) -> Vec<LatLng> {
    let n = points.len();
    let part = match part_index(suffix) {
        Some(part) => part,
        None => return points.to_vec(),
    };
    if n == 0 {
        return Vec::new();
    }

    let boundary = match split_point {
        Some(target) => nearest_vertex(points, &target),
        None => n / 2,
    };

    if part == 0 {
        points[..(boundary + 1).min(n)].to_vec()
    } else {
        points[boundary.min(n - 1)..].to_vec()
    }
}

fn nearest_vertex(points: &[LatLng], target: &LatLng) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, point) in points.iter().enumerate() {
        let distance = point.distance_sq(target);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}
