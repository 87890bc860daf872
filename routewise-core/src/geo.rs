//! Spherical geometry on the WGS84 mean sphere.
//!
//! All inputs are latitude/longitude pairs in degrees. Distances are returned
//! in meters, bearings in degrees clockwise from true north.

use serde::{Deserialize, Serialize};

use crate::route::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Angular distances below this are treated as a zero-length segment
const DEGENERATE_SEGMENT_RAD: f64 = 1e-12;

/// Great-circle distance in meters (haversine formula)
///
/// Identical points return exactly 0. The intermediate term is clamped to
/// [0, 1] so antipodal points do not produce NaN from rounding error.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    angular_distance(a, b) * EARTH_RADIUS_M
}

/// Great-circle distance in radians
pub fn angular_distance(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Initial bearing from `from` to `to` in degrees, normalized to [0, 360)
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Normalize bearing to [0, 360)
pub fn normalize_bearing(bearing: f64) -> f64 {
    let b = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Signed difference `to - from` folded into (-180, 180].
///
/// Positive values mean a clockwise (rightward) change of heading.
pub fn bearing_delta(from: f64, to: f64) -> f64 {
    let mut delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Distance in meters from `point` to the great-circle segment `start`-`end`.
///
/// When the perpendicular foot of `point` falls before `start` or past `end`
/// the distance to that endpoint is returned instead, so the result never
/// exceeds the distance to either endpoint.
pub fn distance_to_segment(point: Coordinate, start: Coordinate, end: Coordinate) -> f64 {
    let d13 = angular_distance(start, point);
    let d23 = angular_distance(end, point);
    let d12 = angular_distance(start, end);

    if d12 < DEGENERATE_SEGMENT_RAD {
        return d13 * EARTH_RADIUS_M;
    }

    let theta13 = bearing(start, point).to_radians();
    let theta12 = bearing(start, end).to_radians();

    // Signed cross-track and along-track angular distances
    let dxt = (d13.sin() * (theta13 - theta12).sin()).clamp(-1.0, 1.0).asin();
    let cos_dxt = dxt.cos();
    let dat = if cos_dxt.abs() < f64::EPSILON {
        0.0
    } else {
        (d13.cos() / cos_dxt).clamp(-1.0, 1.0).acos()
    };
    // Along-track sign follows the projection direction relative to the segment
    let dat = if (theta13 - theta12).cos() < 0.0 { -dat } else { dat };

    let x = dat / d12;
    if x < 0.0 {
        d13 * EARTH_RADIUS_M
    } else if x > 1.0 {
        d23 * EARTH_RADIUS_M
    } else {
        dxt.abs() * EARTH_RADIUS_M
    }
}

/// Position reached by travelling `distance_m` from `origin` on `bearing_deg`
pub fn destination_point(origin: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    Coordinate::new(
        lat2.to_degrees(),
        (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0,
    )
}

/// Eight-point compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compass {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

const COMPASS_POINTS: [Compass; 8] = [
    Compass::N,
    Compass::NE,
    Compass::E,
    Compass::SE,
    Compass::S,
    Compass::SW,
    Compass::W,
    Compass::NW,
];

impl Compass {
    /// Bucket a bearing into one of the eight compass points
    pub fn from_bearing(bearing: f64) -> Self {
        let index = (normalize_bearing(bearing) / 45.0).round() as usize % 8;
        COMPASS_POINTS[index]
    }

    /// Short label, e.g. "NE"
    pub fn label(&self) -> &'static str {
        match self {
            Compass::N => "N",
            Compass::NE => "NE",
            Compass::E => "E",
            Compass::SE => "SE",
            Compass::S => "S",
            Compass::SW => "SW",
            Compass::W => "W",
            Compass::NW => "NW",
        }
    }

    /// Spoken form, e.g. "northeast"
    pub fn name(&self) -> &'static str {
        match self {
            Compass::N => "north",
            Compass::NE => "northeast",
            Compass::E => "east",
            Compass::SE => "southeast",
            Compass::S => "south",
            Compass::SW => "southwest",
            Compass::W => "west",
            Compass::NW => "northwest",
        }
    }
}

impl std::fmt::Display for Compass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
