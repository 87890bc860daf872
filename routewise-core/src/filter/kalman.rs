//! Constant-velocity Kalman filter for position fixes
//!
//! State vector: [north_m, east_m, v_north, v_east] in a local tangent plane
//! anchored at the first fix. Measurements are the fix position in the same
//! frame, with variance taken from the reported accuracy.

use nalgebra::{SMatrix, SVector};

use crate::route::Position;

/// Acceleration variance (m²/s⁴), how much the traveler is expected to maneuver
const PROCESS_NOISE: f64 = 0.5;

/// Meters per degree of latitude on the mean sphere
const METERS_PER_DEGREE_LATITUDE: f64 = crate::geo::EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Meters per degree of longitude at a given latitude
#[inline]
fn meters_per_degree_longitude(lat_deg: f64) -> f64 {
    METERS_PER_DEGREE_LATITUDE * lat_deg.to_radians().cos()
}

type Matrix2x2 = SMatrix<f64, 2, 2>;
type Matrix4x4 = SMatrix<f64, 4, 4>;
type Matrix4x2 = SMatrix<f64, 4, 2>;
type Matrix2x4 = SMatrix<f64, 2, 4>;

/// Linear Kalman filter over a local north/east frame
#[derive(Debug, Clone)]
pub struct KalmanTracker {
    /// Frame origin (lat, lon) in degrees
    origin: (f64, f64),
    state: SVector<f64, 4>,
    /// Estimate error covariance
    p: Matrix4x4,
    /// Observation matrix
    h: Matrix2x4,
    last_timestamp: u64,
}

impl KalmanTracker {
    /// Start tracking from an initial fix
    pub fn new(first: &Position, accuracy: f64) -> Self {
        let mut h = Matrix2x4::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let mut p = Matrix4x4::zeros();
        let var = accuracy * accuracy;
        p[(0, 0)] = var;
        p[(1, 1)] = var;
        // Initial velocity is unknown
        p[(2, 2)] = 100.0;
        p[(3, 3)] = 100.0;

        KalmanTracker {
            origin: (first.latitude, first.longitude),
            state: SVector::<f64, 4>::zeros(),
            p,
            h,
            last_timestamp: first.timestamp,
        }
    }

    fn to_local(&self, lat: f64, lon: f64) -> (f64, f64) {
        let north = (lat - self.origin.0) * METERS_PER_DEGREE_LATITUDE;
        let east = (lon - self.origin.1) * meters_per_degree_longitude(self.origin.0);
        (north, east)
    }

    fn to_geo(&self, north: f64, east: f64) -> (f64, f64) {
        (
            self.origin.0 + north / METERS_PER_DEGREE_LATITUDE,
            self.origin.1 + east / meters_per_degree_longitude(self.origin.0),
        )
    }

    /// Project state and covariance forward by `dt` seconds
    fn predict(&mut self, dt: f64) {
        let mut a = Matrix4x4::identity();
        a[(0, 2)] = dt;
        a[(1, 3)] = dt;

        // Acceleration noise coupled into position and velocity
        let mut w = Matrix4x2::zeros();
        w[(0, 0)] = 0.5 * dt * dt;
        w[(1, 1)] = 0.5 * dt * dt;
        w[(2, 0)] = dt;
        w[(3, 1)] = dt;
        let q = Matrix2x2::identity() * PROCESS_NOISE;

        self.state = a * self.state;
        self.p = a * self.p * a.transpose() + w * q * w.transpose();
    }

    /// Incorporate a fix and return the filtered (lat, lon)
    pub fn update(&mut self, fix: &Position, accuracy: f64) -> (f64, f64) {
        let dt = fix.timestamp.saturating_sub(self.last_timestamp) as f64 / 1000.0;
        if dt > 0.0 {
            self.predict(dt);
        }
        self.last_timestamp = self.last_timestamp.max(fix.timestamp);

        let (north, east) = self.to_local(fix.latitude, fix.longitude);
        let z = SVector::<f64, 2>::new(north, east);
        let r = Matrix2x2::identity() * (accuracy * accuracy);

        let s = self.h * self.p * self.h.transpose() + r;
        if let Some(s_inv) = s.try_inverse() {
            let k = self.p * self.h.transpose() * s_inv;
            let innovation = z - self.h * self.state;
            self.state += k * innovation;
            self.p = (Matrix4x4::identity() - k * self.h) * self.p;
        }

        self.estimate()
    }

    /// Current filtered (lat, lon)
    pub fn estimate(&self) -> (f64, f64) {
        self.to_geo(self.state[0], self.state[1])
    }

    /// Estimated ground speed in m/s
    pub fn speed(&self) -> f64 {
        (self.state[2] * self.state[2] + self.state[3] * self.state[3]).sqrt()
    }

    /// Position standard deviation in meters
    #[cfg(test)]
    fn position_sd(&self) -> f64 {
        ((self.p[(0, 0)] + self.p[(1, 1)]) / 2.0).sqrt()
    }
}
