//! Location filtering
//!
//! Smooths noisy fixes using a short history and classifies signal quality
//! from the reported accuracy.
//!
//! Three modes are available:
//!
//! - **Smoothing**: accuracy- and recency-weighted average of the last few
//!   fixes, with extra weight on the newest one.
//! - **Predictive**: extrapolates from the velocity implied by the last two
//!   fixes and blends the prediction with the raw measurement.
//! - **Kalman**: constant-velocity state-space filter (see [`KalmanTracker`]).

mod kalman;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::route::Position;

pub use kalman::KalmanTracker;

/// Number of smoothed fixes kept in [`LocationHistory`]
pub const HISTORY_CAPACITY: usize = 10;

/// Historical fixes used by the weighted average (besides the new one)
const SMOOTHING_WINDOW: usize = 3;

/// Prior fixes needed before any smoothing is applied
const MIN_PRIOR_FIXES: usize = 2;

/// Weight added to the newest fix, scaled by its accuracy weight
const NEW_FIX_BOOST: f64 = 2.0;

/// Accuracy assumed for weighting when the provider reports none
const UNKNOWN_ACCURACY_M: f64 = 100.0;

/// Filtering algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Smoothing,
    /// High precision: velocity extrapolation blended with the measurement
    Predictive,
    Kalman,
}

/// Signal quality derived from horizontal accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
    NoSignal,
}

impl SignalQuality {
    pub fn from_accuracy(accuracy: Option<f64>) -> Self {
        match accuracy {
            Some(a) if a.is_finite() && a >= 0.0 => {
                if a <= 5.0 {
                    SignalQuality::Excellent
                } else if a <= 10.0 {
                    SignalQuality::Good
                } else if a <= 20.0 {
                    SignalQuality::Fair
                } else if a <= 50.0 {
                    SignalQuality::Poor
                } else {
                    SignalQuality::VeryPoor
                }
            }
            _ => SignalQuality::NoSignal,
        }
    }

    /// How often to ask for a new fix at this quality
    pub fn polling_interval(&self) -> Duration {
        let secs = match self {
            SignalQuality::Excellent => 5,
            SignalQuality::Good => 10,
            SignalQuality::Fair => 15,
            SignalQuality::Poor => 30,
            SignalQuality::VeryPoor => 45,
            SignalQuality::NoSignal => 60,
        };
        Duration::from_secs(secs)
    }
}

impl std::fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalQuality::Excellent => write!(f, "excellent"),
            SignalQuality::Good => write!(f, "good"),
            SignalQuality::Fair => write!(f, "fair"),
            SignalQuality::Poor => write!(f, "poor"),
            SignalQuality::VeryPoor => write!(f, "very poor"),
            SignalQuality::NoSignal => write!(f, "no signal"),
        }
    }
}

/// Fixed-capacity history of smoothed fixes, newest last
#[derive(Debug, Clone)]
pub struct LocationHistory {
    points: VecDeque<Position>,
    capacity: usize,
}

impl Default for LocationHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl LocationHistory {
    pub fn new(capacity: usize) -> Self {
        LocationHistory {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a fix, evicting the oldest when full
    pub fn push(&mut self, position: Position) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(position);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&Position> {
        self.points.back()
    }

    /// Up to `n` most recent fixes, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Position> {
        self.points.iter().skip(self.points.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.points.iter()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Accuracy jump between two successive fixes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyChange {
    pub previous: f64,
    pub current: f64,
}

/// Result of feeding one raw fix through the filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredFix {
    pub position: Position,
    pub quality: SignalQuality,
    pub accuracy_change: Option<AccuracyChange>,
}

/// Reported accuracy in meters, non-finite values count as unknown
fn effective_accuracy(accuracy: Option<f64>) -> f64 {
    accuracy
        .filter(|a| a.is_finite())
        .unwrap_or(UNKNOWN_ACCURACY_M)
        .max(1.0)
}

fn accuracy_weight(accuracy: Option<f64>) -> f64 {
    1.0 / effective_accuracy(accuracy)
}

/// Location filter with a bounded history
#[derive(Debug, Clone)]
pub struct LocationFilter {
    mode: FilterMode,
    history: LocationHistory,
    last_accuracy: Option<f64>,
    accuracy_change_threshold: f64,
    kalman: Option<KalmanTracker>,
}

impl LocationFilter {
    pub fn new(mode: FilterMode, accuracy_change_threshold: f64) -> Self {
        LocationFilter {
            mode,
            history: LocationHistory::default(),
            last_accuracy: None,
            accuracy_change_threshold,
            kalman: None,
        }
    }

    pub fn history(&self) -> &LocationHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_accuracy = None;
        self.kalman = None;
    }

    /// Filter a raw fix and record the result
    pub fn update(&mut self, raw: Position) -> FilteredFix {
        let accuracy_change = self.track_accuracy(raw.accuracy);

        if self.mode == FilterMode::Kalman {
            self.feed_kalman(&raw);
        }

        let position = if self.history.len() < MIN_PRIOR_FIXES {
            raw
        } else {
            match self.mode {
                FilterMode::Smoothing => self.weighted_average(&raw),
                FilterMode::Predictive => self.predict_and_blend(&raw),
                FilterMode::Kalman => self.kalman_estimate(&raw),
            }
        };

        self.history.push(position);

        FilteredFix {
            position,
            quality: SignalQuality::from_accuracy(raw.accuracy),
            accuracy_change,
        }
    }

    fn track_accuracy(&mut self, accuracy: Option<f64>) -> Option<AccuracyChange> {
        let current = accuracy.filter(|a| a.is_finite())?;
        let change = match self.last_accuracy {
            Some(previous) if (current - previous).abs() > self.accuracy_change_threshold => {
                Some(AccuracyChange { previous, current })
            }
            _ => None,
        };
        self.last_accuracy = Some(current);
        change
    }

    fn weighted_average(&self, raw: &Position) -> Position {
        let mut sum_w = 0.0;
        let mut sum_lat = 0.0;
        let mut sum_lon = 0.0;
        let mut rank = 0.0;

        for p in self.history.recent(SMOOTHING_WINDOW) {
            rank += 1.0;
            let w = rank * accuracy_weight(p.accuracy);
            sum_w += w;
            sum_lat += p.latitude * w;
            sum_lon += p.longitude * w;
        }

        let aw = accuracy_weight(raw.accuracy);
        let w = (rank + 1.0) * aw + NEW_FIX_BOOST * aw;
        sum_w += w;
        sum_lat += raw.latitude * w;
        sum_lon += raw.longitude * w;

        if sum_w <= 0.0 || !(sum_w.is_finite() && sum_lat.is_finite() && sum_lon.is_finite()) {
            return *raw;
        }

        Position {
            latitude: sum_lat / sum_w,
            longitude: sum_lon / sum_w,
            ..*raw
        }
    }

    fn predict_and_blend(&self, raw: &Position) -> Position {
        let mut recent = self.history.recent(2);
        let (Some(p1), Some(p2)) = (recent.next(), recent.next()) else {
            return *raw;
        };

        let dt12 = p2.timestamp.saturating_sub(p1.timestamp) as f64 / 1000.0;
        if dt12 <= 0.0 {
            return *raw;
        }
        let dt = raw.timestamp.saturating_sub(p2.timestamp) as f64 / 1000.0;
        let v_lat = (p2.latitude - p1.latitude) / dt12;
        let v_lon = (p2.longitude - p1.longitude) / dt12;
        let predicted_lat = p2.latitude + v_lat * dt;
        let predicted_lon = p2.longitude + v_lon * dt;

        let w_pred = accuracy_weight(p2.accuracy);
        let w_meas = accuracy_weight(raw.accuracy);
        let sum = w_pred + w_meas;

        Position {
            latitude: (predicted_lat * w_pred + raw.latitude * w_meas) / sum,
            longitude: (predicted_lon * w_pred + raw.longitude * w_meas) / sum,
            ..*raw
        }
    }

    fn feed_kalman(&mut self, raw: &Position) {
        let accuracy = effective_accuracy(raw.accuracy);
        match self.kalman.as_mut() {
            Some(kf) => {
                kf.update(raw, accuracy);
            }
            None => self.kalman = Some(KalmanTracker::new(raw, accuracy)),
        }
    }

    fn kalman_estimate(&self, raw: &Position) -> Position {
        let Some(kf) = self.kalman.as_ref() else {
            return *raw;
        };
        let (latitude, longitude) = kf.estimate();
        Position {
            latitude,
            longitude,
            speed: raw.speed.or(Some(kf.speed())),
            ..*raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64, accuracy: f64, t: u64) -> Position {
        Position::new(lat, lon, Some(accuracy), t)
    }

    #[test]
    fn test_quality_buckets() {
        assert_eq!(SignalQuality::from_accuracy(Some(3.0)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_accuracy(Some(5.0)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_accuracy(Some(10.0)), SignalQuality::Good);
        assert_eq!(SignalQuality::from_accuracy(Some(20.0)), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_accuracy(Some(50.0)), SignalQuality::Poor);
        assert_eq!(SignalQuality::from_accuracy(Some(50.1)), SignalQuality::VeryPoor);
        assert_eq!(SignalQuality::from_accuracy(None), SignalQuality::NoSignal);
    }

    #[test]
    fn test_polling_interval_grows_with_worse_signal() {
        assert_eq!(
            SignalQuality::Excellent.polling_interval(),
            Duration::from_secs(5)
        );
        assert_eq!(
            SignalQuality::NoSignal.polling_interval(),
            Duration::from_secs(60)
        );
        assert!(SignalQuality::Fair.polling_interval() < SignalQuality::Poor.polling_interval());
    }

    #[test]
    fn test_history_eviction() {
        let mut history = LocationHistory::default();
        for i in 0..15u64 {
            history.push(fix(i as f64, 0.0, 5.0, i));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().timestamp, 5);
        assert_eq!(history.latest().unwrap().timestamp, 14);

        let recent: Vec<u64> = history.recent(3).map(|p| p.timestamp).collect();
        assert_eq!(recent, vec![12, 13, 14]);
    }

    #[test]
    fn test_first_two_fixes_pass_through() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 10.0);
        let a = fix(25.0, 121.0, 5.0, 0);
        let b = fix(25.001, 121.0, 5.0, 1000);
        assert_eq!(filter.update(a).position, a);
        assert_eq!(filter.update(b).position, b);
        assert_eq!(filter.history().len(), 2);
    }

    #[test]
    fn test_smoothing_pulls_outlier_back() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 10.0);
        filter.update(fix(25.0, 121.0, 5.0, 0));
        filter.update(fix(25.0, 121.0, 5.0, 1000));
        filter.update(fix(25.0, 121.0, 5.0, 2000));

        let out = filter.update(fix(25.01, 121.0, 5.0, 3000)).position;
        assert!(out.latitude > 25.0 && out.latitude < 25.01);
        // Newest fix dominates: 3 prior ranks sum to 6, new fix weighs 4 + 2
        assert!((out.latitude - 25.005).abs() < 1e-9);
        assert_eq!(out.timestamp, 3000);
    }

    #[test]
    fn test_smoothing_trusts_accurate_fix() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 1000.0);
        filter.update(fix(25.0, 121.0, 100.0, 0));
        filter.update(fix(25.0, 121.0, 100.0, 1000));
        let out = filter.update(fix(25.01, 121.0, 1.0, 2000)).position;
        assert!(out.latitude > 25.0095, "got {}", out.latitude);
    }

    #[test]
    fn test_predictive_follows_motion() {
        let mut filter = LocationFilter::new(FilterMode::Predictive, 10.0);
        filter.update(fix(25.000, 121.0, 5.0, 0));
        filter.update(fix(25.001, 121.0, 5.0, 1000));
        // Measurement lags behind the extrapolated 25.002
        let out = filter.update(fix(25.0016, 121.0, 5.0, 2000)).position;
        assert!((out.latitude - 25.0018).abs() < 1e-9);
    }

    #[test]
    fn test_predictive_same_timestamp_uses_measurement() {
        let mut filter = LocationFilter::new(FilterMode::Predictive, 10.0);
        filter.update(fix(25.000, 121.0, 5.0, 1000));
        filter.update(fix(25.001, 121.0, 5.0, 1000));
        let raw = fix(25.003, 121.0, 5.0, 2000);
        assert_eq!(filter.update(raw).position, raw);
    }

    #[test]
    fn test_kalman_mode_smooths() {
        let mut filter = LocationFilter::new(FilterMode::Kalman, 10.0);
        for i in 0..5u64 {
            filter.update(fix(25.0, 121.0, 10.0, i * 1000));
        }
        let out = filter.update(fix(25.001, 121.0, 10.0, 5000)).position;
        assert!(out.latitude > 25.0 && out.latitude < 25.001);
    }

    #[test]
    fn test_accuracy_change_event() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 10.0);
        assert!(filter.update(fix(25.0, 121.0, 5.0, 0)).accuracy_change.is_none());
        assert!(filter.update(fix(25.0, 121.0, 14.0, 1000)).accuracy_change.is_none());
        let change = filter
            .update(fix(25.0, 121.0, 40.0, 2000))
            .accuracy_change
            .unwrap();
        assert_eq!(change.previous, 14.0);
        assert_eq!(change.current, 40.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 10.0);
        filter.update(fix(25.0, 121.0, 5.0, 0));
        filter.reset();
        assert!(filter.history().is_empty());
        assert!(filter.history().latest().is_none());
    }

    #[test]
    fn test_infinite_accuracy_does_not_poison_history() {
        for mode in [FilterMode::Smoothing, FilterMode::Predictive, FilterMode::Kalman] {
            let mut filter = LocationFilter::new(mode, 10.0);
            for i in 0..4u64 {
                let out = filter
                    .update(Position::new(25.0, 121.0, Some(f64::INFINITY), i * 1000))
                    .position;
                assert!(out.latitude.is_finite() && out.longitude.is_finite(), "{mode:?}");
            }
            for i in 4..6u64 {
                let out = filter.update(fix(25.0, 121.0, 5.0, i * 1000)).position;
                assert!((out.latitude - 25.0).abs() < 1e-6, "{mode:?}: {}", out.latitude);
                assert!((out.longitude - 121.0).abs() < 1e-6, "{mode:?}: {}", out.longitude);
            }
        }
    }

    #[test]
    fn test_infinite_accuracy_is_no_signal_without_change_event() {
        let mut filter = LocationFilter::new(FilterMode::Smoothing, 10.0);
        filter.update(fix(25.0, 121.0, 5.0, 0));
        let out = filter.update(Position::new(25.0, 121.0, Some(f64::INFINITY), 1000));
        assert_eq!(out.quality, SignalQuality::NoSignal);
        assert!(out.accuracy_change.is_none());
    }
}
