//! Trip progress and ETA

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::geo;
use crate::route::{Coordinate, Route};

/// Progress snapshot for one fix
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Meters traveled along the route
    pub traveled: f64,
    /// Meters left to the destination
    pub remaining: f64,
    /// Completion in [0, 1]
    pub fraction: f64,
    /// Estimated seconds to the destination
    pub eta_seconds: f64,
}

impl Progress {
    pub fn eta(&self) -> Duration {
        Duration::from_secs_f64(self.eta_seconds.max(0.0))
    }
}

/// Converts position along the route into progress
///
/// The fraction never goes backwards for the lifetime of one route; a
/// replacement route starts a new baseline.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    assumed_speed_kmh: f64,
    best_fraction: f64,
}

impl ProgressTracker {
    pub fn new(assumed_speed_kmh: f64) -> Self {
        ProgressTracker {
            assumed_speed_kmh,
            best_fraction: 0.0,
        }
    }

    /// Forget the baseline, used when the route is replaced
    pub fn reset(&mut self) {
        self.best_fraction = 0.0;
    }

    /// Distance traveled when the fix is on step `step_index`
    ///
    /// Completed steps count in full; the current step counts the part
    /// already covered, clamped to [0, step distance].
    pub fn traveled(route: &Route, step_index: Option<usize>, fix: Coordinate) -> f64 {
        let total = route.effective_total_distance();
        let Some(index) = step_index.filter(|&i| i < route.steps.len()) else {
            // No steps: measure against the direct line
            return (total - geo::distance(fix, route.end)).clamp(0.0, total);
        };

        let completed: f64 = route.steps[..index].iter().map(|s| s.distance).sum();
        let step = &route.steps[index];
        let in_step = (step.distance - geo::distance(fix, step.end)).clamp(0.0, step.distance);
        completed + in_step
    }

    pub fn update(&mut self, route: &Route, step_index: Option<usize>, fix: Coordinate) -> Progress {
        let total = route.effective_total_distance();
        let traveled = Self::traveled(route, step_index, fix);
        let fraction = if total > 0.0 {
            (traveled / total).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let fraction = fraction.max(self.best_fraction);
        self.best_fraction = fraction;

        let traveled = fraction * total;
        let remaining = (total - traveled).max(0.0);
        let eta_seconds = remaining / 1000.0 / self.assumed_speed_kmh * 3600.0;

        Progress {
            traveled,
            remaining,
            fraction,
            eta_seconds,
        }
    }
}
