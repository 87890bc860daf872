//! Off-route detection with hysteresis
//!
//! A single noisy fix far from the route does not trigger a recalculation;
//! the cross-track distance has to stay above the threshold for a number of
//! consecutive fixes. Any fix back within the threshold clears the counter.

use serde::{Deserialize, Serialize};

use crate::config::NavigationConfig;
use crate::geo;
use crate::route::{Coordinate, Route};

/// Session-scoped deviation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationState {
    /// Consecutive fixes beyond the threshold
    pub consecutive: u32,
    /// Most recent cross-track distance in meters
    pub last_distance: f64,
    /// Set once the hysteresis count is reached, cleared by a new route or a
    /// fix back within the threshold
    pub off_route: bool,
}

/// Outcome of checking one fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviationStatus {
    OnRoute { distance: f64 },
    /// Beyond the threshold but not yet for long enough
    Drifting { distance: f64, consecutive: u32 },
    /// Beyond the threshold for the required number of fixes
    Deviated { distance: f64, consecutive: u32 },
}

/// Smallest cross-track distance from `fix` to any step of the route, or to
/// the direct start-end line for a route without steps
pub fn distance_from_route(route: &Route, fix: Coordinate) -> f64 {
    if route.steps.is_empty() {
        return geo::distance_to_segment(fix, route.start, route.end);
    }
    route
        .steps
        .iter()
        .map(|step| geo::distance_to_segment(fix, step.start, step.end))
        .fold(f64::INFINITY, f64::min)
}

#[derive(Debug, Clone)]
pub struct DeviationMonitor {
    threshold: f64,
    required: u32,
    state: DeviationState,
}

impl DeviationMonitor {
    pub fn new(config: &NavigationConfig) -> Self {
        DeviationMonitor {
            threshold: config.deviation_threshold,
            required: config.deviation_count,
            state: DeviationState::default(),
        }
    }

    pub fn state(&self) -> DeviationState {
        self.state
    }

    /// Check a fix against the route
    ///
    /// Once the required count is reached every further off-route fix reports
    /// `Deviated` again until a new route is accepted or the fix comes back.
    pub fn update(&mut self, route: &Route, fix: Coordinate) -> DeviationStatus {
        let distance = distance_from_route(route, fix);
        self.state.last_distance = distance;

        if distance <= self.threshold {
            self.state.consecutive = 0;
            self.state.off_route = false;
            return DeviationStatus::OnRoute { distance };
        }

        self.state.consecutive = self.state.consecutive.saturating_add(1);
        let consecutive = self.state.consecutive;
        if consecutive >= self.required {
            self.state.off_route = true;
            DeviationStatus::Deviated {
                distance,
                consecutive,
            }
        } else {
            DeviationStatus::Drifting {
                distance,
                consecutive,
            }
        }
    }

    /// A replacement route was accepted
    pub fn route_replaced(&mut self) {
        self.state.consecutive = 0;
        self.state.off_route = false;
    }

    pub fn reset(&mut self) {
        self.state = DeviationState::default();
    }
}
