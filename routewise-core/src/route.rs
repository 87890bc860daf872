//! Route, step and position types
//!
//! A [`Route`] is produced by an external planner and consumed as-is. It is
//! never mutated in place: a recalculation replaces it wholesale.

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::geo;

/// Latitude/longitude pair in degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// Finite and inside [-90, 90] x [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A single position fix from the position provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, `None` when the provider does not know
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Ground speed in m/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course over ground in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, accuracy: Option<f64>, timestamp: u64) -> Self {
        Position {
            latitude,
            longitude,
            accuracy,
            speed: None,
            course: None,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn validate(&self) -> Result<(), NavigationError> {
        if self.coordinate().is_valid() {
            Ok(())
        } else {
            Err(NavigationError::InvalidPosition {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// Travel mode passed to the route planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Cycling,
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TravelMode::Driving => write!(f, "driving"),
            TravelMode::Walking => write!(f, "walking"),
            TravelMode::Cycling => write!(f, "cycling"),
        }
    }
}

/// Maneuver performed at the start of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManeuverType {
    #[default]
    Continue,
    TurnLeft,
    TurnRight,
    SlightLeft,
    SlightRight,
    UTurn,
    Merge,
    Exit,
    Arrive,
    RoundaboutEnter,
    RoundaboutExit,
}

impl ManeuverType {
    /// Maneuvers that the planner names explicitly rather than by geometry
    pub fn is_named_maneuver(&self) -> bool {
        matches!(
            self,
            ManeuverType::Merge
                | ManeuverType::Exit
                | ManeuverType::RoundaboutEnter
                | ManeuverType::RoundaboutExit
        )
    }
}

/// One leg of a route between two maneuver points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub index: usize,
    pub start: Coordinate,
    pub end: Coordinate,
    /// Length in meters
    pub distance: f64,
    /// Bearing start to end in degrees [0, 360)
    pub bearing: f64,
    pub instruction: String,
    #[serde(default)]
    pub maneuver: ManeuverType,
}

impl Step {
    /// Build a step whose distance and bearing are derived from its endpoints
    pub fn between(
        index: usize,
        start: Coordinate,
        end: Coordinate,
        instruction: impl Into<String>,
        maneuver: ManeuverType,
    ) -> Self {
        Step {
            index,
            start,
            end,
            distance: geo::distance(start, end),
            bearing: geo::bearing(start, end),
            instruction: instruction.into(),
            maneuver,
        }
    }

    fn validate(&self) -> Result<(), NavigationError> {
        if !self.start.is_valid() || !self.end.is_valid() {
            return Err(NavigationError::InvalidRoute(format!(
                "step {} has invalid endpoints",
                self.index
            )));
        }
        if !(self.distance >= 0.0) || !self.distance.is_finite() {
            return Err(NavigationError::InvalidRoute(format!(
                "step {} has distance {}",
                self.index, self.distance
            )));
        }
        if !(0.0..360.0).contains(&self.bearing) {
            return Err(NavigationError::InvalidRoute(format!(
                "step {} has bearing {}",
                self.index, self.bearing
            )));
        }
        Ok(())
    }
}

/// A precomputed route, steps in traversal order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub start: Coordinate,
    pub end: Coordinate,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Total length in meters
    #[serde(default)]
    pub total_distance: f64,
    /// Planner's duration estimate in seconds
    #[serde(default)]
    pub estimated_duration: f64,
    #[serde(default)]
    pub mode: TravelMode,
}

impl Route {
    /// Route with a single step along the direct line
    pub fn direct(start: Coordinate, end: Coordinate, mode: TravelMode) -> Self {
        let step = Step::between(0, start, end, "Head to destination", ManeuverType::Continue);
        Route::from_steps(start, end, vec![step], mode)
    }

    /// Route whose total distance is the sum of its steps
    pub fn from_steps(start: Coordinate, end: Coordinate, steps: Vec<Step>, mode: TravelMode) -> Self {
        let total_distance = steps.iter().map(|s| s.distance).sum();
        Route {
            start,
            end,
            steps,
            total_distance,
            estimated_duration: 0.0,
            mode,
        }
    }

    /// Parse a route from planner JSON
    pub fn from_json(json: &str) -> Result<Self, NavigationError> {
        let route: Route = serde_json::from_str(json)?;
        route.validate()?;
        Ok(route)
    }

    /// Check endpoints and per-step invariants
    pub fn validate(&self) -> Result<(), NavigationError> {
        if !self.start.is_valid() {
            return Err(NavigationError::InvalidRoute("missing start point".into()));
        }
        if !self.end.is_valid() {
            return Err(NavigationError::InvalidRoute("missing end point".into()));
        }
        if !self.total_distance.is_finite() || self.total_distance < 0.0 {
            return Err(NavigationError::InvalidRoute(format!(
                "total distance {}",
                self.total_distance
            )));
        }
        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }

    /// Total distance, derived from the steps or the direct line when the
    /// planner left it at 0
    pub fn effective_total_distance(&self) -> f64 {
        if self.total_distance > 0.0 {
            return self.total_distance;
        }
        let from_steps: f64 = self.steps.iter().map(|s| s.distance).sum();
        if from_steps > 0.0 {
            from_steps
        } else {
            geo::distance(self.start, self.end)
        }
    }

    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taipei_route() -> Route {
        let a = Coordinate::new(25.0330, 121.5654);
        let b = Coordinate::new(25.0400, 121.5654);
        let c = Coordinate::new(25.0400, 121.5500);
        let steps = vec![
            Step::between(0, a, b, "Head north", ManeuverType::Continue),
            Step::between(1, b, c, "Turn left", ManeuverType::TurnLeft),
        ];
        Route::from_steps(a, c, steps, TravelMode::Driving)
    }

    #[test]
    fn test_step_between() {
        let route = taipei_route();
        let step = &route.steps[0];
        assert!(step.bearing.abs() < 1e-6);
        assert!((step.distance - 778.3).abs() < 1.0);
        let step = &route.steps[1];
        assert!((step.bearing - 270.0).abs() < 0.1);
    }

    #[test]
    fn test_total_distance_from_steps() {
        let route = taipei_route();
        let sum: f64 = route.steps.iter().map(|s| s.distance).sum();
        assert_eq!(route.total_distance, sum);
        assert!(route.validate().is_ok());
    }

    #[test]
    fn test_effective_total_distance_fallback() {
        let mut route = taipei_route();
        route.total_distance = 0.0;
        assert!(route.effective_total_distance() > 0.0);

        route.steps.clear();
        let direct = geo::distance(route.start, route.end);
        assert_eq!(route.effective_total_distance(), direct);
    }

    #[test]
    fn test_validate_rejects_missing_endpoint() {
        let mut route = taipei_route();
        route.end = Coordinate::new(f64::NAN, 121.0);
        assert!(matches!(
            route.validate(),
            Err(NavigationError::InvalidRoute(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_step() {
        let mut route = taipei_route();
        route.steps[1].bearing = 360.0;
        assert!(route.validate().is_err());

        let mut route = taipei_route();
        route.steps[0].distance = -1.0;
        assert!(route.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "start": {"latitude": 25.0330, "longitude": 121.5654},
            "end": {"latitude": 25.0478, "longitude": 121.5170},
            "totalDistance": 5200.0,
            "mode": "walking"
        }"#;
        let route = Route::from_json(json).unwrap();
        assert!(route.steps.is_empty());
        assert_eq!(route.mode, TravelMode::Walking);
        assert_eq!(route.effective_total_distance(), 5200.0);
    }

    #[test]
    fn test_from_json_missing_end() {
        let json = r#"{"start": {"latitude": 25.0, "longitude": 121.0}}"#;
        assert!(matches!(
            Route::from_json(json),
            Err(NavigationError::InvalidRoute(_))
        ));
    }

    #[test]
    fn test_maneuver_serde() {
        let json = serde_json::to_string(&ManeuverType::RoundaboutEnter).unwrap();
        assert_eq!(json, "\"roundabout-enter\"");
        let m: ManeuverType = serde_json::from_str("\"u-turn\"").unwrap();
        assert_eq!(m, ManeuverType::UTurn);
    }
}
