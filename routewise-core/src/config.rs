//! Guidance thresholds and algorithm selection

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::filter::FilterMode;

/// How the current step is picked from the route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepSelection {
    /// Step with the start or end point closest to the fix
    #[default]
    NearestEndpoint,
    /// Step with the smallest cross-track distance to the fix
    NearestSegment,
}

/// Navigation thresholds
///
/// All distances are in meters. Values can be loaded from JSON; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationConfig {
    /// Distance to destination at which the trip is complete
    pub arrival_threshold: f64,
    /// Distance to the end of a step at which the maneuver is announced
    pub approach_threshold: f64,
    /// Distance to the end of a step at which a "prepare" instruction is given
    pub next_instruction_threshold: f64,
    /// Instructions further away than this are never spoken
    pub speaking_threshold: f64,
    /// Minimum time before the same text is spoken again, in milliseconds
    pub repeat_interval_ms: u64,
    /// Cross-track distance beyond which a fix counts as off route
    pub deviation_threshold: f64,
    /// Consecutive off-route fixes required before recalculating
    pub deviation_count: u32,
    /// Average speed assumed for the ETA, in km/h
    pub assumed_speed_kmh: f64,
    /// Accuracy jump that raises an accuracy-changed event
    pub accuracy_change_threshold: f64,
    pub filter_mode: FilterMode,
    pub step_selection: StepSelection,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig {
            arrival_threshold: 20.0,
            approach_threshold: 100.0,
            next_instruction_threshold: 200.0,
            speaking_threshold: 500.0,
            repeat_interval_ms: 10_000,
            deviation_threshold: 50.0,
            deviation_count: 3,
            assumed_speed_kmh: 50.0,
            accuracy_change_threshold: 10.0,
            filter_mode: FilterMode::Smoothing,
            step_selection: StepSelection::NearestEndpoint,
        }
    }
}

impl NavigationConfig {
    pub fn validate(&self) -> Result<(), NavigationError> {
        let positive = [
            ("arrivalThreshold", self.arrival_threshold),
            ("approachThreshold", self.approach_threshold),
            ("nextInstructionThreshold", self.next_instruction_threshold),
            ("speakingThreshold", self.speaking_threshold),
            ("deviationThreshold", self.deviation_threshold),
            ("assumedSpeedKmh", self.assumed_speed_kmh),
            ("accuracyChangeThreshold", self.accuracy_change_threshold),
        ];
        for (field, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(NavigationError::InvalidConfig { field, value });
            }
        }
        if self.deviation_count == 0 {
            return Err(NavigationError::InvalidConfig {
                field: "deviationCount",
                value: 0.0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(NavigationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: NavigationConfig =
            serde_json::from_str(r#"{"arrivalThreshold": 30.0, "stepSelection": "nearest-segment"}"#)
                .unwrap();
        assert_eq!(config.arrival_threshold, 30.0);
        assert_eq!(config.step_selection, StepSelection::NearestSegment);
        assert_eq!(config.deviation_count, 3);
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = NavigationConfig {
            deviation_threshold: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(NavigationError::InvalidConfig {
                field: "deviationThreshold",
                value: 0.0
            })
        );

        let config = NavigationConfig {
            deviation_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
