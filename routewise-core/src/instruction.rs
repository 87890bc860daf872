//! Instruction generation
//!
//! Turns the current fix and the active route into the next instruction to
//! show or speak, and decides whether it should actually be spoken.

use serde::{Deserialize, Serialize};

use crate::config::{NavigationConfig, StepSelection};
use crate::geo::{self, Compass};
use crate::route::{Coordinate, ManeuverType, Route};

/// Bearing changes below this are "straight on"
const STRAIGHT_LIMIT_DEG: f64 = 15.0;
/// Upper edge of the sharp-turn band, beyond it the maneuver is a U-turn
const SHARP_TURN_LIMIT_DEG: f64 = 105.0;

/// Urgency of an instruction, ordered low to high
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Continue,
    SlightTurn,
    Turn,
    UTurn,
    Arrive,
}

impl From<ManeuverType> for Priority {
    fn from(maneuver: ManeuverType) -> Self {
        match maneuver {
            ManeuverType::Continue => Priority::Continue,
            ManeuverType::SlightLeft | ManeuverType::SlightRight => Priority::SlightTurn,
            ManeuverType::TurnLeft
            | ManeuverType::TurnRight
            | ManeuverType::Merge
            | ManeuverType::Exit
            | ManeuverType::RoundaboutEnter
            | ManeuverType::RoundaboutExit => Priority::Turn,
            ManeuverType::UTurn => Priority::UTurn,
            ManeuverType::Arrive => Priority::Arrive,
        }
    }
}

/// An instruction ready for display or speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub text: String,
    pub maneuver: ManeuverType,
    /// Distance to the maneuver point in meters
    pub distance: f64,
    pub priority: Priority,
}

impl Instruction {
    pub fn new(text: String, maneuver: ManeuverType, distance: f64) -> Self {
        Instruction {
            text,
            maneuver,
            distance,
            priority: maneuver.into(),
        }
    }
}

/// Instruction plus the step it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub instruction: Instruction,
    /// Index of the current step, `None` when the route has no steps
    pub step_index: Option<usize>,
}

/// Format a distance for humans: whole meters below 1 km, else km with one decimal
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// Classify a signed bearing change into a maneuver.
///
/// Both the 15-75° and the 75-105° bands map to a plain turn.
pub fn classify_turn(delta: f64) -> ManeuverType {
    let abs = delta.abs();
    if abs < STRAIGHT_LIMIT_DEG {
        ManeuverType::Continue
    } else if abs <= SHARP_TURN_LIMIT_DEG {
        if delta > 0.0 {
            ManeuverType::TurnRight
        } else {
            ManeuverType::TurnLeft
        }
    } else {
        ManeuverType::UTurn
    }
}

fn maneuver_phrase(maneuver: ManeuverType) -> &'static str {
    match maneuver {
        ManeuverType::Continue => "continue straight",
        ManeuverType::TurnLeft => "turn left",
        ManeuverType::TurnRight => "turn right",
        ManeuverType::SlightLeft => "keep slightly left",
        ManeuverType::SlightRight => "keep slightly right",
        ManeuverType::UTurn => "make a U-turn",
        ManeuverType::Merge => "merge",
        ManeuverType::Exit => "take the exit",
        ManeuverType::Arrive => "arrive at your destination",
        ManeuverType::RoundaboutEnter => "enter the roundabout",
        ManeuverType::RoundaboutExit => "exit the roundabout",
    }
}

/// Pick the current step for a fix.
///
/// Ties go to the lower index, so a fix sitting on a shared vertex belongs to
/// the step that ends there.
pub fn select_step(route: &Route, fix: Coordinate, selection: StepSelection) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, step) in route.steps.iter().enumerate() {
        let d = match selection {
            StepSelection::NearestEndpoint => {
                geo::distance(fix, step.start).min(geo::distance(fix, step.end))
            }
            StepSelection::NearestSegment => geo::distance_to_segment(fix, step.start, step.end),
        };
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Generates the next instruction from the route and a fix
#[derive(Debug, Clone)]
pub struct InstructionGenerator {
    arrival_threshold: f64,
    approach_threshold: f64,
    next_instruction_threshold: f64,
    step_selection: StepSelection,
}

impl InstructionGenerator {
    pub fn new(config: &NavigationConfig) -> Self {
        InstructionGenerator {
            arrival_threshold: config.arrival_threshold,
            approach_threshold: config.approach_threshold,
            next_instruction_threshold: config.next_instruction_threshold,
            step_selection: config.step_selection,
        }
    }

    pub fn generate(&self, route: &Route, fix: Coordinate) -> Guidance {
        let to_destination = geo::distance(fix, route.end);

        if to_destination <= self.arrival_threshold {
            return Guidance {
                instruction: Instruction::new(
                    "You have arrived at your destination".to_string(),
                    ManeuverType::Arrive,
                    to_destination,
                ),
                step_index: select_step(route, fix, self.step_selection),
            };
        }

        let Some(index) = select_step(route, fix, self.step_selection) else {
            let compass = Compass::from_bearing(geo::bearing(fix, route.end));
            return Guidance {
                instruction: Instruction::new(
                    format!("Head {} for {}", compass.name(), format_distance(to_destination)),
                    ManeuverType::Continue,
                    to_destination,
                ),
                step_index: None,
            };
        };

        let current = &route.steps[index];
        let to_step_end = geo::distance(fix, current.end);
        let next = route.steps.get(index + 1);

        let instruction = match next {
            Some(next) if to_step_end <= self.approach_threshold => {
                let maneuver = next_maneuver(current.bearing, next.bearing, next.maneuver);
                Instruction::new(
                    format!(
                        "In {}, {}",
                        format_distance(to_step_end),
                        maneuver_phrase(maneuver)
                    ),
                    maneuver,
                    to_step_end,
                )
            }
            Some(next) if to_step_end <= self.next_instruction_threshold => {
                let maneuver = next_maneuver(current.bearing, next.bearing, next.maneuver);
                Instruction::new(
                    format!(
                        "Prepare to {} in {}",
                        maneuver_phrase(maneuver),
                        format_distance(to_step_end)
                    ),
                    maneuver,
                    to_step_end,
                )
            }
            _ => Instruction::new(
                format!("Continue straight for {}", format_distance(to_step_end)),
                ManeuverType::Continue,
                to_step_end,
            ),
        };

        Guidance {
            instruction,
            step_index: Some(index),
        }
    }
}

/// Named planner maneuvers win over bearing classification
fn next_maneuver(current_bearing: f64, next_bearing: f64, planned: ManeuverType) -> ManeuverType {
    if planned.is_named_maneuver() {
        planned
    } else {
        classify_turn(geo::bearing_delta(current_bearing, next_bearing))
    }
}

/// Decides whether an instruction should be forwarded to the voice announcer
#[derive(Debug, Clone)]
pub struct AnnouncementGate {
    speaking_threshold: f64,
    repeat_interval_ms: u64,
    last_text: Option<String>,
    last_spoken_at: u64,
}

impl AnnouncementGate {
    pub fn new(config: &NavigationConfig) -> Self {
        AnnouncementGate {
            speaking_threshold: config.speaking_threshold,
            repeat_interval_ms: config.repeat_interval_ms,
            last_text: None,
            last_spoken_at: 0,
        }
    }

    /// Returns true and records the announcement when it should be spoken
    pub fn should_announce(&mut self, instruction: &Instruction, now_ms: u64) -> bool {
        if instruction.distance > self.speaking_threshold {
            return false;
        }
        let repeated = self.last_text.as_deref() == Some(instruction.text.as_str());
        if repeated && now_ms.saturating_sub(self.last_spoken_at) < self.repeat_interval_ms {
            return false;
        }
        self.last_text = Some(instruction.text.clone());
        self.last_spoken_at = now_ms;
        true
    }

    pub fn reset(&mut self) {
        self.last_text = None;
        self.last_spoken_at = 0;
    }
}
