//! Navigation session state machine
//!
//! Owns the active route and all per-trip state, and runs the per-fix
//! pipeline: filter, instruction, deviation, progress, arrival. The session
//! performs no I/O; it returns events and requests for the caller to act on.
//!
//! ```text
//!   Idle ──start──▶ Active ◀──resume── Paused
//!                    │  └────pause────▶  │
//!                 arrival                │
//!                    ▼                   │
//!                 Arrived ──▶ Stopped ◀──┘  (stop from any live state)
//! ```
//!
//! # Example
//!
//! ```rust
//! use routewise_core::{Coordinate, NavigationConfig, NavigationSession, Position, Route, TravelMode};
//!
//! let route = Route::direct(
//!     Coordinate::new(25.0330, 121.5654),
//!     Coordinate::new(25.0478, 121.5170),
//!     TravelMode::Driving,
//! );
//! let (mut session, _started) =
//!     NavigationSession::start(route, NavigationConfig::default(), 0).unwrap();
//!
//! let outcome = session.tick(Position::new(25.0331, 121.5650, Some(5.0), 1000), 1000);
//! assert!(!outcome.events.is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::config::NavigationConfig;
use crate::deviation::{DeviationMonitor, DeviationState, DeviationStatus};
use crate::error::NavigationError;
use crate::filter::{LocationFilter, SignalQuality};
use crate::geo;
use crate::instruction::{AnnouncementGate, Instruction, InstructionGenerator};
use crate::progress::{Progress, ProgressTracker};
use crate::route::{Coordinate, Position, Route, TravelMode};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationState {
    #[default]
    Idle,
    Active,
    Paused,
    Arrived,
    Stopped,
}

impl NavigationState {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, NavigationState::Stopped)
    }
}

impl std::fmt::Display for NavigationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationState::Idle => write!(f, "idle"),
            NavigationState::Active => write!(f, "active"),
            NavigationState::Paused => write!(f, "paused"),
            NavigationState::Arrived => write!(f, "arrived"),
            NavigationState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Suggested reaction to a deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationAction {
    Recalculate,
}

/// Events emitted by the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NavigationEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        from: NavigationState,
        to: NavigationState,
    },
    /// The instruction text or maneuver changed; the distance alone does not count
    InstructionUpdated { instruction: Instruction },
    PositionUpdated {
        position: Position,
        quality: SignalQuality,
    },
    AccuracyChanged {
        previous: f64,
        current: f64,
        quality: SignalQuality,
    },
    Deviated {
        distance: f64,
        action: DeviationAction,
    },
    #[serde(rename_all = "camelCase")]
    RouteRecalculated { total_distance: f64, steps: usize },
    #[serde(rename_all = "camelCase")]
    Arrived {
        position: Position,
        distance_to_destination: f64,
    },
    /// Non-fatal failure; the session keeps running
    Error { message: String },
}

impl NavigationEvent {
    /// Name of the variant as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            NavigationEvent::StateChanged { .. } => "stateChanged",
            NavigationEvent::InstructionUpdated { .. } => "instructionUpdated",
            NavigationEvent::PositionUpdated { .. } => "positionUpdated",
            NavigationEvent::AccuracyChanged { .. } => "accuracyChanged",
            NavigationEvent::Deviated { .. } => "deviated",
            NavigationEvent::RouteRecalculated { .. } => "routeRecalculated",
            NavigationEvent::Arrived { .. } => "arrived",
            NavigationEvent::Error { .. } => "error",
        }
    }
}

/// New route wanted from the planner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecalculationRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub mode: TravelMode,
}

/// Everything produced by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub events: Vec<NavigationEvent>,
    /// Text to hand to the voice announcer
    pub announcement: Option<String>,
    pub recalculation: Option<RecalculationRequest>,
}

/// Point-in-time view of a session, published once per tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStatus {
    pub state: NavigationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<SignalQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Instruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_destination: Option<f64>,
    pub deviation: DeviationState,
    /// Unix milliseconds when the session started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Unix milliseconds of the last processed fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// One trip along one destination
#[derive(Debug, Clone)]
pub struct NavigationSession {
    config: NavigationConfig,
    route: Route,
    state: NavigationState,
    started_at: u64,
    updated_at: Option<u64>,
    position: Option<Position>,
    quality: Option<SignalQuality>,
    instruction: Option<Instruction>,
    step_index: Option<usize>,
    progress: Progress,
    recalculation_pending: bool,
    filter: LocationFilter,
    generator: InstructionGenerator,
    gate: AnnouncementGate,
    deviation: DeviationMonitor,
    tracker: ProgressTracker,
}

impl NavigationSession {
    /// Validate the route and start an active session
    ///
    /// Returns the session and its initial `StateChanged` event.
    pub fn start(
        route: Route,
        config: NavigationConfig,
        now_ms: u64,
    ) -> Result<(Self, NavigationEvent), NavigationError> {
        route.validate()?;
        config.validate()?;

        let progress = initial_progress(&route, &config);
        let mut session = NavigationSession {
            filter: LocationFilter::new(config.filter_mode, config.accuracy_change_threshold),
            generator: InstructionGenerator::new(&config),
            gate: AnnouncementGate::new(&config),
            deviation: DeviationMonitor::new(&config),
            tracker: ProgressTracker::new(config.assumed_speed_kmh),
            config,
            route,
            state: NavigationState::Idle,
            started_at: now_ms,
            updated_at: None,
            position: None,
            quality: None,
            instruction: None,
            step_index: None,
            progress,
            recalculation_pending: false,
        };
        let event = session.transition(NavigationState::Active);
        Ok((session, event))
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn deviation(&self) -> DeviationState {
        self.deviation.state()
    }

    /// Signal quality of the latest fix
    pub fn quality(&self) -> Option<SignalQuality> {
        self.quality
    }

    fn transition(&mut self, to: NavigationState) -> NavigationEvent {
        let from = self.state;
        self.state = to;
        NavigationEvent::StateChanged { from, to }
    }

    /// Active to Paused; no-op otherwise
    pub fn pause(&mut self) -> Option<NavigationEvent> {
        (self.state == NavigationState::Active).then(|| self.transition(NavigationState::Paused))
    }

    /// Paused to Active; no-op otherwise
    pub fn resume(&mut self) -> Option<NavigationEvent> {
        (self.state == NavigationState::Paused).then(|| self.transition(NavigationState::Active))
    }

    /// Any live state to Stopped; repeated calls are no-ops
    pub fn stop(&mut self) -> Option<NavigationEvent> {
        if self.state.is_terminal() {
            return None;
        }
        self.recalculation_pending = false;
        Some(self.transition(NavigationState::Stopped))
    }

    /// Run the per-fix pipeline
    ///
    /// Ignored unless the session is active. Never fails: problems are
    /// reported as `Error` events.
    pub fn tick(&mut self, raw: Position, now_ms: u64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state != NavigationState::Active {
            return outcome;
        }
        if let Err(e) = raw.validate() {
            outcome.events.push(NavigationEvent::Error {
                message: e.to_string(),
            });
            return outcome;
        }

        // 1. Filter
        let filtered = self.filter.update(raw);
        let fix = filtered.position;
        let here = fix.coordinate();
        self.position = Some(fix);
        self.quality = Some(filtered.quality);
        self.updated_at = Some(now_ms);
        outcome.events.push(NavigationEvent::PositionUpdated {
            position: fix,
            quality: filtered.quality,
        });
        if let Some(change) = filtered.accuracy_change {
            outcome.events.push(NavigationEvent::AccuracyChanged {
                previous: change.previous,
                current: change.current,
                quality: filtered.quality,
            });
        }

        // 2. Instruction
        let guidance = self.generator.generate(&self.route, here);
        self.step_index = guidance.step_index;
        if self.gate.should_announce(&guidance.instruction, now_ms) {
            outcome.announcement = Some(guidance.instruction.text.clone());
        }
        let changed = self.instruction.as_ref().map_or(true, |current| {
            current.text != guidance.instruction.text
                || current.maneuver != guidance.instruction.maneuver
        });
        if changed {
            outcome.events.push(NavigationEvent::InstructionUpdated {
                instruction: guidance.instruction.clone(),
            });
        }
        self.instruction = Some(guidance.instruction);

        // 3. Deviation
        if let DeviationStatus::Deviated { distance, .. } = self.deviation.update(&self.route, here) {
            outcome.events.push(NavigationEvent::Deviated {
                distance,
                action: DeviationAction::Recalculate,
            });
            if !self.recalculation_pending {
                self.recalculation_pending = true;
                outcome.recalculation = Some(RecalculationRequest {
                    origin: here,
                    destination: self.route.end,
                    mode: self.route.mode,
                });
            }
        }

        // 4. Progress
        self.progress = self.tracker.update(&self.route, self.step_index, here);

        // 5. Arrival
        let to_destination = geo::distance(here, self.route.end);
        if to_destination <= self.config.arrival_threshold {
            outcome.recalculation = None;
            outcome.events.push(self.transition(NavigationState::Arrived));
            outcome.events.push(NavigationEvent::Arrived {
                position: fix,
                distance_to_destination: to_destination,
            });
            outcome.events.extend(self.stop());
        }

        outcome
    }

    /// Replace the route after a successful recalculation
    ///
    /// Progress restarts from zero against the new route.
    pub fn apply_route(&mut self, route: Route) -> Result<NavigationEvent, NavigationError> {
        route.validate()?;
        self.recalculation_pending = false;
        self.deviation.route_replaced();
        self.tracker.reset();
        self.progress = initial_progress(&route, &self.config);
        self.step_index = None;
        self.instruction = None;
        self.route = route;
        Ok(NavigationEvent::RouteRecalculated {
            total_distance: self.route.effective_total_distance(),
            steps: self.route.steps.len(),
        })
    }

    /// Record a failed recalculation; the old route stays in use
    pub fn recalculation_failed(&mut self, reason: &str) -> NavigationEvent {
        self.recalculation_pending = false;
        NavigationEvent::Error {
            message: format!("Route recalculation failed: {}", reason),
        }
    }

    pub fn status(&self) -> NavigationStatus {
        NavigationStatus {
            state: self.state,
            route: Some(self.route.clone()),
            position: self.position,
            quality: self.quality,
            instruction: self.instruction.clone(),
            step_index: self.step_index,
            progress: self.progress,
            distance_to_destination: self
                .position
                .map(|p| geo::distance(p.coordinate(), self.route.end)),
            deviation: self.deviation.state(),
            started_at: Some(self.started_at),
            updated_at: self.updated_at,
        }
    }
}

fn initial_progress(route: &Route, config: &NavigationConfig) -> Progress {
    let remaining = route.effective_total_distance();
    Progress {
        traveled: 0.0,
        remaining,
        fraction: 0.0,
        eta_seconds: remaining / 1000.0 / config.assumed_speed_kmh * 3600.0,
    }
}
