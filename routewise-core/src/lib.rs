//! # Routewise Core
//!
//! Platform-independent turn-by-turn guidance library.
//!
//! This crate contains the pure navigation logic with **zero I/O dependencies**:
//! spherical geometry, fix filtering, instruction generation, deviation
//! detection and progress tracking, tied together by a session state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  routewise-core (no tokio/async deps)                       │
//! │  ├── geo/         (distances, bearings, cross-track)        │
//! │  ├── filter/      (smoothing, prediction, Kalman)           │
//! │  ├── instruction/ (maneuvers, texts, announcement gate)     │
//! │  ├── deviation/   (off-route hysteresis)                    │
//! │  ├── progress/    (fraction and ETA)                        │
//! │  └── session/     (state machine and per-fix pipeline)      │
//! └─────────────────────────────────────────────────────────────┘
//!                 ▲
//!    ┌────────────┴────────────┐
//!    │  routewise-server       │
//!    │  (tick loop, REST, SSE) │
//!    └─────────────────────────┘
//! ```
//!
//! The session never talks to a GPS receiver, a routing backend or a speech
//! engine. It consumes fixes and returns events, announcements and
//! recalculation requests; the host decides what to do with them.
//!
//! ## Example: Geometry
//!
//! ```rust
//! use routewise_core::{geo, Coordinate};
//!
//! let taipei_101 = Coordinate::new(25.0330, 121.5654);
//! let main_station = Coordinate::new(25.0478, 121.5170);
//! let d = geo::distance(taipei_101, main_station);
//! assert!((d - 5140.0).abs() < 100.0);
//! ```
//!
//! ## Example: Driving a Session
//!
//! ```rust
//! use routewise_core::{
//!     Coordinate, NavigationConfig, NavigationEvent, NavigationSession, NavigationState,
//!     Position, Route, TravelMode,
//! };
//!
//! let end = Coordinate::new(25.0478, 121.5170);
//! let route = Route::direct(Coordinate::new(25.0330, 121.5654), end, TravelMode::Driving);
//! let (mut session, _) = NavigationSession::start(route, NavigationConfig::default(), 0).unwrap();
//!
//! let outcome = session.tick(Position::new(end.latitude, end.longitude, Some(4.0), 1000), 1000);
//! assert!(outcome
//!     .events
//!     .iter()
//!     .any(|e| matches!(e, NavigationEvent::Arrived { .. })));
//! assert_eq!(session.state(), NavigationState::Stopped);
//! ```

pub mod config;
pub mod deviation;
pub mod error;
pub mod filter;
pub mod geo;
pub mod instruction;
pub mod progress;
pub mod route;
pub mod session;

// Re-export commonly used types
pub use config::{NavigationConfig, StepSelection};
pub use deviation::{DeviationMonitor, DeviationState, DeviationStatus};
pub use error::NavigationError;
pub use filter::{FilterMode, LocationFilter, SignalQuality};
pub use geo::Compass;
pub use instruction::{AnnouncementGate, Instruction, InstructionGenerator, Priority};
pub use progress::{Progress, ProgressTracker};
pub use route::{Coordinate, ManeuverType, Position, Route, Step, TravelMode};
pub use session::{
    NavigationEvent, NavigationSession, NavigationState, NavigationStatus, RecalculationRequest,
    TickOutcome,
};
