//! External collaborators of the navigator.
//!
//! The navigator never talks to hardware or remote services directly. It goes
//! through these traits, so a GPS receiver, a routing backend, a speech engine
//! or a push service can be swapped without touching the tick loop.
//!
//! All implementations must be `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` between the tick loop and fire-and-forget tasks.

use std::time::Duration;

use async_trait::async_trait;
use routewise_core::{Coordinate, NavigationError, NavigationEvent, Position, Route, TravelMode};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a position could not be obtained.
///
/// None of these are fatal; the tick simply has no fix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("Positioning is not supported on this device")]
    Unsupported,
    #[error("Positioning is disabled")]
    Disabled,
    #[error("Permission to read the position was denied")]
    PermissionDenied,
    #[error("No position within {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("No route found: {0}")]
    NoRoute(String),
    #[error("Route planner unavailable: {0}")]
    Unavailable(String),
    #[error("Planner returned an unusable route: {0}")]
    InvalidRoute(#[from] NavigationError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnouncerError {
    #[error("Voice output unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification failed: {0}")]
    Failed(String),
}

// =============================================================================
// Traits
// =============================================================================

/// Source of position fixes (GPS receiver, platform location API, replay).
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Latest fix, or `None` when nothing new is available.
    ///
    /// May wait for the receiver; the navigator bounds the wait with its own
    /// timeout.
    async fn current_position(&self) -> Result<Option<Position>, PositionError>;
}

/// Computes routes, used for recalculation after a deviation.
#[async_trait]
pub trait RoutePlanner: Send + Sync {
    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Route, PlannerError>;
}

/// Speaks instructions. Called fire-and-forget.
#[async_trait]
pub trait VoiceAnnouncer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), AnnouncerError>;
}

/// Best-effort notifications on start, stop and deviation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NavigationEvent) -> Result<(), NotifyError>;
}

/// Whether an event is worth a notification
pub fn is_notifiable(event: &NavigationEvent) -> bool {
    matches!(
        event,
        NavigationEvent::StateChanged { .. }
            | NavigationEvent::Deviated { .. }
            | NavigationEvent::Arrived { .. }
    )
}
