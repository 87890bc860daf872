//! Simulation collaborators.
//!
//! Lets the server run without a GPS receiver or routing backend: a simulated
//! traveler moves along the active route at a fixed speed, a straight-line
//! planner answers recalculation requests, and announcements and
//! notifications go to the log.
//!
//! The traveler can leave the route for a stretch (`--detour-at`) to exercise
//! deviation detection and recalculation. It then drives the recalculated
//! route from its start, without a second detour.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use routewise_core::{
    geo, Coordinate, ManeuverType, NavigationEvent, NavigationState, Position, Route, Step,
    TravelMode,
};
use tokio::sync::broadcast;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::collaborators::{
    AnnouncerError, NotificationSink, NotifyError, PlannerError, PositionError, PositionProvider,
    RoutePlanner, VoiceAnnouncer,
};
use crate::navigator::{now_ms, Navigator, NavigatorError};

/// Sideways offset while on a detour
const DETOUR_OFFSET_M: f64 = 150.0;
/// Share of the route spent on the detour
const DETOUR_SPAN: f64 = 0.1;
/// Accuracy reported with simulated fixes
const SIMULATED_ACCURACY_M: f64 = 5.0;

/// Read a route from a JSON file
pub fn load_route(path: &Path) -> Result<Route, NavigatorError> {
    let json = fs::read_to_string(path)?;
    Ok(Route::from_json(&json)?)
}

/// Route through central Taipei used when no route file is given
pub fn demo_route() -> Route {
    let taipei_101 = Coordinate::new(25.0330, 121.5654);
    let city_hall = Coordinate::new(25.0375, 121.5637);
    let zhongxiao = Coordinate::new(25.0416, 121.5438);
    let main_station = Coordinate::new(25.0478, 121.5170);
    Route::from_steps(
        taipei_101,
        main_station,
        vec![
            Step::between(0, taipei_101, city_hall, "Head north on Songzhi Road", ManeuverType::Continue),
            Step::between(1, city_hall, zhongxiao, "Turn left onto Zhongxiao East Road", ManeuverType::TurnLeft),
            Step::between(2, zhongxiao, main_station, "Continue to Taipei Main Station", ManeuverType::Continue),
        ],
        TravelMode::Driving,
    )
}

/// Polyline with cumulative distances
#[derive(Debug, Clone)]
struct Track {
    points: Vec<Coordinate>,
    /// Distance from the first point to each point
    cumulative: Vec<f64>,
    started: Instant,
    /// Fraction of the track where the detour starts
    detour_at: Option<f64>,
}

impl Track {
    fn new(route: &Route, detour_at: Option<f64>) -> Self {
        let mut points = vec![route.start];
        points.extend(route.steps.iter().map(|step| step.end));
        if points.last() != Some(&route.end) {
            points.push(route.end);
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += geo::distance(pair[0], pair[1]);
            cumulative.push(total);
        }

        Track {
            points,
            cumulative,
            started: Instant::now(),
            detour_at,
        }
    }

    fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Point and heading `traveled` meters along the track
    fn point_at(&self, traveled: f64) -> (Coordinate, f64) {
        let traveled = traveled.clamp(0.0, self.length());
        for (i, pair) in self.points.windows(2).enumerate() {
            if traveled <= self.cumulative[i + 1] || i + 2 == self.points.len() {
                let heading = geo::bearing(pair[0], pair[1]);
                let along = traveled - self.cumulative[i];
                return (geo::destination_point(pair[0], heading, along), heading);
            }
        }
        (self.points[0], 0.0)
    }
}

/// Position provider that drives along a route
pub struct SimulatedTraveler {
    speed: f64,
    detour_at: Option<f64>,
    track: Mutex<Track>,
}

impl SimulatedTraveler {
    /// `speed` in m/s; `detour_at` is the fraction of the route where the
    /// traveler leaves it
    pub fn new(route: &Route, speed: f64, detour_at: Option<f64>) -> Self {
        SimulatedTraveler {
            speed,
            detour_at,
            track: Mutex::new(Track::new(route, detour_at)),
        }
    }

    /// Restart from the beginning of `route`
    pub fn follow(&self, route: &Route) {
        *self.track.lock().unwrap_or_else(PoisonError::into_inner) =
            Track::new(route, self.detour_at);
    }

    /// Drive a recalculated route from its start, without another detour
    pub fn rejoin(&self, route: &Route) {
        *self.track.lock().unwrap_or_else(PoisonError::into_inner) = Track::new(route, None);
    }

    /// Where the traveler is after `elapsed`, and the heading
    pub fn position_after(&self, elapsed: Duration) -> (Coordinate, f64) {
        let track = self.track.lock().unwrap_or_else(PoisonError::into_inner);
        let length = track.length();
        let traveled = self.speed * elapsed.as_secs_f64();
        let (point, heading) = track.point_at(traveled);

        match track.detour_at {
            Some(at) if length > 0.0 => {
                let fraction = traveled / length;
                if fraction >= at && fraction < at + DETOUR_SPAN {
                    let side = geo::normalize_bearing(heading + 90.0);
                    (geo::destination_point(point, side, DETOUR_OFFSET_M), heading)
                } else {
                    (point, heading)
                }
            }
            _ => (point, heading),
        }
    }

    fn elapsed(&self) -> Duration {
        self.track
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .elapsed()
    }

    /// Follow every route the navigator starts or recalculates
    pub async fn follow_navigator(
        self: Arc<Self>,
        mut events: broadcast::Receiver<NavigationEvent>,
        navigator: Arc<Navigator>,
        subsys: SubsystemHandle,
    ) -> Result<(), NavigatorError> {
        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => break,
                event = events.recv() => match event {
                    Ok(NavigationEvent::StateChanged { from: NavigationState::Idle, to: NavigationState::Active }) => {
                        if let Some(route) = navigator.status().route {
                            log::info!("Simulator: following new route");
                            self.follow(&route);
                        }
                    }
                    Ok(NavigationEvent::RouteRecalculated { .. }) => {
                        if let Some(route) = navigator.status().route {
                            log::info!("Simulator: rejoining recalculated route");
                            self.rejoin(&route);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("Simulator: skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PositionProvider for SimulatedTraveler {
    async fn current_position(&self) -> Result<Option<Position>, PositionError> {
        let (point, heading) = self.position_after(self.elapsed());
        Ok(Some(Position {
            latitude: point.latitude,
            longitude: point.longitude,
            accuracy: Some(SIMULATED_ACCURACY_M),
            speed: Some(self.speed),
            course: Some(heading),
            timestamp: now_ms(),
        }))
    }
}

/// Planner that answers with the direct line to the destination
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightLinePlanner;

#[async_trait]
impl RoutePlanner for StraightLinePlanner {
    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Route, PlannerError> {
        let route = Route::direct(origin, destination, mode);
        route.validate()?;
        Ok(route)
    }
}

/// Announcer that writes instructions to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

#[async_trait]
impl VoiceAnnouncer for LogAnnouncer {
    async fn speak(&self, text: &str) -> Result<(), AnnouncerError> {
        log::info!("Announcement: {}", text);
        Ok(())
    }
}

/// Notification sink that writes events to the log as JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: &NavigationEvent) -> Result<(), NotifyError> {
        let json = serde_json::to_string(event).map_err(|e| NotifyError::Failed(e.to_string()))?;
        log::info!("Notification: {}", json);
        Ok(())
    }
}
