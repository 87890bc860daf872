//! Navigation engine.
//!
//! Wraps a [`NavigationSession`] from routewise-core in a cancellable tokio
//! tick loop and connects it to the external collaborators.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ Navigator (this module)                            │
//! │  - start / stop / pause / resume / status          │
//! │  - broadcast channel of NavigationEvent            │
//! │  - watch channel with a status snapshot per tick   │
//! └────────────────────────────────────────────────────┘
//!                    │ spawns
//!                    ▼
//! ┌────────────────────────────────────────────────────┐
//! │ TickLoop                                           │
//! │  - PositionProvider (bounded by a timeout)         │
//! │  - NavigationSession::tick                         │
//! │  - RoutePlanner on deviation                       │
//! │  - VoiceAnnouncer / NotificationSink (detached)    │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Only one session runs at a time. Starting a new one stops the previous
//! one first. Stopping cancels the loop and waits for it to finish, so no
//! tick can run after `stop` returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use routewise_core::{
    NavigationError, NavigationEvent, NavigationSession, NavigationState, NavigationStatus,
    Position, RecalculationRequest, Route,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    is_notifiable, NotificationSink, PositionError, PositionProvider, RoutePlanner, VoiceAnnouncer,
};
use crate::config::{ConfigError, NavigatorConfig};

#[derive(Error, Debug)]
pub enum NavigatorError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Current Unix time in milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// The collaborators a navigator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn PositionProvider>,
    pub planner: Arc<dyn RoutePlanner>,
    pub announcer: Arc<dyn VoiceAnnouncer>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

type SharedSession = Arc<Mutex<NavigationSession>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, NavigationSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fans events and status snapshots out to subscribers
#[derive(Clone)]
struct Publisher {
    events: broadcast::Sender<NavigationEvent>,
    status: Arc<watch::Sender<NavigationStatus>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl Publisher {
    fn publish(&self, event: NavigationEvent) {
        let notify = is_notifiable(&event);
        self.send(event, notify);
    }

    fn send(&self, event: NavigationEvent, notify: bool) {
        log::debug!("Event: {:?}", event);
        if let Some(notifier) = &self.notifier {
            if notify {
                let notifier = notifier.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&event).await {
                        log::warn!("Notification for {} failed: {}", event.kind(), e);
                    }
                });
            }
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn error(&self, message: String) {
        self.publish(NavigationEvent::Error { message });
    }

    fn status(&self, status: NavigationStatus) {
        self.status.send_replace(status);
    }
}

struct ActiveSession {
    session: SharedSession,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

pub struct Navigator {
    config: NavigatorConfig,
    collaborators: Collaborators,
    publisher: Publisher,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl Navigator {
    pub fn new(config: NavigatorConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (status, _) = watch::channel(NavigationStatus::default());
        let publisher = Publisher {
            events,
            status: Arc::new(status),
            notifier: collaborators.notifier.clone(),
        };
        Navigator {
            config,
            collaborators,
            publisher,
            active: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.publisher.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<NavigationStatus> {
        self.publisher.status.subscribe()
    }

    /// Snapshot published by the last state change or tick
    pub fn status(&self) -> NavigationStatus {
        self.publisher.status.borrow().clone()
    }

    /// Start navigating `route`, replacing any running session
    ///
    /// An invalid route is rejected before the running session is touched.
    pub async fn start(&self, route: Route) -> Result<NavigationStatus, NavigatorError> {
        route.validate()?;

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            log::info!("Stopping previous session");
            self.shutdown(previous).await;
        }

        let (session, event) =
            NavigationSession::start(route, self.config.navigation.clone(), now_ms())?;
        let status = session.status();
        log::info!(
            "Navigation started: {:.0} m in {} steps",
            session.route().effective_total_distance(),
            session.route().steps.len()
        );
        self.publisher.status(status.clone());
        self.publisher.publish(event);

        let session = Arc::new(Mutex::new(session));
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let tick_loop = TickLoop {
            session: session.clone(),
            collaborators: self.collaborators.clone(),
            publisher: self.publisher.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            wake: wake.clone(),
        };
        let task = tokio::spawn(tick_loop.run());

        *active = Some(ActiveSession {
            session,
            cancel,
            wake,
            task,
        });
        Ok(status)
    }

    /// Stop the running session; a no-op when there is none
    pub async fn stop(&self) -> NavigationStatus {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.shutdown(previous).await;
        }
        self.status()
    }

    pub async fn pause(&self) -> NavigationStatus {
        self.control(NavigationSession::pause).await
    }

    pub async fn resume(&self) -> NavigationStatus {
        self.control(NavigationSession::resume).await
    }

    async fn control(
        &self,
        transition: fn(&mut NavigationSession) -> Option<NavigationEvent>,
    ) -> NavigationStatus {
        let active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            let (event, state) = {
                let mut session = lock(&current.session);
                let event = transition(&mut session);
                if event.is_some() {
                    self.publisher.status(session.status());
                }
                (event, session.state())
            };
            if let Some(event) = event {
                log::info!("Navigation {}", state);
                self.publisher.publish(event);
                current.wake.notify_one();
            }
        }
        self.status()
    }

    /// Cancel the loop, wait for it, then stop the session
    async fn shutdown(&self, active: ActiveSession) {
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            log::warn!("Tick loop ended abnormally: {}", e);
        }
        let event = {
            let mut session = lock(&active.session);
            let event = session.stop();
            self.publisher.status(session.status());
            event
        };
        if let Some(event) = event {
            log::info!("Navigation stopped");
            self.publisher.publish(event);
        }
    }

    /// Run as a subsystem: optionally start a route, stop on shutdown
    pub async fn run(
        self: Arc<Self>,
        route: Option<Route>,
        subsys: SubsystemHandle,
    ) -> Result<(), NavigatorError> {
        if let Some(route) = route {
            self.start(route).await?;
        }
        subsys.on_shutdown_requested().await;
        log::info!("Navigator: Shutdown requested");
        self.stop().await;
        Ok(())
    }
}

struct TickLoop {
    session: SharedSession,
    collaborators: Collaborators,
    publisher: Publisher,
    config: NavigatorConfig,
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

impl TickLoop {
    fn state(&self) -> NavigationState {
        lock(&self.session).state()
    }

    async fn run(self) {
        log::debug!("Tick loop started");

        loop {
            match self.state() {
                NavigationState::Active => {}
                NavigationState::Paused => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.wake.notified() => continue,
                    }
                }
                _ => break,
            }

            let fix = tokio::select! {
                _ = self.cancel.cancelled() => break,
                fix = self.fetch_position() => fix,
            };

            if let Some(request) = fix.and_then(|fix| self.process(fix)) {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.recalculate(request) => {}
                }
            }

            let period = self.next_period();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
                _ = self.wake.notified() => {}
            }
        }

        log::debug!("Tick loop finished");
    }

    async fn fetch_position(&self) -> Option<Position> {
        let timeout = self.config.provider_timeout();
        let result = tokio::time::timeout(timeout, self.collaborators.provider.current_position())
            .await
            .unwrap_or(Err(PositionError::Timeout(timeout)));
        match result {
            Ok(Some(fix)) => Some(fix),
            Ok(None) => {
                log::debug!("No position fix this tick");
                None
            }
            Err(e) => {
                log::warn!("Position provider: {}", e);
                self.publisher.error(e.to_string());
                None
            }
        }
    }

    /// Run one fix through the session and publish the results
    fn process(&self, fix: Position) -> Option<RecalculationRequest> {
        // Status goes out under the lock, ordered with pause and stop
        let (outcome, was_off_route) = {
            let mut session = lock(&self.session);
            let was_off_route = session.deviation().off_route;
            let outcome = session.tick(fix, now_ms());
            self.publisher.status(session.status());
            (outcome, was_off_route)
        };

        if let Some(text) = outcome.announcement {
            self.announce(text);
        }
        for event in outcome.events {
            if let NavigationEvent::Deviated { distance, .. } = &event {
                // Only the first report of a deviation reaches the notifier
                if was_off_route {
                    log::debug!("Still off route by {:.0} m", distance);
                    self.publisher.send(event, false);
                    continue;
                }
                log::info!("Off route by {:.0} m", distance);
            }
            self.publisher.publish(event);
        }
        outcome.recalculation
    }

    fn announce(&self, text: String) {
        let announcer = self.collaborators.announcer.clone();
        tokio::spawn(async move {
            if let Err(e) = announcer.speak(&text).await {
                log::warn!("Announcement '{}' failed: {}", text, e);
            }
        });
    }

    async fn recalculate(&self, request: RecalculationRequest) {
        let mode = self.config.travel_mode.unwrap_or(request.mode);
        log::info!(
            "Recalculating {} route from {:.5},{:.5}",
            mode,
            request.origin.latitude,
            request.origin.longitude
        );
        let result = self
            .collaborators
            .planner
            .calculate_route(request.origin, request.destination, mode)
            .await;

        let event = {
            let mut session = lock(&self.session);
            let event = match result {
                Ok(route) => session
                    .apply_route(route)
                    .unwrap_or_else(|e| session.recalculation_failed(&e.to_string())),
                Err(e) => session.recalculation_failed(&e.to_string()),
            };
            self.publisher.status(session.status());
            event
        };
        if let NavigationEvent::Error { message } = &event {
            log::warn!("{}", message);
        }
        self.publisher.publish(event);
    }

    /// Configured period, stretched to the signal quality cadence when
    /// adaptive polling is on
    fn next_period(&self) -> Duration {
        let base = self.config.tick_period();
        if !self.config.adaptive_polling {
            return base;
        }
        lock(&self.session)
            .quality()
            .map_or(base, |quality| quality.polling_interval().max(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{AnnouncerError, NotifyError, PlannerError};
    use async_trait::async_trait;
    use routewise_core::{geo, Coordinate, ManeuverType, Step, TravelMode};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const START: Coordinate = Coordinate::new(25.0330, 121.5654);
    const END: Coordinate = Coordinate::new(25.0478, 121.5170);

    fn route() -> Route {
        Route::from_steps(
            START,
            END,
            vec![Step::between(0, START, END, "Go", ManeuverType::Continue)],
            TravelMode::Driving,
        )
    }

    fn off_route() -> Coordinate {
        Coordinate::new(25.0330 + 0.01, 121.5500)
    }

    fn fix(c: Coordinate) -> Position {
        Position::new(c.latitude, c.longitude, Some(5.0), now_ms())
    }

    /// Replays scripted answers, repeating the last one
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Option<Position>, PositionError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Option<Position>, PositionError>>) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PositionProvider for ScriptedProvider {
        async fn current_position(&self) -> Result<Option<Position>, PositionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap_or(Ok(None))
            }
        }
    }

    struct DirectPlanner {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoutePlanner for DirectPlanner {
        async fn calculate_route(
            &self,
            origin: Coordinate,
            destination: Coordinate,
            mode: TravelMode,
        ) -> Result<Route, PlannerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PlannerError::Unavailable("offline".into()))
            } else {
                Ok(Route::direct(origin, destination, mode))
            }
        }
    }

    #[derive(Default)]
    struct RecordingAnnouncer {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceAnnouncer for RecordingAnnouncer {
        async fn speak(&self, text: &str) -> Result<(), AnnouncerError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Records what it was asked to deliver, then fails
    #[derive(Default)]
    struct FailingNotifier {
        kinds: Mutex<Vec<&'static str>>,
    }

    impl FailingNotifier {
        fn count(&self, kind: &str) -> usize {
            self.kinds.lock().unwrap().iter().filter(|k| **k == kind).count()
        }
    }

    #[async_trait]
    impl NotificationSink for FailingNotifier {
        async fn notify(&self, event: &NavigationEvent) -> Result<(), NotifyError> {
            self.kinds.lock().unwrap().push(event.kind());
            Err(NotifyError::Failed("no network".into()))
        }
    }

    struct Harness {
        navigator: Navigator,
        provider: Arc<ScriptedProvider>,
        planner: Arc<DirectPlanner>,
        announcer: Arc<RecordingAnnouncer>,
        notifier: Arc<FailingNotifier>,
    }

    fn harness(script: Vec<Result<Option<Position>, PositionError>>, planner_fails: bool) -> Harness {
        let provider = ScriptedProvider::new(script);
        let planner = Arc::new(DirectPlanner {
            fail: planner_fails,
            calls: AtomicUsize::new(0),
        });
        let announcer = Arc::new(RecordingAnnouncer::default());
        let notifier = Arc::new(FailingNotifier::default());
        let config = NavigatorConfig {
            tick_period_ms: 10,
            provider_timeout_ms: 200,
            ..Default::default()
        };
        let navigator = Navigator::new(
            config,
            Collaborators {
                provider: provider.clone(),
                planner: planner.clone(),
                announcer: announcer.clone(),
                notifier: Some(notifier.clone()),
            },
        );
        Harness {
            navigator,
            provider,
            planner,
            announcer,
            notifier,
        }
    }

    /// Wait for the first event matching `pred`
    async fn wait_for(
        rx: &mut broadcast::Receiver<NavigationEvent>,
        pred: impl Fn(&NavigationEvent) -> bool,
    ) -> NavigationEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_invalid_route_is_rejected() {
        let h = harness(vec![Ok(None)], false);
        let mut bad = route();
        bad.end = Coordinate::new(f64::NAN, 0.0);
        assert_err!(h.navigator.start(bad).await);
        assert_eq!(h.navigator.status().state, NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_arrival_stops_session() {
        let h = harness(vec![Ok(Some(fix(END)))], false);
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        wait_for(&mut rx, |e| matches!(e, NavigationEvent::Arrived { .. })).await;
        wait_for(&mut rx, |e| {
            matches!(
                e,
                NavigationEvent::StateChanged {
                    to: NavigationState::Stopped,
                    ..
                }
            )
        })
        .await;
        assert_eq!(h.navigator.status().state, NavigationState::Stopped);

        // Stopping afterwards changes nothing
        let status = h.navigator.stop().await;
        assert_eq!(status.state, NavigationState::Stopped);
    }

    #[tokio::test]
    async fn test_deviation_triggers_single_recalculation() {
        let h = harness(vec![Ok(Some(fix(off_route())))], false);
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        wait_for(&mut rx, |e| matches!(e, NavigationEvent::Deviated { .. })).await;
        wait_for(&mut rx, |e| {
            matches!(e, NavigationEvent::RouteRecalculated { .. })
        })
        .await;

        // Let a few more ticks run against the new route
        let seen = h.provider.calls();
        while h.provider.calls() < seen + 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.planner.calls.load(Ordering::SeqCst), 1);

        let status = h.navigator.status();
        assert_eq!(status.deviation.consecutive, 0);
        assert!(!status.deviation.off_route);
        assert!(geo::distance(status.route.unwrap().start, off_route()) < 1.0);
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_planner_failure_is_not_fatal() {
        let h = harness(vec![Ok(Some(fix(off_route())))], true);
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        wait_for(&mut rx, |e| matches!(e, NavigationEvent::Error { .. })).await;
        // The next off-route fix asks again
        wait_for(&mut rx, |e| matches!(e, NavigationEvent::Error { .. })).await;
        assert!(h.planner.calls.load(Ordering::SeqCst) >= 2);

        let status = h.navigator.status();
        assert_eq!(status.state, NavigationState::Active);
        assert!(status.deviation.off_route);
        assert_eq!(status.route.unwrap(), route());
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_provider_errors_are_not_fatal() {
        let h = harness(
            vec![
                Err(PositionError::PermissionDenied),
                Ok(None),
                Ok(Some(fix(START))),
            ],
            false,
        );
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        let event = wait_for(&mut rx, |e| matches!(e, NavigationEvent::Error { .. })).await;
        assert_eq!(
            event,
            NavigationEvent::Error {
                message: PositionError::PermissionDenied.to_string()
            }
        );
        wait_for(&mut rx, |e| {
            matches!(e, NavigationEvent::PositionUpdated { .. })
        })
        .await;
        assert_eq!(h.navigator.status().state, NavigationState::Active);
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = harness(vec![Ok(Some(fix(START)))], false);
        assert_ok!(h.navigator.start(route()).await);

        let first = h.navigator.stop().await;
        let calls = h.provider.calls();
        let second = h.navigator.stop().await;
        assert_eq!(first, second);
        assert_eq!(second.state, NavigationState::Stopped);

        // The loop is gone
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.provider.calls(), calls);
    }

    #[tokio::test]
    async fn test_pause_halts_ticks() {
        let h = harness(vec![Ok(Some(fix(START)))], false);
        assert_ok!(h.navigator.start(route()).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let status = h.navigator.pause().await;
        assert_eq!(status.state, NavigationState::Paused);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let paused_calls = h.provider.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.provider.calls(), paused_calls);

        let status = h.navigator.resume().await;
        assert_eq!(status.state, NavigationState::Active);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(h.provider.calls() > paused_calls);
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_pause_when_idle_is_noop() {
        let h = harness(vec![Ok(None)], false);
        assert_eq!(h.navigator.pause().await.state, NavigationState::Idle);
        assert_eq!(h.navigator.resume().await.state, NavigationState::Idle);
    }

    #[tokio::test]
    async fn test_start_replaces_running_session() {
        let h = harness(vec![Ok(Some(fix(START)))], false);
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        let second = Route::direct(START, geo::destination_point(START, 0.0, 3000.0), TravelMode::Walking);
        let status = assert_ok!(h.navigator.start(second.clone()).await);
        assert_eq!(status.route, Some(second));

        // First session stopped before the second became active
        wait_for(&mut rx, |e| {
            matches!(
                e,
                NavigationEvent::StateChanged {
                    from: NavigationState::Active,
                    to: NavigationState::Stopped
                }
            )
        })
        .await;
        wait_for(&mut rx, |e| {
            matches!(
                e,
                NavigationEvent::StateChanged {
                    from: NavigationState::Idle,
                    to: NavigationState::Active
                }
            )
        })
        .await;
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_announces_near_destination() {
        // 300 m before the destination on the route
        let near = geo::destination_point(END, geo::bearing(END, START), 300.0);
        let h = harness(vec![Ok(Some(fix(near)))], false);
        assert_ok!(h.navigator.start(route()).await);

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.announcer.spoken.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("nothing announced");
        let spoken = h.announcer.spoken.lock().unwrap().clone();
        // Repeated text is held back for the repeat interval
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0], "Continue straight for 300 m");
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_status_watch_follows_ticks() {
        let h = harness(vec![Ok(Some(fix(START)))], false);
        let mut status_rx = h.navigator.watch_status();
        assert_ok!(h.navigator.start(route()).await);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if status_rx.borrow_and_update().position.is_some() {
                    break;
                }
                status_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("no status with a position");
        let status = h.navigator.status();
        assert_eq!(status.step_index, Some(0));
        assert!(status.instruction.is_some());
        h.navigator.stop().await;
    }

    #[tokio::test]
    async fn test_deviation_notifies_once_while_off_route() {
        let h = harness(vec![Ok(Some(fix(off_route())))], true);
        let mut rx = h.navigator.subscribe();
        assert_ok!(h.navigator.start(route()).await);

        for _ in 0..3 {
            wait_for(&mut rx, |e| matches!(e, NavigationEvent::Deviated { .. })).await;
        }
        h.navigator.stop().await;
        // Notifications run on their own tasks
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.notifier.count("deviated"), 1);
        assert!(h.planner.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_is_not_overwritten_by_running_tick() {
        for i in 0..20u64 {
            let h = harness(vec![Ok(Some(fix(START)))], false);
            assert_ok!(h.navigator.start(route()).await);
            tokio::time::sleep(Duration::from_millis(i % 10)).await;

            assert_eq!(h.navigator.pause().await.state, NavigationState::Paused);
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(h.navigator.status().state, NavigationState::Paused);
            assert_eq!(h.navigator.watch_status().borrow().state, NavigationState::Paused);
            h.navigator.stop().await;
        }
    }

    fn tick_loop(config: NavigatorConfig, first_fix: Option<Position>) -> TickLoop {
        let h = harness(vec![Ok(None)], false);
        let (mut session, _) =
            NavigationSession::start(route(), config.navigation.clone(), 0).unwrap();
        if let Some(fix) = first_fix {
            session.tick(fix, 1000);
        }
        TickLoop {
            session: Arc::new(Mutex::new(session)),
            collaborators: h.navigator.collaborators.clone(),
            publisher: h.navigator.publisher.clone(),
            config,
            cancel: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
        }
    }

    fn polling(tick_period_ms: u64, adaptive_polling: bool) -> NavigatorConfig {
        NavigatorConfig {
            tick_period_ms,
            adaptive_polling,
            ..Default::default()
        }
    }

    #[test]
    fn test_next_period_without_adaptive_polling() {
        let tl = tick_loop(polling(2000, false), Some(fix(START)));
        assert_eq!(tl.next_period(), Duration::from_millis(2000));
    }

    #[test]
    fn test_next_period_follows_signal_quality() {
        // 5 m accuracy is an excellent signal, polled every 5 s
        let tl = tick_loop(polling(2000, true), Some(fix(START)));
        assert_eq!(tl.next_period(), Duration::from_secs(5));

        // Never faster than the configured period
        let tl = tick_loop(polling(8000, true), Some(fix(START)));
        assert_eq!(tl.next_period(), Duration::from_millis(8000));
    }

    #[test]
    fn test_next_period_before_first_fix() {
        let tl = tick_loop(polling(2000, true), None);
        assert_eq!(tl.next_period(), Duration::from_millis(2000));
    }
}
