//! REST API and event stream.
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /api/v1/navigation` | Current status snapshot |
//! | `POST /api/v1/navigation/start` | Start navigating the route in the body |
//! | `POST /api/v1/navigation/stop` | Stop navigating |
//! | `POST /api/v1/navigation/pause` | Pause the tick loop |
//! | `POST /api/v1/navigation/resume` | Resume the tick loop |
//! | `GET /api/v1/navigation/events` | Server-sent event stream |

use std::convert::Infallible;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use log::debug;
use routewise_core::{NavigationEvent, NavigationStatus, Route};
use serde::Serialize;
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::navigator::{Navigator, NavigatorError};

const NAVIGATION_URI: &str = "/api/v1/navigation";
const START_URI: &str = "/api/v1/navigation/start";
const STOP_URI: &str = "/api/v1/navigation/stop";
const PAUSE_URI: &str = "/api/v1/navigation/pause";
const RESUME_URI: &str = "/api/v1/navigation/resume";
const EVENTS_URI: &str = "/api/v1/navigation/events";

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Socket operation failed")]
    Io(#[from] io::Error),
}

#[derive(Clone)]
pub struct Web {
    navigator: Arc<Navigator>,
    port: u16,
}

impl Web {
    pub fn new(navigator: Arc<Navigator>, port: u16) -> Self {
        Web { navigator, port }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(NAVIGATION_URI, get(get_status))
            .route(START_URI, post(start_navigation))
            .route(STOP_URI, post(stop_navigation))
            .route(PAUSE_URI, post(pause_navigation))
            .route(RESUME_URI, post(resume_navigation))
            .route(EVENTS_URI, get(event_stream))
            .layer(middleware::from_fn(no_cache_middleware))
            .with_state(self)
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), WebError> {
        let port = self.port;
        let listener =
            TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await?;

        log::info!("Starting HTTP web server on port {}", port);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                subsys.on_shutdown_requested().await;
            })
            .await?;
        log::info!("HTTP web server stopped");
        Ok(())
    }
}

async fn no_cache_middleware(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(NavigatorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            NavigatorError::Navigation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn get_status(State(state): State<Web>) -> Json<NavigationStatus> {
    Json(state.navigator.status())
}

async fn start_navigation(
    State(state): State<Web>,
    Json(route): Json<Route>,
) -> Result<Json<NavigationStatus>, ApiError> {
    debug!("Start request with {} steps", route.steps.len());
    state.navigator.start(route).await.map(Json).map_err(ApiError)
}

async fn stop_navigation(State(state): State<Web>) -> Json<NavigationStatus> {
    Json(state.navigator.stop().await)
}

async fn pause_navigation(State(state): State<Web>) -> Json<NavigationStatus> {
    Json(state.navigator.pause().await)
}

async fn resume_navigation(State(state): State<Web>) -> Json<NavigationStatus> {
    Json(state.navigator.resume().await)
}

fn to_sse(event: &NavigationEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Events from the moment of subscription on; lagging clients skip ahead
fn event_stream_from(
    rx: broadcast::Receiver<NavigationEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(to_sse(&event)), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Event stream client lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

async fn event_stream(
    State(state): State<Web>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Event stream subscriber connected");
    Sse::new(event_stream_from(state.navigator.subscribe())).keep_alive(KeepAlive::default())
}
