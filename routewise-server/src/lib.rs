//! # Routewise Server
//!
//! Turn-by-turn guidance service with a REST API and a server-sent event
//! stream.
//!
//! ## Architecture
//!
//! The server is built on top of [`routewise_core`] for the navigation logic,
//! with [`tokio`] providing the async runtime.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    routewise-server                     │
//! │  ┌─────────────────────┐  ┌───────────────────────────┐ │
//! │  │ REST API (axum)     │  │ Event stream (SSE)        │ │
//! │  └──────────┬──────────┘  └─────────────┬─────────────┘ │
//! │             ▼                           ▼               │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │              Navigator                              ││
//! │  │  - one NavigationSession at a time                  ││
//! │  │  - cancellable tick loop                            ││
//! │  │  - broadcast events, watch status                   ││
//! │  └─────────────────────────────────────────────────────┘│
//! │             │                                           │
//! │             ▼                                           │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │  Collaborators (async traits)                       ││
//! │  │  - PositionProvider, RoutePlanner                   ││
//! │  │  - VoiceAnnouncer, NotificationSink                 ││
//! │  └─────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`navigator::Navigator`] - Start/stop/pause/resume and the tick loop
//! - [`collaborators`] - Traits for the outside world
//! - [`simulator`] - Simulated traveler, straight-line planner, log sinks
//! - [`web::Web`] - REST API and event stream
//! - [`config::NavigatorConfig`] - File and command line configuration
//!
//! ## Example: Starting the Server
//!
//! ```rust,no_run
//! use clap::Parser;
//! use routewise_server::{Cli, web::Web};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};
//!
//! # fn navigator() -> routewise_server::navigator::Navigator { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["routewise-server", "-p", "8080"]);
//!     let web = Web::new(Arc::new(navigator()), args.port);
//!
//!     Toplevel::new(|s| async move {
//!         s.start(SubsystemBuilder::new("Webserver", |subsys| web.run(subsys)));
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-p, --port` - HTTP server port (default: 6580)
//! - `-v` - Increase verbosity (use multiple times)
//! - `-r, --route` - Route file to follow in simulation
//! - `--autostart` - Start navigating as soon as the server is up
//! - `--detour-at` - Leave the route part way to exercise recalculation

use std::path::PathBuf;

use clap::Parser;

pub mod collaborators;
pub mod config;
pub mod navigator;
pub mod simulator;
pub mod web;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterArg {
    Smoothing,
    Predictive,
    Kalman,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Driving,
    Walking,
    Cycling,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Port for webserver
    #[arg(short, long, default_value_t = 6580)]
    pub port: u16,

    /// Configuration file (JSON), defaults to config.json in the user config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Route file (JSON) for the simulated traveler, a demo route when absent
    #[arg(short, long)]
    pub route: Option<PathBuf>,

    /// Start navigating the route immediately
    #[arg(long, default_value_t = false)]
    pub autostart: bool,

    /// Time between ticks in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Slow polling down when the signal degrades
    #[arg(long, default_value_t = false)]
    pub adaptive_polling: bool,

    /// Location filter
    #[arg(long, value_enum)]
    pub filter: Option<FilterArg>,

    /// Travel mode for recalculated routes
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Speed of the simulated traveler in m/s
    #[arg(long, default_value_t = 13.9)]
    pub speed: f64,

    /// Leave the route at this fraction of the way (0..1)
    #[arg(long)]
    pub detour_at: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Cli::parse_from(["routewise-server"]);
        assert_eq!(args.port, 6580);
        assert!(!args.autostart);
        assert!(args.route.is_none());
        assert_eq!(args.speed, 13.9);
    }

    #[test]
    fn test_cli_simulation_flags() {
        let args = Cli::parse_from([
            "routewise-server",
            "-p",
            "8080",
            "--route",
            "trip.json",
            "--autostart",
            "--detour-at",
            "0.4",
        ]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.route, Some(PathBuf::from("trip.json")));
        assert!(args.autostart);
        assert_eq!(args.detour_at, Some(0.4));
    }
}
