use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use routewise_server::{
    config::NavigatorConfig,
    navigator::{Collaborators, Navigator},
    simulator::{self, LogAnnouncer, LogNotifier, SimulatedTraveler, StraightLinePlanner},
    web::Web,
    Cli, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();
    log::info!("routewise-server {} starting", VERSION);

    let config = NavigatorConfig::load(args.config.as_deref())
        .into_diagnostic()?
        .with_cli(&args);
    config.validate().into_diagnostic()?;

    let route = match &args.route {
        Some(path) => simulator::load_route(path).into_diagnostic()?,
        None => simulator::demo_route(),
    };
    if let Some(at) = args.detour_at {
        if !(0.0..1.0).contains(&at) {
            return Err(miette::miette!("--detour-at must be in [0, 1), got {}", at));
        }
    }

    let traveler = Arc::new(SimulatedTraveler::new(&route, args.speed, args.detour_at));
    let navigator = Arc::new(Navigator::new(
        config,
        Collaborators {
            provider: traveler.clone(),
            planner: Arc::new(StraightLinePlanner),
            announcer: Arc::new(LogAnnouncer),
            notifier: Some(Arc::new(LogNotifier)),
        },
    ));
    let autostart = args.autostart.then_some(route);
    let port = args.port;

    Toplevel::new(move |s: SubsystemHandle| async move {
        let events = navigator.subscribe();
        let follower = navigator.clone();
        s.start(SubsystemBuilder::new("Simulator", move |subsys| {
            traveler.follow_navigator(events, follower, subsys)
        }));
        let web = Web::new(navigator.clone(), port);
        s.start(SubsystemBuilder::new("Navigator", move |subsys| {
            navigator.run(autostart, subsys)
        }));
        s.start(SubsystemBuilder::new("Webserver", |subsys| web.run(subsys)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}
