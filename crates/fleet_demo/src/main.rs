//! Interactive fleet demo: a real-time tick loop driven by stdin commands and,
//! optionally, by directives from a decision service.
//!
//! Run with: cargo run -p fleet_demo -- --scenario targets
//!
//! Logs go to stderr (`RUST_LOG` controls the filter); stdout carries command replies
//! and JSON status snapshots.

mod commands;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use fleet_core::config::{DecisionConfig, SimulationConfig};
use fleet_core::decision::DecisionPoller;
use fleet_core::error::{ConfigError, DecisionError, FleetError, RoutingError};
use fleet_core::fleet::Fleet;
use fleet_core::scenario::{build_fleet, ScenarioKind, ScenarioParams};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{parse_line, Command, HELP};

#[derive(Parser)]
#[command(
    name = "fleet_demo",
    about = "Real-time fleet motion and assignment demo",
    long_about = "Runs a fleet of vehicles in real time. Type `help` for the operator commands."
)]
struct Args {
    /// Demo layout to start from
    #[arg(value_enum, long, default_value_t = Layout::Rides)]
    scenario: Layout,
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// OSRM endpoint for road routing (straight lines when unset)
    #[arg(long, env = "FLEET_OSRM_ENDPOINT")]
    osrm: Option<String>,
    /// Decision service endpoint to poll for directives
    #[arg(long, env = "FLEET_DECISION_ENDPOINT")]
    decision: Option<String>,
    /// Fleet speed in km/h
    #[arg(long)]
    speed: Option<f64>,
    /// Simulated seconds per wall-clock second
    #[arg(long)]
    time_scale: Option<f64>,
    /// Seed for random ride requests
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Start with the clock paused
    #[arg(long)]
    paused: bool,
    /// Wall-clock interval between ticks, in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Print a JSON snapshot every N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    status_every: u64,
    /// Stop after this many wall-clock seconds
    #[arg(long)]
    run_for: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    /// Three vehicles, rides requested by the operator
    Rides,
    /// One controlled vehicle and two pick-up points
    Targets,
}

impl From<Layout> for ScenarioKind {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Rides => ScenarioKind::Rides,
            Layout::Targets => ScenarioKind::Targets,
        }
    }
}

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error("failed to start a worker thread: {0}")]
    Thread(#[from] io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("`{0}` requires the `{1}` feature")]
    FeatureDisabled(&'static str, &'static str),
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), DemoError> {
    let config = load_config(&args)?;
    let params = ScenarioParams::for_kind(args.scenario.into())
        .with_seed(args.seed)
        .with_config(config);
    let mut fleet = build_fleet(&params)?;
    let poller = start_poller(&fleet.config().decision)?;
    let input = spawn_stdin_reader()?;

    info!(
        vehicles = fleet.vehicle_ids().len(),
        speed_kmh = fleet.config().speed_kmh,
        running = fleet.clock().is_running(),
        "fleet ready; type `help` for commands"
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let status_every = (args.status_every > 0).then(|| Duration::from_secs(args.status_every));
    let deadline = args.run_for.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_status = Instant::now();
    let mut input_open = true;

    'run: loop {
        while input_open {
            match input.try_recv() {
                Ok(line) => {
                    if !handle_line(&mut fleet, &line) {
                        break 'run;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("stdin closed");
                    input_open = false;
                }
            }
        }

        if let Some(poller) = &poller {
            for directive in poller.drain() {
                match fleet.apply_directive(directive) {
                    Ok(outcome) => debug!(?outcome, "directive applied"),
                    Err(err) => warn!(%err, "directive failed"),
                }
            }
        }

        fleet.tick(Instant::now());

        if let Some(poller) = &poller {
            if let Some(report) = fleet.decision_request() {
                poller.publish(report);
            }
        }

        let now = Instant::now();
        if status_every.is_some_and(|every| now.duration_since(last_status) >= every) {
            print_snapshot(&fleet)?;
            last_status = now;
        }
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
        thread::sleep(tick);
    }

    if let Some(poller) = poller {
        poller.cancel();
        let exit = poller.join();
        info!(?exit, "decision poller stopped");
    }
    print_snapshot(&fleet)
}

fn load_config(args: &Args) -> Result<SimulationConfig, DemoError> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(speed_kmh) = args.speed {
        config = config.with_speed_kmh(speed_kmh);
    }
    if let Some(time_scale) = args.time_scale {
        config = config.with_time_scale(time_scale);
    }
    config = config.with_start_running(!args.paused);
    if let Some(endpoint) = &args.osrm {
        config = use_osrm(config, endpoint.clone())?;
    }
    if let Some(endpoint) = &args.decision {
        config.decision.endpoint = Some(endpoint.clone());
    }
    Ok(config)
}

#[cfg(feature = "osrm")]
fn use_osrm(config: SimulationConfig, endpoint: String) -> Result<SimulationConfig, DemoError> {
    use fleet_core::routing::RouteProviderKind;

    Ok(config.with_route_provider(RouteProviderKind::Osrm { endpoint }))
}

#[cfg(not(feature = "osrm"))]
fn use_osrm(_config: SimulationConfig, _endpoint: String) -> Result<SimulationConfig, DemoError> {
    Err(DemoError::FeatureDisabled("--osrm", "osrm"))
}

#[cfg(feature = "decision-http")]
fn start_poller(config: &DecisionConfig) -> Result<Option<DecisionPoller>, DemoError> {
    use fleet_core::decision::HttpDecisionProvider;

    let Some(endpoint) = config.endpoint.as_deref() else {
        return Ok(None);
    };
    let provider = HttpDecisionProvider::new(endpoint, config)?;
    info!(endpoint, "polling decision service");
    Ok(Some(DecisionPoller::spawn(Box::new(provider), config)?))
}

#[cfg(not(feature = "decision-http"))]
fn start_poller(config: &DecisionConfig) -> Result<Option<DecisionPoller>, DemoError> {
    match config.endpoint {
        Some(_) => Err(DemoError::FeatureDisabled("--decision", "decision-http")),
        None => Ok(None),
    }
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Parse and run one operator line. Returns `false` on `quit`.
fn handle_line(fleet: &mut Fleet, line: &str) -> bool {
    match parse_line(line) {
        Ok(Some(Command::Quit)) => false,
        Ok(Some(command)) => {
            if let Err(err) = execute(fleet, command) {
                println!("! {err}");
            }
            true
        }
        Ok(None) => true,
        Err(err) => {
            println!("! {err}");
            true
        }
    }
}

fn execute(fleet: &mut Fleet, command: Command) -> Result<(), FleetError> {
    match command {
        Command::AddVehicle(position) => {
            let id = fleet.add_vehicle(position);
            println!("added {id} at {position}");
        }
        Command::AddTarget(position) => {
            let id = fleet.add_target(position);
            println!("added {id} at {position}");
        }
        Command::Ride { pickup, dropoff } => {
            println!("{:?}", fleet.request_ride(pickup, dropoff)?);
        }
        Command::RandomRide => println!("{:?}", fleet.random_request()?),
        Command::Dispatch(target) => println!("{:?}", fleet.dispatch_to_target(target)?),
        Command::Speed(speed_kmh) => println!("speed {} km/h", fleet.set_speed(speed_kmh)),
        Command::Scale(time_scale) => println!("time scale {}", fleet.set_time_scale(time_scale)),
        Command::Start => fleet.start(),
        Command::Pause => fleet.pause(),
        Command::Reset => fleet.reset(),
        Command::Status => {
            if let Err(err) = print_snapshot(fleet) {
                warn!(%err, "status unavailable");
            }
        }
        Command::Events => {
            for record in fleet.events() {
                println!("[{:>9.1} s] {}", record.sim_time_secs, record.event);
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn print_snapshot(fleet: &Fleet) -> Result<(), DemoError> {
    println!("{}", serde_json::to_string(&fleet.snapshot())?);
    Ok(())
}
