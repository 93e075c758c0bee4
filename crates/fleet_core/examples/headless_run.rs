//! Run the Kyoto ride scenario headless at a fixed tick and print what happened.
//!
//! Run with: cargo run -p fleet_core --example headless_run

use fleet_core::ecs::RideStatus;
use fleet_core::routing::StraightLineRouteProvider;
use fleet_core::scenario::{build_fleet_with_provider, ScenarioParams};
use tracing_subscriber::EnvFilter;

fn main() {
    const REQUESTS: usize = 10;
    const TICK_SECS: f64 = 1.0;
    const MAX_TICKS: usize = 100_000;

    // Operator events at `info`; set RUST_LOG=warn to see only failures.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let params = ScenarioParams::rides().with_seed(123);
    let mut fleet = build_fleet_with_provider(&params, Box::new(StraightLineRouteProvider::default()));

    let mut ticks = 0;
    for _ in 0..REQUESTS {
        if let Err(err) = fleet.random_request() {
            eprintln!("request failed: {err}");
        }
        // Let the fleet free up between requests so most of them find a vehicle.
        ticks += fleet.run_until_idle(TICK_SECS, MAX_TICKS / REQUESTS);
    }

    let snapshot = fleet.snapshot();
    println!("--- Headless ride run ({REQUESTS} requests, {} vehicles, seed 123) ---", snapshot.vehicles.len());
    println!("Ticks executed: {ticks}");
    println!(
        "Simulated time: {:.0} s ({:.1} min)",
        snapshot.elapsed_secs,
        snapshot.elapsed_secs / 60.0
    );
    println!("Rides completed: {}", snapshot.counts.rides_completed);
    println!("Requests queued: {}", snapshot.queued_requests);
    for ride in snapshot.rides.iter().filter(|ride| ride.status == RideStatus::Completed) {
        let vehicle = ride
            .vehicle
            .map(|vehicle| vehicle.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  Ride #{}: {} -> {} by {}", ride.id.0, ride.pickup, ride.dropoff, vehicle);
    }
    for vehicle in &snapshot.vehicles {
        println!("  {}: {:.0} m driven", vehicle.id, vehicle.odometer_m);
    }
}
