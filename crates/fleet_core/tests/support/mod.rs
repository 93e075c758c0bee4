#![allow(dead_code)]

use fleet_core::config::SimulationConfig;
use fleet_core::fleet::Fleet;
use fleet_core::geo::GeoPoint;
use fleet_core::routing::StraightLineRouteProvider;
use fleet_core::telemetry::FleetEvent;
use fleet_core::test_helpers::{fleet_with_scripted_routes, RouteCalls, ScriptedRouteProvider};

/// Fixed tick used by fixed-step tests, in simulated seconds.
pub const TICK_SECS: f64 = 0.5;

/// Enough fixed ticks for any leg in the Kyoto test area.
pub const MAX_TICKS: usize = 100_000;

/// Fleet routing along densified straight lines.
pub fn straight_line_fleet() -> Fleet {
    Fleet::with_route_provider(
        SimulationConfig::default(),
        Box::new(StraightLineRouteProvider::default()),
    )
}

/// Fleet whose routes are `[from, to]`, with the call log of the provider.
pub fn scripted_fleet(provider: ScriptedRouteProvider) -> (Fleet, RouteCalls) {
    fleet_with_scripted_routes(SimulationConfig::default(), provider)
}

pub fn drive_until_idle(fleet: &mut Fleet) -> usize {
    let ticks = fleet.run_until_idle(TICK_SECS, MAX_TICKS);
    assert!(ticks < MAX_TICKS, "fleet never became idle");
    ticks
}

/// Journal entries matching `pred`.
pub fn events_matching(fleet: &Fleet, pred: impl Fn(&FleetEvent) -> bool) -> Vec<FleetEvent> {
    fleet
        .events()
        .map(|record| record.event.clone())
        .filter(|event| pred(event))
        .collect()
}

pub fn assert_at(actual: GeoPoint, expected: GeoPoint) {
    let off = fleet_core::geo::distance_m(actual, expected);
    assert!(off < 1e-6, "{actual} is {off} m away from {expected}");
}
