mod support;

use std::time::{Duration, Instant};

use fleet_core::config::SimulationConfig;
use fleet_core::geo::{distance_m, GeoPoint};
use fleet_core::test_helpers::{fleet_with_scripted_routes, kyoto_origin, ScriptedRouteProvider};
use fleet_core::vehicle::VehicleStatus;

use support::straight_line_fleet;

#[test]
fn running_fleet_moves_by_scaled_wall_time() {
    let mut fleet = straight_line_fleet();
    let vehicle = fleet.add_vehicle(kyoto_origin());
    fleet.add_target(GeoPoint::new(35.0220, 135.7680));
    fleet.dispatch_to_target(None).expect("dispatch");

    fleet.start();
    assert_eq!(fleet.set_time_scale(10.0), 10.0);
    let t0 = Instant::now();
    fleet.tick(t0);
    let report = fleet.tick(t0 + Duration::from_secs(1));

    assert!((report.dt_secs - 10.0).abs() < 1e-9);
    // 40 km/h for 10 simulated seconds.
    let travelled = distance_m(kyoto_origin(), fleet.vehicle(vehicle).expect("vehicle").position());
    assert!((travelled - 111.111).abs() < 0.01, "travelled {travelled}");
    assert!((fleet.clock().elapsed_secs() - 10.0).abs() < 1e-9);
}

#[test]
fn pausing_freezes_vehicles_without_a_catch_up_jump() {
    let mut fleet = straight_line_fleet();
    let vehicle = fleet.add_vehicle(kyoto_origin());
    fleet.add_target(GeoPoint::new(35.0220, 135.7680));
    fleet.dispatch_to_target(None).expect("dispatch");
    fleet.start();

    let t0 = Instant::now();
    fleet.tick(t0);
    fleet.tick(t0 + Duration::from_secs(2));
    let before = fleet.vehicle(vehicle).expect("vehicle").position();

    fleet.pause();
    fleet.tick(t0 + Duration::from_secs(60));
    assert_eq!(fleet.vehicle(vehicle).expect("vehicle").position(), before);

    fleet.start();
    let report = fleet.tick(t0 + Duration::from_secs(61));
    assert!((report.dt_secs - 1.0).abs() < 1e-9);
}

#[test]
fn concrete_north_leg_at_36_kmh() {
    let config = SimulationConfig::default().with_speed_kmh(36.0);
    let (mut fleet, _) = fleet_with_scripted_routes(config, ScriptedRouteProvider::new());
    let start = GeoPoint::new(35.0120, 135.7680);
    let end = GeoPoint::new(35.0130, 135.7680);
    let vehicle = fleet.add_vehicle(start);
    let target = fleet.add_target(end);
    fleet.dispatch_to_target(Some(target)).expect("dispatch");

    let report = fleet.step_by(5.0);
    assert_eq!(report.arrivals, 0);
    assert_eq!(fleet.vehicle(vehicle).expect("vehicle").status(), VehicleStatus::EnRoute);

    let report = fleet.step_by(6.2);
    assert_eq!(report.arrivals, 1);
    let vehicle = fleet.vehicle(vehicle).expect("vehicle");
    assert_eq!(vehicle.status(), VehicleStatus::Idle);
    assert_eq!(vehicle.position(), end);

    assert_eq!(fleet.step_by(10.0).arrivals, 0);
}

#[test]
fn speed_change_applies_from_the_next_tick() {
    let mut fleet = straight_line_fleet();
    let vehicle = fleet.add_vehicle(kyoto_origin());
    fleet.add_target(GeoPoint::new(35.0220, 135.7680));
    fleet.dispatch_to_target(None).expect("dispatch");

    fleet.step_by(10.0);
    let after_first = fleet.vehicle(vehicle).expect("vehicle").odometer_m();
    fleet.set_speed(80.0);
    fleet.step_by(10.0);
    let after_second = fleet.vehicle(vehicle).expect("vehicle").odometer_m();

    assert!((after_first - 111.111).abs() < 0.01);
    assert!((after_second - after_first - 222.222).abs() < 0.01);
}
