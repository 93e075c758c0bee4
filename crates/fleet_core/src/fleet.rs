//! The fleet: one ECS world holding vehicles, targets, rides and every resource the
//! engine needs, plus the operator API and the tick driver.
//!
//! `Fleet` is the single mutator of that world. Operator commands, decision directives
//! and ticks all go through `&mut Fleet`, one at a time.

use std::time::Instant;

use bevy_ecs::prelude::{Schedule, World};

use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::decision::{self, DecisionRequest, Directive, DirectiveOutcome};
use crate::ecs::{FleetIndex, RideId, RideRequest, Target, TargetId, VehicleId};
use crate::error::{FleetError, RoutingError};
use crate::geo::{GeoBounds, GeoPoint};
use crate::matching::DispatchStats;
use crate::orchestrator::{self, LegBook, RequestOutcome, RequestSampler, RideOutcome};
use crate::routing::{build_route_provider, RouteProvider, RouteProviderResource};
use crate::runner::{self, fleet_schedule, TickReport};
use crate::systems::movement::ArrivalQueue;
use crate::telemetry::{capture_snapshot, record_event, EventLog, EventRecord, FleetEvent, FleetSnapshot};
use crate::vehicle::Vehicle;

pub struct Fleet {
    world: World,
    schedule: Schedule,
}

impl Fleet {
    /// Fleet with the route provider described by `config.routing`.
    pub fn new(config: SimulationConfig) -> Result<Self, RoutingError> {
        let provider = build_route_provider(&config.routing)?;
        Ok(Self::with_route_provider(config, provider))
    }

    pub fn with_route_provider(config: SimulationConfig, provider: Box<dyn RouteProvider>) -> Self {
        let mut world = World::new();
        world.insert_resource(SimulationClock::new(config.start_running, config.time_scale));
        world.insert_resource(EventLog::with_capacity(config.event_log_capacity));
        world.insert_resource(FleetIndex::default());
        world.insert_resource(LegBook::default());
        world.insert_resource(ArrivalQueue::default());
        world.insert_resource(DispatchStats::default());
        world.insert_resource(RequestSampler::new(GeoBounds::default(), 0));
        world.insert_resource(RouteProviderResource(provider));
        let speed_kmh = config.speed_kmh;
        world.insert_resource(config.with_speed_kmh(speed_kmh));

        Self {
            world,
            schedule: fleet_schedule(),
        }
    }

    // -- Operator API -------------------------------------------------------

    pub fn add_vehicle(&mut self, position: GeoPoint) -> VehicleId {
        let speed_kmh = self.config().speed_kmh;
        let id = self.world.resource_mut::<FleetIndex>().next_vehicle_id();
        let entity = self.world.spawn(Vehicle::new(id, position, speed_kmh)).id();
        self.world.resource_mut::<FleetIndex>().vehicles.insert(id, entity);
        record_event(&mut self.world, FleetEvent::VehicleAdded { vehicle: id, position });
        id
    }

    pub fn add_target(&mut self, position: GeoPoint) -> TargetId {
        let id = self.world.resource_mut::<FleetIndex>().next_target_id();
        let entity = self.world.spawn(Target::new(id, position)).id();
        self.world.resource_mut::<FleetIndex>().targets.insert(id, entity);
        record_event(&mut self.world, FleetEvent::TargetAdded { target: id, position });
        id
    }

    pub fn request_ride(&mut self, pickup: GeoPoint, dropoff: GeoPoint) -> Result<RideOutcome, FleetError> {
        orchestrator::handle_ride_request(&mut self.world, pickup, dropoff)
    }

    /// Ride between two random points of the service area.
    pub fn random_request(&mut self) -> Result<RideOutcome, FleetError> {
        orchestrator::random_ride_request(&mut self.world)
    }

    /// Replace the area and seed used by [`Self::random_request`].
    pub fn set_request_area(&mut self, bounds: GeoBounds, seed: u64) {
        self.world.insert_resource(RequestSampler::new(bounds, seed));
    }

    /// Send the controlled vehicle (lowest id) to `target`, or to the nearest pending one.
    pub fn dispatch_to_target(&mut self, target: Option<TargetId>) -> Result<RequestOutcome, FleetError> {
        let vehicle = self.controlled_vehicle().ok_or(FleetError::NoVehicles)?;
        orchestrator::handle_target_request(&mut self.world, vehicle, target)
    }

    pub fn apply_directive(&mut self, directive: Directive) -> Result<DirectiveOutcome, FleetError> {
        decision::apply_directive(&mut self.world, directive)
    }

    /// Status report for the decision service.
    pub fn decision_request(&self) -> Option<DecisionRequest> {
        decision::decision_request(&self.world)
    }

    /// Set the fleet-wide speed; unusable input falls back to the default. Returns the
    /// speed applied.
    pub fn set_speed(&mut self, speed_kmh: f64) -> f64 {
        let speed_kmh = SimulationConfig::sanitize_speed(speed_kmh);
        self.world.resource_mut::<SimulationConfig>().speed_kmh = speed_kmh;
        let mut vehicles = self.world.query::<&mut Vehicle>();
        for mut vehicle in vehicles.iter_mut(&mut self.world) {
            vehicle.set_speed_kmh(speed_kmh);
        }
        record_event(&mut self.world, FleetEvent::SpeedChanged { speed_kmh });
        speed_kmh
    }

    /// Returns the scale applied.
    pub fn set_time_scale(&mut self, time_scale: f64) -> f64 {
        let time_scale = self.world.resource_mut::<SimulationClock>().set_time_scale(time_scale);
        record_event(&mut self.world, FleetEvent::TimeScaleChanged { time_scale });
        time_scale
    }

    pub fn start(&mut self) {
        self.world.resource_mut::<SimulationClock>().start();
        record_event(&mut self.world, FleetEvent::ClockStarted);
    }

    pub fn pause(&mut self) {
        self.world.resource_mut::<SimulationClock>().pause();
        record_event(&mut self.world, FleetEvent::ClockPaused);
    }

    /// Remove every vehicle, target and ride and restart simulated time at zero.
    /// Speed, time scale and the running state are kept.
    pub fn reset(&mut self) {
        let entities: Vec<_> = {
            let index = self.world.resource::<FleetIndex>();
            index
                .vehicles
                .values()
                .chain(index.targets.values())
                .chain(index.rides.values())
                .copied()
                .collect()
        };
        for entity in entities {
            self.world.despawn(entity);
        }

        self.world.insert_resource(FleetIndex::default());
        self.world.resource_mut::<LegBook>().clear();
        self.world.insert_resource(ArrivalQueue::default());
        self.world.insert_resource(DispatchStats::default());
        self.world.resource_mut::<EventLog>().clear();

        {
            let mut clock = self.world.resource_mut::<SimulationClock>();
            let (running, time_scale) = (clock.is_running(), clock.time_scale());
            clock.reset(running, time_scale);
        }

        record_event(&mut self.world, FleetEvent::FleetReset);
    }

    // -- Tick driver --------------------------------------------------------

    /// Real-time tick: advance by the wall-clock time since the previous tick, scaled.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let dt_secs = self.world.resource_mut::<SimulationClock>().advance(now);
        runner::run_tick(&mut self.world, &mut self.schedule, dt_secs)
    }

    /// Fixed-step tick, independent of the wall clock and of the running flag.
    pub fn step_by(&mut self, dt_secs: f64) -> TickReport {
        let report = runner::run_tick(&mut self.world, &mut self.schedule, dt_secs);
        self.world
            .resource_mut::<SimulationClock>()
            .record_manual_step(report.dt_secs);
        report
    }

    /// Fixed-step ticks until every vehicle is idle or `max_steps` ran.
    pub fn run_until_idle(&mut self, dt_secs: f64, max_steps: usize) -> usize {
        runner::run_until_idle(&mut self.world, &mut self.schedule, dt_secs, max_steps)
    }

    // -- Read access --------------------------------------------------------

    pub fn snapshot(&self) -> FleetSnapshot {
        capture_snapshot(&self.world)
    }

    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.world.resource::<EventLog>().records()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        let entity = self.world.resource::<FleetIndex>().vehicle(id)?;
        self.world.get::<Vehicle>(entity)
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        let entity = self.world.resource::<FleetIndex>().target(id)?;
        self.world.get::<Target>(entity)
    }

    pub fn ride(&self, id: RideId) -> Option<&RideRequest> {
        let entity = self.world.resource::<FleetIndex>().ride(id)?;
        self.world.get::<RideRequest>(entity)
    }

    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.world.resource::<FleetIndex>().vehicles.keys().copied().collect()
    }

    pub fn controlled_vehicle(&self) -> Option<VehicleId> {
        self.world.resource::<FleetIndex>().first_vehicle()
    }

    pub fn queued_requests(&self) -> u64 {
        self.world.resource::<DispatchStats>().queued_requests
    }

    pub fn config(&self) -> &SimulationConfig {
        self.world.resource::<SimulationConfig>()
    }

    pub fn clock(&self) -> &SimulationClock {
        self.world.resource::<SimulationClock>()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{RideStatus, TargetStatus};
    use crate::vehicle::VehicleStatus;

    fn fleet() -> Fleet {
        Fleet::new(SimulationConfig::default()).expect("fleet")
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(35.0120, 135.7680)
    }

    #[test]
    fn vehicles_get_sequential_ids_and_fleet_speed() {
        let mut fleet = fleet();
        let a = fleet.add_vehicle(origin());
        let b = fleet.add_vehicle(GeoPoint::new(35.0170, 135.7650));
        assert_eq!((a, b), (VehicleId(1), VehicleId(2)));
        assert_eq!(fleet.vehicle(b).expect("vehicle").speed_kmh(), 40.0);
        assert_eq!(fleet.controlled_vehicle(), Some(a));
    }

    #[test]
    fn set_speed_applies_to_every_vehicle_and_sanitizes() {
        let mut fleet = fleet();
        let a = fleet.add_vehicle(origin());
        let b = fleet.add_vehicle(origin());
        assert_eq!(fleet.set_speed(60.0), 60.0);
        assert_eq!(fleet.vehicle(a).expect("a").speed_kmh(), 60.0);
        assert_eq!(fleet.vehicle(b).expect("b").speed_kmh(), 60.0);
        assert_eq!(fleet.set_speed(f64::NAN), 40.0);
        assert_eq!(fleet.config().speed_kmh, 40.0);
    }

    #[test]
    fn paused_fleet_does_not_move_in_real_time() {
        let mut fleet = fleet();
        let vehicle = fleet.add_vehicle(origin());
        fleet.add_target(GeoPoint::new(35.0130, 135.7680));
        fleet.dispatch_to_target(None).expect("dispatch");

        let start = Instant::now();
        fleet.tick(start);
        let report = fleet.tick(start + std::time::Duration::from_secs(30));
        assert_eq!(report.dt_secs, 0.0);
        assert_eq!(fleet.vehicle(vehicle).expect("vehicle").position(), origin());
    }

    #[test]
    fn paused_fleet_does_not_complete_a_zero_length_leg() {
        let mut fleet = fleet();
        fleet.pause();
        let vehicle = fleet.add_vehicle(origin());
        let target = fleet.add_target(origin());
        fleet.dispatch_to_target(Some(target)).expect("dispatch");

        let start = Instant::now();
        for offset in [0, 30] {
            let report = fleet.tick(start + std::time::Duration::from_secs(offset));
            assert_eq!(report.dt_secs, 0.0);
            assert_eq!(report.arrivals, 0);
        }
        assert_eq!(fleet.target(target).expect("target").status, TargetStatus::Pending);
        assert_eq!(fleet.vehicle(vehicle).expect("vehicle").status(), VehicleStatus::EnRoute);

        fleet.step_by(0.1);
        assert_eq!(fleet.target(target).expect("target").status, TargetStatus::Picked);
        assert!(fleet.vehicle(vehicle).expect("vehicle").is_idle());
    }

    #[test]
    fn dispatch_without_vehicles_is_an_error() {
        let mut fleet = fleet();
        assert!(matches!(fleet.dispatch_to_target(None), Err(FleetError::NoVehicles)));
    }

    #[test]
    fn reset_clears_everything_but_keeps_settings() {
        let mut fleet = fleet();
        fleet.add_vehicle(origin());
        fleet.add_target(GeoPoint::new(35.0130, 135.7680));
        fleet.request_ride(origin(), GeoPoint::new(35.0140, 135.7680)).expect("ride");
        fleet.set_time_scale(5.0);
        fleet.step_by(3.0);

        fleet.reset();

        let snapshot = fleet.snapshot();
        assert!(snapshot.vehicles.is_empty());
        assert!(snapshot.targets.is_empty());
        assert!(snapshot.rides.is_empty());
        assert_eq!(snapshot.elapsed_secs, 0.0);
        assert_eq!(snapshot.time_scale, 5.0);
        assert_eq!(fleet.add_vehicle(origin()), VehicleId(1));
        assert_eq!(fleet.world().resource::<LegBook>().active_legs(), 0);
    }

    #[test]
    fn target_flow_end_to_end() {
        let mut fleet = fleet();
        let vehicle = fleet.add_vehicle(origin());
        let target = fleet.add_target(GeoPoint::new(35.0130, 135.7680));

        let outcome = fleet.dispatch_to_target(None).expect("dispatch");
        assert!(matches!(outcome, RequestOutcome::Dispatched { target: t, .. } if t == target));
        assert_eq!(fleet.vehicle(vehicle).expect("vehicle").status(), VehicleStatus::EnRoute);

        fleet.run_until_idle(1.0, 1_000);
        assert_eq!(fleet.target(target).expect("target").status, TargetStatus::Picked);
        assert_eq!(fleet.snapshot().counts.targets_picked, 1);
    }

    #[test]
    fn ride_flow_end_to_end() {
        let mut fleet = fleet();
        let near = fleet.add_vehicle(GeoPoint::new(35.0121, 135.7680));
        let far = fleet.add_vehicle(GeoPoint::new(35.0300, 135.7900));
        let dropoff = GeoPoint::new(35.0140, 135.7680);

        let outcome = fleet.request_ride(origin(), dropoff).expect("ride");
        let RideOutcome::Assigned { ride, vehicle, .. } = outcome else {
            panic!("ride was not assigned: {outcome:?}");
        };
        assert_eq!(vehicle, near);
        assert_eq!(fleet.ride(ride).expect("ride").status, RideStatus::ToPickup);

        fleet.run_until_idle(1.0, 10_000);
        assert_eq!(fleet.ride(ride).expect("ride").status, RideStatus::Completed);
        assert_eq!(fleet.vehicle(near).expect("near").position(), dropoff);
        assert!(fleet.vehicle(far).expect("far").is_idle());
    }
}
