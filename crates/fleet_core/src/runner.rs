//! Tick runner: inserts the tick's time delta, runs the schedule, then resolves arrivals.
//!
//! Arrival hooks are resolved outside the schedule, once every vehicle has been stepped,
//! so a hook that starts a new route never affects the tick that produced it.

use bevy_ecs::prelude::{Schedule, World};

use crate::clock::SimulationClock;
use crate::ecs::FleetIndex;
use crate::orchestrator::resolve_arrivals;
use crate::systems::movement::{movement_system, ArrivalQueue, TickDelta};
use crate::vehicle::Vehicle;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    pub dt_secs: f64,
    pub arrivals: usize,
}

pub fn fleet_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(movement_system);
    schedule
}

/// Advance every vehicle by `dt_secs` and resolve the resulting arrivals.
///
/// A zero (or unusable) delta moves nothing and skips the schedule; arrivals already
/// queued are still resolved.
pub fn run_tick(world: &mut World, schedule: &mut Schedule, dt_secs: f64) -> TickReport {
    let dt_secs = if dt_secs.is_finite() && dt_secs > 0.0 {
        dt_secs
    } else {
        0.0
    };
    world.insert_resource(TickDelta(dt_secs));
    if !world.contains_resource::<ArrivalQueue>() {
        world.insert_resource(ArrivalQueue::default());
    }

    if dt_secs > 0.0 {
        schedule.run(world);
    }
    let arrivals = resolve_arrivals(world);

    TickReport { dt_secs, arrivals }
}

/// Run fixed-size ticks until no vehicle is en route or `max_steps` is reached.
///
/// Simulated time is credited to the clock, which must not be running from the wall
/// clock at the same time. Returns the number of ticks executed.
pub fn run_until_idle(world: &mut World, schedule: &mut Schedule, dt_secs: f64, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && any_vehicle_en_route(world) {
        let report = run_tick(world, schedule, dt_secs);
        if let Some(mut clock) = world.get_resource_mut::<SimulationClock>() {
            clock.record_manual_step(report.dt_secs);
        }
        steps += 1;
    }
    steps
}

pub fn any_vehicle_en_route(world: &World) -> bool {
    let Some(index) = world.get_resource::<FleetIndex>() else {
        return false;
    };
    index
        .vehicles
        .values()
        .filter_map(|entity| world.get::<Vehicle>(*entity))
        .any(|vehicle| !vehicle.is_idle())
}
