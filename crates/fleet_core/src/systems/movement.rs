//! Movement system: advances every vehicle once per tick along its route.
//!
//! Vehicles are stepped in ascending id order. Arrivals are not acted on here; they are
//! queued in [`ArrivalQueue`] and resolved by the orchestrator after the schedule has
//! returned, so any route started from an arrival begins consuming time on the next tick.

use std::collections::VecDeque;

use bevy_ecs::prelude::{Query, Res, ResMut, Resource};

use crate::ecs::{FleetIndex, VehicleId};
use crate::geo::GeoPoint;
use crate::vehicle::{ArrivalHook, StepOutcome, Vehicle};

/// Simulated seconds to advance during the current tick.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct TickDelta(pub f64);

/// A vehicle reached the end of its route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub vehicle: VehicleId,
    pub position: GeoPoint,
    pub hook: Option<ArrivalHook>,
}

/// Arrivals waiting to be resolved, in the order they happened.
#[derive(Debug, Default, Resource)]
pub struct ArrivalQueue(pub VecDeque<Arrival>);

pub fn movement_system(
    delta: Res<TickDelta>,
    index: Res<FleetIndex>,
    mut vehicles: Query<&mut Vehicle>,
    mut arrivals: ResMut<ArrivalQueue>,
) {
    for entity in index.vehicles.values() {
        let Ok(mut vehicle) = vehicles.get_mut(*entity) else {
            continue;
        };
        if let StepOutcome::Arrived(hook) = vehicle.step(delta.0) {
            arrivals.0.push_back(Arrival {
                vehicle: vehicle.id,
                position: vehicle.position(),
                hook,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{Schedule, World};

    fn spawn_vehicle(world: &mut World, position: GeoPoint) -> VehicleId {
        let id = world.resource_mut::<FleetIndex>().next_vehicle_id();
        let entity = world.spawn(Vehicle::new(id, position, 36.0)).id();
        world.resource_mut::<FleetIndex>().vehicles.insert(id, entity);
        id
    }

    #[test]
    fn arrivals_are_queued_in_vehicle_id_order() {
        let mut world = World::new();
        world.insert_resource(FleetIndex::default());
        world.insert_resource(ArrivalQueue::default());
        world.insert_resource(TickDelta(60.0));

        let a = GeoPoint::new(35.0120, 135.7680);
        let b = GeoPoint::new(35.0130, 135.7680);
        let first = spawn_vehicle(&mut world, a);
        let second = spawn_vehicle(&mut world, a);
        let idle = spawn_vehicle(&mut world, b);

        let index = world.resource::<FleetIndex>();
        let (e1, e2) = (
            index.vehicle(first).expect("first"),
            index.vehicle(second).expect("second"),
        );
        world
            .get_mut::<Vehicle>(e2)
            .expect("vehicle")
            .assign_route(vec![a, b], Some(ArrivalHook(2)), 1.0);
        world
            .get_mut::<Vehicle>(e1)
            .expect("vehicle")
            .assign_route(vec![a, b], Some(ArrivalHook(1)), 1.0);

        let mut schedule = Schedule::default();
        schedule.add_systems(movement_system);
        schedule.run(&mut world);

        let queued: Vec<_> = world.resource::<ArrivalQueue>().0.iter().copied().collect();
        assert_eq!(
            queued,
            vec![
                Arrival {
                    vehicle: first,
                    position: b,
                    hook: Some(ArrivalHook(1)),
                },
                Arrival {
                    vehicle: second,
                    position: b,
                    hook: Some(ArrivalHook(2)),
                },
            ]
        );
        assert!(queued.iter().all(|arrival| arrival.vehicle != idle));
    }
}
