//! Request orchestration: turns operator requests and arrivals into route legs.
//!
//! A trip is a queue of [`LegPlan`]s. Starting a leg asks the route provider for a
//! path and hands it to the vehicle together with a fresh [`ArrivalHook`]; the
//! [`LegBook`] remembers what that hook means (the leg's effect and the legs still to
//! run). When the movement system reports the arrival, [`resolve_arrivals`] applies the
//! effect and starts the next leg. Everything runs on the tick thread between ticks.

use std::collections::{HashMap, VecDeque};

use bevy_ecs::prelude::{Resource, World};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{SimulationConfig, DEFAULT_SNAP_THRESHOLD_M};
use crate::ecs::{FleetIndex, RideId, RideRequest, RideStatus, Target, TargetId, TargetStatus, VehicleId};
use crate::error::FleetError;
use crate::geo::{distance_m, GeoBounds, GeoPoint};
use crate::matching::{nearest_idle_vehicle, nearest_pending_target, DispatchStats};
use crate::routing::RouteProviderResource;
use crate::systems::movement::{Arrival, ArrivalQueue};
use crate::telemetry::{record_event, FleetEvent};
use crate::vehicle::{ArrivalHook, AssignOutcome, Vehicle};

/// What completing a leg means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegEffect {
    TargetReached(TargetId),
    RidePickedUp(RideId),
    RideDelivered(RideId),
}

impl LegEffect {
    fn ride(self) -> Option<RideId> {
        match self {
            LegEffect::TargetReached(_) => None,
            LegEffect::RidePickedUp(ride) | LegEffect::RideDelivered(ride) => Some(ride),
        }
    }
}

/// One leg of a trip, routed only when it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegPlan {
    /// Route origin; `None` routes from wherever the vehicle is when the leg starts.
    pub from: Option<GeoPoint>,
    pub destination: GeoPoint,
    pub effect: LegEffect,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveLeg {
    vehicle: VehicleId,
    effect: LegEffect,
    pending: VecDeque<LegPlan>,
}

/// Legs currently being driven, keyed by the hook handed to the vehicle.
#[derive(Debug, Default, Resource)]
pub struct LegBook {
    next_ticket: u64,
    active: HashMap<ArrivalHook, ActiveLeg>,
    /// Hook each vehicle is carrying right now.
    installed: HashMap<VehicleId, ArrivalHook>,
}

impl LegBook {
    fn issue(&mut self, vehicle: VehicleId, effect: LegEffect, pending: VecDeque<LegPlan>) -> ArrivalHook {
        self.next_ticket += 1;
        let hook = ArrivalHook(self.next_ticket);
        self.active.insert(
            hook,
            ActiveLeg {
                vehicle,
                effect,
                pending,
            },
        );
        hook
    }

    fn install(&mut self, vehicle: VehicleId, hook: ArrivalHook) {
        self.installed.insert(vehicle, hook);
    }

    fn take(&mut self, hook: ArrivalHook) -> Option<ActiveLeg> {
        let leg = self.active.remove(&hook)?;
        if self.installed.get(&leg.vehicle) == Some(&hook) {
            self.installed.remove(&leg.vehicle);
        }
        Some(leg)
    }

    pub fn active_legs(&self) -> usize {
        self.active.len()
    }

    /// Effect of the leg `vehicle` is currently driving, if it belongs to a trip.
    pub fn effect_for(&self, vehicle: VehicleId) -> Option<LegEffect> {
        let hook = self.installed.get(&vehicle)?;
        self.active.get(hook).map(|leg| leg.effect)
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.installed.clear();
    }
}

/// Seeded sampler for random ride requests.
#[derive(Debug, Resource)]
pub struct RequestSampler {
    bounds: GeoBounds,
    rng: StdRng,
}

impl RequestSampler {
    pub fn new(bounds: GeoBounds, seed: u64) -> Self {
        Self {
            bounds,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Pickup and drop-off, each uniform over the bounds.
    pub fn sample_pair(&mut self) -> (GeoPoint, GeoPoint) {
        let pickup = self.bounds.sample(&mut self.rng);
        let dropoff = self.bounds.sample(&mut self.rng);
        (pickup, dropoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    Dispatched {
        vehicle: VehicleId,
        target: TargetId,
        distance_m: f64,
    },
    /// No pending target left; only the queued counter moved.
    Queued,
    /// The named target was already picked.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RideOutcome {
    Assigned {
        ride: RideId,
        vehicle: VehicleId,
        pickup_distance_m: f64,
    },
    /// No idle vehicle; the ride stays `Queued` and is not retried.
    Queued(RideId),
}

/// Send `vehicle` to `target`, or to the pending target nearest to it when `target` is `None`.
///
/// A busy vehicle is re-routed and its current trip dropped.
pub fn handle_target_request(
    world: &mut World,
    vehicle: VehicleId,
    target: Option<TargetId>,
) -> Result<RequestOutcome, FleetError> {
    let origin = vehicle_position(world, vehicle)?;

    let (target_id, position) = match target {
        Some(id) => {
            let entity = world
                .resource::<FleetIndex>()
                .target(id)
                .ok_or(FleetError::UnknownTarget(id))?;
            let Some(target) = world.get::<Target>(entity).copied() else {
                return Err(FleetError::UnknownTarget(id));
            };
            if !target.is_pending() {
                tracing::debug!(target_id = %id, "target already picked, request ignored");
                return Ok(RequestOutcome::Ignored);
            }
            (id, target.position)
        }
        None => {
            let Some((id, _)) = nearest_pending_target(world, origin) else {
                bump_queued(world);
                record_event(world, FleetEvent::RequestQueued { ride: None });
                return Ok(RequestOutcome::Queued);
            };
            let position = world
                .resource::<FleetIndex>()
                .target(id)
                .and_then(|entity| world.get::<Target>(entity))
                .map(|target| target.position)
                .ok_or(FleetError::UnknownTarget(id))?;
            (id, position)
        }
    };

    let leg = LegPlan {
        from: None,
        destination: position,
        effect: LegEffect::TargetReached(target_id),
    };
    start_trip(world, vehicle, VecDeque::from([leg]))?;
    resolve_arrivals(world);

    Ok(RequestOutcome::Dispatched {
        vehicle,
        target: target_id,
        distance_m: distance_m(origin, position),
    })
}

/// Record a ride and hand it to the idle vehicle nearest to the pickup.
///
/// Leg 1 drives to the pickup; leg 2 is routed from the pickup to the drop-off once
/// leg 1 completes.
pub fn handle_ride_request(
    world: &mut World,
    pickup: GeoPoint,
    dropoff: GeoPoint,
) -> Result<RideOutcome, FleetError> {
    let ride = world.resource_mut::<FleetIndex>().next_ride_id();
    let entity = world
        .spawn(RideRequest {
            id: ride,
            pickup,
            dropoff,
            status: RideStatus::Queued,
            vehicle: None,
        })
        .id();
    world.resource_mut::<FleetIndex>().rides.insert(ride, entity);
    record_event(world, FleetEvent::RideRequested { ride, pickup, dropoff });

    let Some((vehicle, pickup_distance_m)) = nearest_idle_vehicle(world, pickup) else {
        bump_queued(world);
        record_event(world, FleetEvent::RequestQueued { ride: Some(ride) });
        return Ok(RideOutcome::Queued(ride));
    };

    let legs = VecDeque::from([
        LegPlan {
            from: None,
            destination: pickup,
            effect: LegEffect::RidePickedUp(ride),
        },
        LegPlan {
            from: Some(pickup),
            destination: dropoff,
            effect: LegEffect::RideDelivered(ride),
        },
    ]);
    start_trip(world, vehicle, legs)?;
    // Only a ride whose first leg was routed is bound to its vehicle.
    if let Some(mut request) = world.get_mut::<RideRequest>(entity) {
        request.vehicle = Some(vehicle);
    }
    resolve_arrivals(world);

    Ok(RideOutcome::Assigned {
        ride,
        vehicle,
        pickup_distance_m,
    })
}

/// Ride request between two points drawn from the [`RequestSampler`].
pub fn random_ride_request(world: &mut World) -> Result<RideOutcome, FleetError> {
    let (pickup, dropoff) = world
        .get_resource_or_insert_with(|| RequestSampler::new(GeoBounds::default(), 0))
        .sample_pair();
    handle_ride_request(world, pickup, dropoff)
}

/// Fire every queued arrival hook, including those produced while resolving.
///
/// Returns the number of arrivals processed.
pub fn resolve_arrivals(world: &mut World) -> usize {
    let mut processed = 0;
    loop {
        let next = world
            .get_resource_mut::<ArrivalQueue>()
            .and_then(|mut queue| queue.0.pop_front());
        let Some(Arrival { vehicle, hook, .. }) = next else {
            return processed;
        };
        processed += 1;

        let Some(hook) = hook else {
            continue;
        };
        let Some(leg) = world.resource_mut::<LegBook>().take(hook) else {
            tracing::debug!(%vehicle, hook = hook.0, "arrival for a dropped leg");
            continue;
        };

        apply_effect(world, leg.vehicle, leg.effect);

        let mut pending = leg.pending;
        if let Some(next_leg) = pending.pop_front() {
            // Failure is already journaled and the ride marked failed; the vehicle stays idle.
            let _ = start_leg(world, leg.vehicle, next_leg, pending);
        }
    }
}

fn start_trip(world: &mut World, vehicle: VehicleId, mut legs: VecDeque<LegPlan>) -> Result<(), FleetError> {
    match legs.pop_front() {
        Some(first) => start_leg(world, vehicle, first, legs),
        None => Ok(()),
    }
}

fn start_leg(
    world: &mut World,
    vehicle: VehicleId,
    leg: LegPlan,
    pending: VecDeque<LegPlan>,
) -> Result<(), FleetError> {
    let entity = world
        .resource::<FleetIndex>()
        .vehicle(vehicle)
        .ok_or(FleetError::UnknownVehicle(vehicle))?;
    let position = vehicle_position(world, vehicle)?;
    let from = leg.from.unwrap_or(position);

    let route = match world.get_resource::<RouteProviderResource>() {
        Some(provider) => provider.0.route(from, leg.destination),
        None => Err(crate::error::RoutingError::Unavailable(
            "no route provider installed".to_string(),
        )),
    };
    let route = match route {
        Ok(route) => route,
        Err(err) => {
            record_event(
                world,
                FleetEvent::RoutingFailed {
                    vehicle,
                    message: err.to_string(),
                },
            );
            if let Some(ride) = leg.effect.ride() {
                set_ride_status(world, ride, RideStatus::Failed);
                record_event(world, FleetEvent::RideFailed { ride });
            }
            return Err(err.into());
        }
    };

    let snap_threshold_m = world
        .get_resource::<SimulationConfig>()
        .map(|config| config.snap_threshold_m)
        .unwrap_or(DEFAULT_SNAP_THRESHOLD_M);
    let hook = world
        .resource_mut::<LegBook>()
        .issue(vehicle, leg.effect, pending);

    let outcome = match world.get_mut::<Vehicle>(entity) {
        Some(mut vehicle) => vehicle.assign_route(route, Some(hook), snap_threshold_m),
        None => return Err(FleetError::UnknownVehicle(vehicle)),
    };

    match outcome {
        AssignOutcome::Started { superseded } => {
            if let Some(old) = superseded {
                drop_superseded(world, old);
            }
            world.resource_mut::<LegBook>().install(vehicle, hook);
            mark_leg_started(world, leg.effect);
            record_event(
                world,
                FleetEvent::LegStarted {
                    vehicle,
                    destination: leg.destination,
                    distance_m: distance_m(from, leg.destination),
                },
            );
        }
        AssignOutcome::ArrivedImmediately(hook) => {
            mark_leg_started(world, leg.effect);
            let mut queue = world.get_resource_or_insert_with(ArrivalQueue::default);
            queue.0.push_back(Arrival {
                vehicle,
                position,
                hook,
            });
        }
    }
    Ok(())
}

fn drop_superseded(world: &mut World, hook: ArrivalHook) {
    let Some(leg) = world.resource_mut::<LegBook>().take(hook) else {
        return;
    };
    if let Some(ride) = leg.effect.ride() {
        set_ride_status(world, ride, RideStatus::Abandoned);
        record_event(world, FleetEvent::RideAbandoned { ride });
    }
}

fn mark_leg_started(world: &mut World, effect: LegEffect) {
    match effect {
        LegEffect::TargetReached(_) => {}
        LegEffect::RidePickedUp(ride) => set_ride_status(world, ride, RideStatus::ToPickup),
        LegEffect::RideDelivered(ride) => set_ride_status(world, ride, RideStatus::ToDropoff),
    }
}

fn apply_effect(world: &mut World, vehicle: VehicleId, effect: LegEffect) {
    match effect {
        LegEffect::TargetReached(target) => {
            if let Some(entity) = world.resource::<FleetIndex>().target(target) {
                if let Some(mut target) = world.get_mut::<Target>(entity) {
                    target.status = TargetStatus::Picked;
                }
            }
            record_event(world, FleetEvent::TargetReached { vehicle, target });
        }
        LegEffect::RidePickedUp(ride) => {
            record_event(world, FleetEvent::RidePickedUp { vehicle, ride });
        }
        LegEffect::RideDelivered(ride) => {
            set_ride_status(world, ride, RideStatus::Completed);
            record_event(world, FleetEvent::RideDelivered { vehicle, ride });
        }
    }
}

fn set_ride_status(world: &mut World, ride: RideId, status: RideStatus) {
    let Some(entity) = world.resource::<FleetIndex>().ride(ride) else {
        return;
    };
    if let Some(mut request) = world.get_mut::<RideRequest>(entity) {
        request.status = status;
    }
}

fn bump_queued(world: &mut World) {
    world
        .get_resource_or_insert_with(DispatchStats::default)
        .queued_requests += 1;
}

fn vehicle_position(world: &World, vehicle: VehicleId) -> Result<GeoPoint, FleetError> {
    world
        .resource::<FleetIndex>()
        .vehicle(vehicle)
        .and_then(|entity| world.get::<Vehicle>(entity))
        .map(Vehicle::position)
        .ok_or(FleetError::UnknownVehicle(vehicle))
}
