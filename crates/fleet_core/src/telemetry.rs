//! Telemetry: the operator event journal and render snapshots.
//!
//! Every operator-visible event goes through [`record_event`], which logs it with
//! `tracing` and appends it to the bounded [`EventLog`] resource so a renderer can show
//! the same log the operator sees on the console.

use std::collections::VecDeque;
use std::fmt;

use bevy_ecs::prelude::{Resource, World};
use serde::Serialize;

use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::ecs::{FleetIndex, RideId, RideRequest, RideStatus, Target, TargetId, TargetStatus, VehicleId};
use crate::geo::GeoPoint;
use crate::matching::DispatchStats;
use crate::vehicle::{Vehicle, VehicleStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FleetEvent {
    VehicleAdded { vehicle: VehicleId, position: GeoPoint },
    TargetAdded { target: TargetId, position: GeoPoint },
    RideRequested { ride: RideId, pickup: GeoPoint, dropoff: GeoPoint },
    /// No vehicle (or no pending target) could take the request.
    RequestQueued { ride: Option<RideId> },
    LegStarted { vehicle: VehicleId, destination: GeoPoint, distance_m: f64 },
    TargetReached { vehicle: VehicleId, target: TargetId },
    RidePickedUp { vehicle: VehicleId, ride: RideId },
    RideDelivered { vehicle: VehicleId, ride: RideId },
    RideAbandoned { ride: RideId },
    RideFailed { ride: RideId },
    RoutingFailed { vehicle: VehicleId, message: String },
    DirectiveIgnored { reason: String },
    SpeedChanged { speed_kmh: f64 },
    TimeScaleChanged { time_scale: f64 },
    ClockStarted,
    ClockPaused,
    FleetReset,
}

impl FleetEvent {
    fn is_failure(&self) -> bool {
        matches!(
            self,
            FleetEvent::RoutingFailed { .. } | FleetEvent::RideFailed { .. }
        )
    }
}

impl fmt::Display for FleetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetEvent::VehicleAdded { vehicle, position } => write!(f, "{vehicle} added at {position}"),
            FleetEvent::TargetAdded { target, position } => write!(f, "{target} added at {position}"),
            FleetEvent::RideRequested { ride, pickup, dropoff } => {
                write!(f, "{ride} requested from {pickup} to {dropoff}")
            }
            FleetEvent::RequestQueued { ride: Some(ride) } => write!(f, "{ride} queued: no idle vehicle"),
            FleetEvent::RequestQueued { ride: None } => write!(f, "request queued: nothing to dispatch to"),
            FleetEvent::LegStarted {
                vehicle,
                destination,
                distance_m,
            } => write!(f, "{vehicle} heading to {destination} ({distance_m:.0} m)"),
            FleetEvent::TargetReached { vehicle, target } => write!(f, "{vehicle} reached {target}"),
            FleetEvent::RidePickedUp { vehicle, ride } => write!(f, "{vehicle} picked up {ride}"),
            FleetEvent::RideDelivered { vehicle, ride } => write!(f, "{vehicle} delivered {ride}"),
            FleetEvent::RideAbandoned { ride } => write!(f, "{ride} abandoned: vehicle reassigned"),
            FleetEvent::RideFailed { ride } => write!(f, "{ride} failed"),
            FleetEvent::RoutingFailed { vehicle, message } => {
                write!(f, "routing failed for {vehicle}: {message}")
            }
            FleetEvent::DirectiveIgnored { reason } => write!(f, "directive ignored: {reason}"),
            FleetEvent::SpeedChanged { speed_kmh } => write!(f, "speed set to {speed_kmh} km/h"),
            FleetEvent::TimeScaleChanged { time_scale } => write!(f, "time scale set to {time_scale}x"),
            FleetEvent::ClockStarted => f.write_str("simulation started"),
            FleetEvent::ClockPaused => f.write_str("simulation paused"),
            FleetEvent::FleetReset => f.write_str("fleet reset"),
        }
    }
}

/// One journal entry, stamped with simulated time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub sim_time_secs: f64,
    #[serde(flatten)]
    pub event: FleetEvent,
}

/// Rolling operator journal; oldest entries are dropped once `capacity` is reached.
#[derive(Debug, Resource)]
pub struct EventLog {
    capacity: usize,
    records: VecDeque<EventRecord>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn push(&mut self, record: EventRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Log `event` and append it to the journal (when the world has one).
pub fn record_event(world: &mut World, event: FleetEvent) {
    let sim_time_secs = world
        .get_resource::<SimulationClock>()
        .map(|clock| clock.elapsed_secs())
        .unwrap_or(0.0);

    if event.is_failure() {
        tracing::warn!(sim_time_secs, "{event}");
    } else {
        tracing::info!(sim_time_secs, "{event}");
    }

    if let Some(mut log) = world.get_resource_mut::<EventLog>() {
        log.push(EventRecord { sim_time_secs, event });
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub position: GeoPoint,
    pub status: VehicleStatus,
    pub speed_kmh: f64,
    /// Waypoints still ahead, starting at the current position; empty when idle.
    pub remaining_path: Vec<GeoPoint>,
    pub remaining_distance_m: f64,
    pub odometer_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub position: GeoPoint,
    pub status: TargetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideSnapshot {
    pub id: RideId,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub status: RideStatus,
    pub vehicle: Option<VehicleId>,
}

/// Aggregated counts at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetCounts {
    pub vehicles_idle: usize,
    pub vehicles_en_route: usize,
    pub targets_pending: usize,
    pub targets_picked: usize,
    pub rides_queued: usize,
    pub rides_active: usize,
    pub rides_completed: usize,
    pub rides_failed: usize,
    pub rides_abandoned: usize,
}

impl FleetCounts {
    pub fn add_vehicle(&mut self, status: VehicleStatus) {
        match status {
            VehicleStatus::Idle => self.vehicles_idle += 1,
            VehicleStatus::EnRoute => self.vehicles_en_route += 1,
        }
    }

    pub fn add_target(&mut self, status: TargetStatus) {
        match status {
            TargetStatus::Pending => self.targets_pending += 1,
            TargetStatus::Picked => self.targets_picked += 1,
        }
    }

    pub fn add_ride(&mut self, status: RideStatus) {
        match status {
            RideStatus::Queued => self.rides_queued += 1,
            RideStatus::ToPickup | RideStatus::ToDropoff => self.rides_active += 1,
            RideStatus::Completed => self.rides_completed += 1,
            RideStatus::Failed => self.rides_failed += 1,
            RideStatus::Abandoned => self.rides_abandoned += 1,
        }
    }
}

/// Everything a renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSnapshot {
    pub elapsed_secs: f64,
    pub running: bool,
    pub time_scale: f64,
    pub speed_kmh: f64,
    pub queued_requests: u64,
    pub counts: FleetCounts,
    pub vehicles: Vec<VehicleSnapshot>,
    pub targets: Vec<TargetSnapshot>,
    pub rides: Vec<RideSnapshot>,
}

/// Capture the fleet state; entities are listed in ascending id order.
pub fn capture_snapshot(world: &World) -> FleetSnapshot {
    let mut counts = FleetCounts::default();
    let mut vehicles = Vec::new();
    let mut targets = Vec::new();
    let mut rides = Vec::new();

    if let Some(index) = world.get_resource::<FleetIndex>() {
        for entity in index.vehicles.values() {
            let Some(vehicle) = world.get::<Vehicle>(*entity) else {
                continue;
            };
            counts.add_vehicle(vehicle.status());
            vehicles.push(VehicleSnapshot {
                id: vehicle.id,
                position: vehicle.position(),
                status: vehicle.status(),
                speed_kmh: vehicle.speed_kmh(),
                remaining_path: vehicle.remaining_path(),
                remaining_distance_m: vehicle.remaining_distance_m(),
                odometer_m: vehicle.odometer_m(),
            });
        }
        for entity in index.targets.values() {
            let Some(target) = world.get::<Target>(*entity) else {
                continue;
            };
            counts.add_target(target.status);
            targets.push(TargetSnapshot {
                id: target.id,
                position: target.position,
                status: target.status,
            });
        }
        for entity in index.rides.values() {
            let Some(ride) = world.get::<RideRequest>(*entity) else {
                continue;
            };
            counts.add_ride(ride.status);
            rides.push(RideSnapshot {
                id: ride.id,
                pickup: ride.pickup,
                dropoff: ride.dropoff,
                status: ride.status,
                vehicle: ride.vehicle,
            });
        }
    }

    let clock = world.get_resource::<SimulationClock>();
    FleetSnapshot {
        elapsed_secs: clock.map(|c| c.elapsed_secs()).unwrap_or(0.0),
        running: clock.map(|c| c.is_running()).unwrap_or(false),
        time_scale: clock.map(|c| c.time_scale()).unwrap_or(1.0),
        speed_kmh: world
            .get_resource::<SimulationConfig>()
            .map(|config| config.speed_kmh)
            .unwrap_or(crate::config::DEFAULT_SPEED_KMH),
        queued_requests: world
            .get_resource::<DispatchStats>()
            .map(|stats| stats.queued_requests)
            .unwrap_or(0),
        counts,
        vehicles,
        targets,
        rides,
    }
}
