use std::collections::BTreeMap;
use std::fmt;

use bevy_ecs::prelude::{Component, Entity, Resource};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Car #{}", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point #{}", self.0)
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ride #{}", self.0)
    }
}

/// Target lifecycle. Serialized with the names the decision service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    #[serde(rename = "initial")]
    Pending,
    #[serde(rename = "picked")]
    Picked,
}

#[derive(Debug, Clone, Copy, PartialEq, Component, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub position: GeoPoint,
    pub status: TargetStatus,
}

impl Target {
    pub fn new(id: TargetId, position: GeoPoint) -> Self {
        Self {
            id,
            position,
            status: TargetStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TargetStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// No idle vehicle was available when the request arrived.
    Queued,
    ToPickup,
    ToDropoff,
    Completed,
    /// A routing request for one of the legs failed.
    Failed,
    /// The serving vehicle was reassigned before the ride finished.
    Abandoned,
}

/// Pickup/drop request of the ride variant.
#[derive(Debug, Clone, Copy, PartialEq, Component, Serialize)]
pub struct RideRequest {
    pub id: RideId,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub status: RideStatus,
    pub vehicle: Option<VehicleId>,
}

/// Id → entity lookup for everything living in the fleet world.
///
/// `BTreeMap` keeps iteration in ascending id order, which is the fixed order vehicles
/// are stepped in and the tie-break order of nearest-candidate queries.
#[derive(Debug, Default, Resource)]
pub struct FleetIndex {
    pub vehicles: BTreeMap<VehicleId, Entity>,
    pub targets: BTreeMap<TargetId, Entity>,
    pub rides: BTreeMap<RideId, Entity>,
    next_vehicle: u32,
    next_target: u32,
    next_ride: u32,
}

impl FleetIndex {
    pub fn next_vehicle_id(&mut self) -> VehicleId {
        self.next_vehicle += 1;
        VehicleId(self.next_vehicle)
    }

    pub fn next_target_id(&mut self) -> TargetId {
        self.next_target += 1;
        TargetId(self.next_target)
    }

    pub fn next_ride_id(&mut self) -> RideId {
        self.next_ride += 1;
        RideId(self.next_ride)
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<Entity> {
        self.vehicles.get(&id).copied()
    }

    pub fn target(&self, id: TargetId) -> Option<Entity> {
        self.targets.get(&id).copied()
    }

    pub fn ride(&self, id: RideId) -> Option<Entity> {
        self.rides.get(&id).copied()
    }

    /// Lowest vehicle id; the vehicle steered by target dispatch and the decision service.
    pub fn first_vehicle(&self) -> Option<VehicleId> {
        self.vehicles.keys().next().copied()
    }
}
