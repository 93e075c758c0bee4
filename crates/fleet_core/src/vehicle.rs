//! Vehicle route execution: a two-state machine (Idle / EnRoute) that consumes a
//! polyline at the vehicle's current speed.
//!
//! A single [`Vehicle::step`] may cross any number of segments, so large time deltas
//! (high time scale) never overshoot the final waypoint. Arrival hands the stored
//! [`ArrivalHook`] back to the caller instead of invoking anything from inside `step`;
//! the tick driver resolves hooks once every vehicle has been advanced.

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use crate::ecs::VehicleId;
use crate::geo::{distance_m, interpolate, GeoPoint};

/// Meters per second for one km/h.
const KMH_TO_MPS: f64 = 1000.0 / 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Idle,
    EnRoute,
}

/// Opaque single-shot ticket returned to the owner of a route when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrivalHook(pub u64);

/// Result of [`Vehicle::assign_route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The route was installed. `superseded` is the hook of the route it replaced;
    /// that hook is dead and must not be fired.
    Started { superseded: Option<ArrivalHook> },
    /// The route had fewer than two points: nothing was installed and the caller must
    /// fire the hook right away.
    ArrivedImmediately(Option<ArrivalHook>),
}

/// Result of [`Vehicle::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Travelling,
    Arrived(Option<ArrivalHook>),
}

#[derive(Debug, Clone, PartialEq, Component)]
pub struct Vehicle {
    pub id: VehicleId,
    position: GeoPoint,
    route: Vec<GeoPoint>,
    segment_cursor: usize,
    segment_remaining_m: f64,
    speed_kmh: f64,
    status: VehicleStatus,
    on_arrival: Option<ArrivalHook>,
    odometer_m: f64,
}

impl Vehicle {
    pub fn new(id: VehicleId, position: GeoPoint, speed_kmh: f64) -> Self {
        Self {
            id,
            position,
            route: Vec::new(),
            segment_cursor: 0,
            segment_remaining_m: 0.0,
            speed_kmh,
            status: VehicleStatus::Idle,
            on_arrival: None,
            odometer_m: 0.0,
        }
    }

    pub fn position(&self) -> GeoPoint {
        self.position
    }

    pub fn status(&self) -> VehicleStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        self.status == VehicleStatus::Idle
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    /// Takes effect from the next `step`; distance already covered is unaffected.
    pub fn set_speed_kmh(&mut self, speed_kmh: f64) {
        self.speed_kmh = speed_kmh;
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    pub fn segment_cursor(&self) -> usize {
        self.segment_cursor
    }

    pub fn segment_remaining_m(&self) -> f64 {
        self.segment_remaining_m
    }

    pub fn odometer_m(&self) -> f64 {
        self.odometer_m
    }

    /// Waypoints still ahead of the vehicle, starting with its current position.
    pub fn remaining_path(&self) -> Vec<GeoPoint> {
        if self.is_idle() || self.route.len() < 2 {
            return Vec::new();
        }
        std::iter::once(self.position)
            .chain(self.route[self.segment_cursor + 1..].iter().copied())
            .collect()
    }

    /// Distance left along the route, in meters.
    pub fn remaining_distance_m(&self) -> f64 {
        if self.is_idle() || self.route.len() < 2 {
            return 0.0;
        }
        let tail: f64 = self.route[self.segment_cursor + 1..]
            .windows(2)
            .map(|pair| distance_m(pair[0], pair[1]))
            .sum();
        self.segment_remaining_m.max(0.0) + tail
    }

    /// Install a new route.
    ///
    /// When the vehicle is more than `snap_threshold_m` away from the first waypoint,
    /// its current position is prepended so the first segment starts where it stands.
    pub fn assign_route(
        &mut self,
        route: Vec<GeoPoint>,
        on_arrival: Option<ArrivalHook>,
        snap_threshold_m: f64,
    ) -> AssignOutcome {
        if route.len() < 2 {
            return AssignOutcome::ArrivedImmediately(on_arrival);
        }

        let superseded = self.on_arrival.take();
        let mut route = route;
        if distance_m(self.position, route[0]) > snap_threshold_m {
            route.insert(0, self.position);
        }

        self.segment_cursor = 0;
        self.segment_remaining_m = distance_m(route[0], route[1]);
        self.route = route;
        self.on_arrival = on_arrival;
        self.status = VehicleStatus::EnRoute;
        AssignOutcome::Started { superseded }
    }

    /// Advance along the route by `dt_secs` of simulated time.
    pub fn step(&mut self, dt_secs: f64) -> StepOutcome {
        if self.status == VehicleStatus::Idle || self.route.len() < 2 {
            return StepOutcome::Idle;
        }
        // NaN fails both comparisons, so it is treated as non-positive.
        if !(self.speed_kmh > 0.0 && dt_secs > 0.0) {
            return StepOutcome::Travelling;
        }

        let mut to_move = self.speed_kmh * KMH_TO_MPS * dt_secs;

        while self.segment_cursor + 1 < self.route.len() && to_move > 0.0 {
            let next = self.route[self.segment_cursor + 1];
            // Zero-length segments are crossed by any positive movement.
            let crosses = self.segment_remaining_m <= 0.0 || to_move >= self.segment_remaining_m;

            if crosses {
                let crossed = self.segment_remaining_m.max(0.0);
                to_move -= crossed;
                self.odometer_m += crossed;
                self.position = next;
                self.segment_cursor += 1;
                self.segment_remaining_m = match self.route.get(self.segment_cursor + 1) {
                    Some(following) => distance_m(next, *following),
                    None => 0.0,
                };
                continue;
            }

            let start = self.route[self.segment_cursor];
            let length = distance_m(start, next);
            let remaining_after = self.segment_remaining_m - to_move;
            let fraction = if length > 0.0 {
                1.0 - remaining_after / length
            } else {
                1.0
            };
            self.position = interpolate(start, next, fraction);
            self.segment_remaining_m = remaining_after;
            self.odometer_m += to_move;
            break;
        }

        if self.segment_cursor + 1 >= self.route.len() {
            self.route.clear();
            self.segment_cursor = 0;
            self.segment_remaining_m = 0.0;
            self.status = VehicleStatus::Idle;
            return StepOutcome::Arrived(self.on_arrival.take());
        }

        StepOutcome::Travelling
    }
}
