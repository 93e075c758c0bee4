//! Greedy nearest-available matching.
//!
//! Every query is a full O(n) rescan of the live collection; fleets are small and
//! availability flips every tick, so no incremental index is kept. Candidates are
//! visited in ascending id order and ties keep the first one seen.

use bevy_ecs::prelude::{Resource, World};

use crate::ecs::{FleetIndex, Target, TargetId, VehicleId};
use crate::geo::{distance_m, GeoPoint};
use crate::vehicle::Vehicle;

/// Anything the dispatcher can pick: it has a position and may be taken.
pub trait Candidate {
    fn position(&self) -> GeoPoint;

    fn is_available(&self) -> bool;
}

impl Candidate for Vehicle {
    fn position(&self) -> GeoPoint {
        Vehicle::position(self)
    }

    fn is_available(&self) -> bool {
        self.is_idle()
    }
}

impl Candidate for Target {
    fn position(&self) -> GeoPoint {
        self.position
    }

    fn is_available(&self) -> bool {
        self.is_pending()
    }
}

/// Counters kept by the dispatcher. A request nobody can serve only bumps
/// `queued_requests`; it is not retried.
#[derive(Debug, Default, Clone, Copy, Resource)]
pub struct DispatchStats {
    pub queued_requests: u64,
}

/// Closest available candidate to `origin` and its distance in meters.
pub fn find_nearest_available<'a, C, I>(origin: GeoPoint, candidates: I) -> Option<(&'a C, f64)>
where
    C: Candidate + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let mut best: Option<(&'a C, f64)> = None;
    for candidate in candidates {
        if !candidate.is_available() {
            continue;
        }
        let distance = distance_m(origin, candidate.position());
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }
    best
}

/// Nearest idle vehicle to `origin`.
pub fn nearest_idle_vehicle(world: &World, origin: GeoPoint) -> Option<(VehicleId, f64)> {
    let index = world.get_resource::<FleetIndex>()?;
    let vehicles = index
        .vehicles
        .values()
        .filter_map(|entity| world.get::<Vehicle>(*entity));
    find_nearest_available(origin, vehicles).map(|(vehicle, distance)| (vehicle.id, distance))
}

/// Nearest pending target to `origin`.
pub fn nearest_pending_target(world: &World, origin: GeoPoint) -> Option<(TargetId, f64)> {
    let index = world.get_resource::<FleetIndex>()?;
    let targets = index
        .targets
        .values()
        .filter_map(|entity| world.get::<Target>(*entity));
    find_nearest_available(origin, targets).map(|(target, distance)| (target.id, distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spot {
        position: GeoPoint,
        available: bool,
    }

    impl Candidate for Spot {
        fn position(&self) -> GeoPoint {
            self.position
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(35.0, 135.0)
    }

    /// Point roughly `meters` north of the origin.
    fn north_by(meters: f64) -> GeoPoint {
        GeoPoint::new(35.0 + meters / 111_195.0, 135.0)
    }

    fn spots(distances: &[f64]) -> Vec<Spot> {
        distances
            .iter()
            .map(|m| Spot {
                position: north_by(*m),
                available: true,
            })
            .collect()
    }

    #[test]
    fn picks_the_closest_available_candidate() {
        let mut candidates = spots(&[500.0, 50.0, 2000.0]);

        let (best, distance) = find_nearest_available(origin(), &candidates).expect("match");
        assert_eq!(best.position, north_by(50.0));
        assert!((distance - 50.0).abs() < 0.1);

        candidates[1].available = false;
        let (best, _) = find_nearest_available(origin(), &candidates).expect("match");
        assert_eq!(best.position, north_by(500.0));

        for spot in &mut candidates {
            spot.available = false;
        }
        assert!(find_nearest_available(origin(), &candidates).is_none());
    }

    #[test]
    fn ties_keep_iteration_order() {
        let candidates = spots(&[300.0, 300.0, 300.0]);
        let (best, _) = find_nearest_available(origin(), &candidates).expect("match");
        assert!(std::ptr::eq(best, &candidates[0]));
    }

    #[test]
    fn empty_collection_has_no_match() {
        let candidates: Vec<Spot> = Vec::new();
        assert!(find_nearest_available(origin(), &candidates).is_none());
    }
}
