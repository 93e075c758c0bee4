use crate::error::RoutingError;
use crate::fleet::Fleet;
use crate::routing::RouteProvider;
use crate::scenario::params::ScenarioParams;

/// Build a fleet for `params`, with the route provider its config describes.
pub fn build_fleet(params: &ScenarioParams) -> Result<Fleet, RoutingError> {
    let mut fleet = Fleet::new(params.config.clone())?;
    populate(&mut fleet, params);
    Ok(fleet)
}

/// Same as [`build_fleet`] with an explicit route provider (tests, benches).
pub fn build_fleet_with_provider(params: &ScenarioParams, provider: Box<dyn RouteProvider>) -> Fleet {
    let mut fleet = Fleet::with_route_provider(params.config.clone(), provider);
    populate(&mut fleet, params);
    fleet
}

/// Add the scenario's vehicles and targets and install its request area.
pub fn populate(fleet: &mut Fleet, params: &ScenarioParams) {
    fleet.set_request_area(params.bounds, params.seed);
    for position in &params.vehicles {
        fleet.add_vehicle(*position);
    }
    for position in &params.targets {
        fleet.add_target(*position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{TargetId, VehicleId};
    use crate::routing::StraightLineRouteProvider;
    use crate::scenario::params::{ScenarioKind, KYOTO_TARGETS, KYOTO_VEHICLES};

    #[test]
    fn ride_layout_has_three_vehicles_and_no_targets() {
        let fleet = build_fleet(&ScenarioParams::rides()).expect("fleet");
        assert_eq!(fleet.vehicle_ids(), vec![VehicleId(1), VehicleId(2), VehicleId(3)]);
        assert_eq!(
            fleet.vehicle(VehicleId(2)).expect("vehicle").position(),
            KYOTO_VEHICLES[1]
        );
        assert!(fleet.snapshot().targets.is_empty());
    }

    #[test]
    fn target_layout_has_one_vehicle_and_two_targets() {
        let params = ScenarioParams::for_kind(ScenarioKind::Targets);
        let fleet = build_fleet_with_provider(&params, Box::new(StraightLineRouteProvider::default()));
        assert_eq!(fleet.vehicle_ids(), vec![VehicleId(1)]);
        assert_eq!(fleet.target(TargetId(2)).expect("target").position, KYOTO_TARGETS[1]);
    }

    #[test]
    fn same_seed_gives_same_random_requests() {
        let params = ScenarioParams::rides().with_seed(11);
        let mut a = build_fleet(&params).expect("a");
        let mut b = build_fleet(&params).expect("b");
        a.random_request().expect("a request");
        b.random_request().expect("b request");
        assert_eq!(a.snapshot().rides, b.snapshot().rides);
    }
}
