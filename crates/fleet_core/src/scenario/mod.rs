//! Scenario setup: the two demo layouts (rides and targets) and fleet population.
//!
//! A scenario fixes the initial vehicles and targets, the area random ride requests are
//! drawn from and the seed of that draw, so a headless run is reproducible.

mod build;
mod params;

pub use build::{build_fleet, build_fleet_with_provider, populate};
pub use params::{ScenarioKind, ScenarioParams, KYOTO_TARGETS, KYOTO_VEHICLES};
