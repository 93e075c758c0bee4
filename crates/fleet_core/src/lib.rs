pub mod clock;
pub mod config;
pub mod decision;
pub mod ecs;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod matching;
pub mod orchestrator;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod systems;
pub mod telemetry;
pub mod vehicle;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
