use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::geo::{GeoBounds, GeoPoint};

/// Demo vehicles, central Kyoto.
pub const KYOTO_VEHICLES: [GeoPoint; 3] = [
    GeoPoint::new(35.012, 135.768),
    GeoPoint::new(35.017, 135.765),
    GeoPoint::new(35.006, 135.775),
];

/// Demo targets of the target layout.
pub const KYOTO_TARGETS: [GeoPoint; 2] = [
    GeoPoint::new(35.015_65, 135.751_20),
    GeoPoint::new(35.004_86, 135.758_70),
];

/// Which demo layout to start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Vehicles only; the operator issues pickup/drop-off rides.
    #[default]
    Rides,
    /// One controlled vehicle plus target points.
    Targets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioParams {
    pub kind: ScenarioKind,
    pub vehicles: Vec<GeoPoint>,
    pub targets: Vec<GeoPoint>,
    /// Area random ride requests are sampled from.
    pub bounds: GeoBounds,
    /// Seed for random ride requests.
    pub seed: u64,
    pub config: SimulationConfig,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self::rides()
    }
}

impl ScenarioParams {
    /// Three vehicles in central Kyoto, no targets.
    pub fn rides() -> Self {
        Self {
            kind: ScenarioKind::Rides,
            vehicles: KYOTO_VEHICLES.to_vec(),
            targets: Vec::new(),
            bounds: GeoBounds::default(),
            seed: 0,
            config: SimulationConfig::default(),
        }
    }

    /// The first demo vehicle and the two demo targets.
    pub fn targets() -> Self {
        Self {
            kind: ScenarioKind::Targets,
            vehicles: KYOTO_VEHICLES[..1].to_vec(),
            targets: KYOTO_TARGETS.to_vec(),
            ..Self::rides()
        }
    }

    pub fn for_kind(kind: ScenarioKind) -> Self {
        match kind {
            ScenarioKind::Rides => Self::rides(),
            ScenarioKind::Targets => Self::targets(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_bounds(mut self, bounds: GeoBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_vehicles(mut self, vehicles: Vec<GeoPoint>) -> Self {
        self.vehicles = vehicles;
        self
    }

    pub fn with_targets(mut self, targets: Vec<GeoPoint>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }
}
