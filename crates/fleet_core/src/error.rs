//! Error types. Every failure here is local to one request or one leg; none of them
//! stops the simulation.

use std::path::PathBuf;

use thiserror::Error;

use crate::ecs::{TargetId, VehicleId};
use crate::geo::GeoPoint;

/// The routing collaborator could not produce a path.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[cfg(feature = "osrm")]
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing service answered HTTP {0}")]
    Status(u16),
    #[error("routing service error: {0}")]
    Api(String),
    #[error("no route from {from} to {to}")]
    NoRoute { from: GeoPoint, to: GeoPoint },
    #[error("routing unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),
    #[error("unknown target {0}")]
    UnknownTarget(TargetId),
    #[error("the fleet has no vehicles")]
    NoVehicles,
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// The decision service could not be reached or answered with garbage.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[cfg(feature = "decision-http")]
    #[error("decision request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decision service answered HTTP {0}")]
    Status(u16),
    #[error("decision service error: {0}")]
    Service(String),
    #[error("malformed decision payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
