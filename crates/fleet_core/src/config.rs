//! Simulation configuration.
//!
//! All fields are optional in JSON; missing ones take the defaults below. The config is
//! inserted into the fleet world as a resource and read by the operator API, the
//! orchestrator and the tick driver.

use std::fs;
use std::path::Path;
use std::time::Duration;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::DEFAULT_TIME_SCALE;
use crate::error::ConfigError;
use crate::routing::RouteProviderKind;

/// Speed used when none (or an unusable one) is given, km/h.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// A new route whose first waypoint is farther than this from the vehicle gets the
/// vehicle's position prepended.
pub const DEFAULT_SNAP_THRESHOLD_M: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fleet-wide speed applied to every vehicle, km/h.
    pub speed_kmh: f64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
    /// Whether the clock starts running or paused.
    pub start_running: bool,
    pub snap_threshold_m: f64,
    /// Capacity of the operator event journal.
    pub event_log_capacity: usize,
    pub routing: RoutingConfig,
    pub decision: DecisionConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            time_scale: DEFAULT_TIME_SCALE,
            start_running: false,
            snap_threshold_m: DEFAULT_SNAP_THRESHOLD_M,
            event_log_capacity: 256,
            routing: RoutingConfig::default(),
            decision: DecisionConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Operator speed input; anything but a positive finite number means the default.
    pub fn sanitize_speed(speed_kmh: f64) -> f64 {
        if speed_kmh.is_finite() && speed_kmh > 0.0 {
            speed_kmh
        } else {
            DEFAULT_SPEED_KMH
        }
    }

    pub fn with_speed_kmh(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Self::sanitize_speed(speed_kmh);
        self
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_start_running(mut self, running: bool) -> Self {
        self.start_running = running;
        self
    }

    pub fn with_route_provider(mut self, kind: RouteProviderKind) -> Self {
        self.routing.provider = kind;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub provider: RouteProviderKind,
    /// LRU entries kept by the caching wrapper around remote providers.
    pub cache_capacity: usize,
    /// Replace a failed remote route by a straight line instead of reporting it.
    pub fallback_to_straight_line: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            provider: RouteProviderKind::default(),
            cache_capacity: 1_024,
            fallback_to_straight_line: false,
        }
    }
}

/// Decision poller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Base URL of the decision service; polling is off when unset.
    pub endpoint: Option<String>,
    /// Stop after this many completed polls (successful or not). `None` polls until cancelled.
    pub max_polls: Option<u64>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Wait between polls while no fleet status has been published yet.
    pub idle_interval_ms: u64,
    /// Per-request timeout; must exceed the service's long-poll window (20 s).
    pub request_timeout_ms: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_polls: None,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            idle_interval_ms: 100,
            request_timeout_ms: 25_000,
        }
    }
}

impl DecisionConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
