//! Test helpers: fixed geography and scripted collaborators.
//!
//! Shared by unit tests, the integration tests under `tests/` and the benches.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::SimulationConfig;
use crate::decision::{DecisionProvider, DecisionRequest, Directive};
use crate::error::{DecisionError, RoutingError};
use crate::fleet::Fleet;
use crate::geo::{GeoPoint, EARTH_RADIUS_M};
use crate::routing::RouteProvider;

/// The first demo vehicle position, central Kyoto.
pub fn kyoto_origin() -> GeoPoint {
    GeoPoint::new(35.0120, 135.7680)
}

/// Point `meters` due north of `point`.
pub fn point_north_of(point: GeoPoint, meters: f64) -> GeoPoint {
    let dlat = (meters / EARTH_RADIUS_M).to_degrees();
    GeoPoint::new(point.lat + dlat, point.lng)
}

/// Point `meters` due east of `point` (small distances).
pub fn point_east_of(point: GeoPoint, meters: f64) -> GeoPoint {
    let dlng = (meters / (EARTH_RADIUS_M * point.lat.to_radians().cos())).to_degrees();
    GeoPoint::new(point.lat, point.lng + dlng)
}

/// Every `(from, to)` pair a [`ScriptedRouteProvider`] was asked for.
#[derive(Debug, Clone, Default)]
pub struct RouteCalls(Arc<Mutex<Vec<(GeoPoint, GeoPoint)>>>);

impl RouteCalls {
    pub fn all(&self) -> Vec<(GeoPoint, GeoPoint)> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns `[from, to]` for every request, except for the calls scripted to fail or
/// to come back degenerate (a single point).
#[derive(Debug, Default)]
pub struct ScriptedRouteProvider {
    calls: RouteCalls,
    failing_calls: BTreeSet<usize>,
    degenerate: bool,
}

impl ScriptedRouteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th call (1-based).
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.failing_calls.insert(n);
        self
    }

    /// Answer every request with a one-point route.
    pub fn degenerate(mut self) -> Self {
        self.degenerate = true;
        self
    }

    pub fn calls(&self) -> RouteCalls {
        self.calls.clone()
    }
}

impl RouteProvider for ScriptedRouteProvider {
    fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
        let call = {
            let mut calls = self
                .calls
                .0
                .lock()
                .map_err(|_| RoutingError::Unavailable("call log poisoned".to_string()))?;
            calls.push((from, to));
            calls.len()
        };
        if self.failing_calls.contains(&call) {
            return Err(RoutingError::Unavailable(format!("scripted failure on call {call}")));
        }
        if self.degenerate {
            return Ok(vec![to]);
        }
        Ok(vec![from, to])
    }
}

/// Always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRouteProvider;

impl RouteProvider for FailingRouteProvider {
    fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
        Err(RoutingError::NoRoute { from, to })
    }
}

/// Fleet backed by a [`ScriptedRouteProvider`], plus the handle to its call log.
pub fn fleet_with_scripted_routes(config: SimulationConfig, provider: ScriptedRouteProvider) -> (Fleet, RouteCalls) {
    let calls = provider.calls();
    (Fleet::with_route_provider(config, Box::new(provider)), calls)
}

/// Decision provider that plays back a script, then answers "no action".
#[derive(Debug, Default)]
pub struct ScriptedDecisionProvider {
    script: Mutex<VecDeque<Result<Directive, DecisionError>>>,
    polls: Arc<AtomicUsize>,
}

impl ScriptedDecisionProvider {
    pub fn new(script: Vec<Result<Directive, DecisionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `next_action` calls.
    pub fn poll_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.polls)
    }
}

impl DecisionProvider for ScriptedDecisionProvider {
    fn next_action(&self, _request: &DecisionRequest) -> Result<Directive, DecisionError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Ok(Directive::none()))
    }
}
