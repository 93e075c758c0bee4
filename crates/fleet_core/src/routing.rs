//! Pluggable route providers: trait abstraction for routing backends.
//!
//! Implementations, selectable via [`RouteProviderKind`]:
//!
//! - **`StraightLineRouteProvider`**: densified straight line between the endpoints. Zero dependencies.
//! - **`OsrmRouteProvider`** (feature `osrm`): calls a local/remote OSRM HTTP endpoint.
//!
//! Remote providers are wrapped in a [`CachedRouteProvider`]. The provider lives in the
//! fleet world as a [`RouteProviderResource`], built from [`RoutingConfig`].

pub mod osrm;

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;
use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::error::RoutingError;
use crate::geo::{distance_m, interpolate, GeoPoint};

/// Spacing of the intermediate waypoints produced by the straight-line provider.
pub const STRAIGHT_LINE_SPACING_M: f64 = 50.0;

/// Cache key resolution: res-12 cells have ~10 m edges, so two requests starting in the
/// same cell share a path and the vehicle's snap threshold absorbs the difference.
const CACHE_RESOLUTION: Resolution = Resolution::Twelve;

/// Which routing backend to use.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteProviderKind {
    #[default]
    StraightLine,
    /// OSRM HTTP endpoint (e.g. `"http://localhost:5000"`).
    #[cfg(feature = "osrm")]
    Osrm { endpoint: String },
}

/// Trait for routing backends. Implementations must be `Send + Sync` so the provider can
/// be stored as a shared ECS resource.
pub trait RouteProvider: Send + Sync {
    /// Ordered waypoints from `from` to `to`.
    fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError>;
}

/// ECS resource wrapping a boxed route provider.
#[derive(Resource)]
pub struct RouteProviderResource(pub Box<dyn RouteProvider>);

// ---------------------------------------------------------------------------
// Straight-line provider (always available)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StraightLineRouteProvider {
    pub spacing_m: f64,
}

impl Default for StraightLineRouteProvider {
    fn default() -> Self {
        Self {
            spacing_m: STRAIGHT_LINE_SPACING_M,
        }
    }
}

impl RouteProvider for StraightLineRouteProvider {
    fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
        if !from.is_valid() || !to.is_valid() {
            return Err(RoutingError::NoRoute { from, to });
        }
        let distance = distance_m(from, to);
        let segments = if self.spacing_m > 0.0 {
            ((distance / self.spacing_m).ceil() as usize).max(1)
        } else {
            1
        };
        let mut waypoints = Vec::with_capacity(segments + 1);
        waypoints.push(from);
        for i in 1..segments {
            waypoints.push(interpolate(from, to, i as f64 / segments as f64));
        }
        waypoints.push(to);
        Ok(waypoints)
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// LRU-cached wrapper around any [`RouteProvider`].
///
/// Cache key is the pair of res-12 H3 cells containing the endpoints (directional).
/// On inner failure the straight-line fallback is used when enabled; otherwise the
/// error is passed through. Failures are never cached.
pub struct CachedRouteProvider {
    inner: Box<dyn RouteProvider>,
    cache: Mutex<LruCache<(CellIndex, CellIndex), Vec<GeoPoint>>>,
    fallback_to_straight_line: bool,
}

impl CachedRouteProvider {
    pub fn new(inner: Box<dyn RouteProvider>, capacity: usize, fallback_to_straight_line: bool) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            fallback_to_straight_line,
        }
    }

    fn cache_key(from: GeoPoint, to: GeoPoint) -> Option<(CellIndex, CellIndex)> {
        let from = LatLng::try_from(from).ok()?.to_cell(CACHE_RESOLUTION);
        let to = LatLng::try_from(to).ok()?.to_cell(CACHE_RESOLUTION);
        Some((from, to))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl RouteProvider for CachedRouteProvider {
    fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
        let key = Self::cache_key(from, to);

        // Fast path: cache hit
        if let (Some(key), Ok(mut cache)) = (key, self.cache.lock()) {
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        // Slow path: query inner provider
        let result = match self.inner.route(from, to) {
            Ok(route) => Ok(route),
            Err(err) if self.fallback_to_straight_line => {
                tracing::warn!(%from, %to, error = %err, "routing failed, using straight line");
                StraightLineRouteProvider::default().route(from, to)
            }
            Err(err) => Err(err),
        };

        if let (Some(key), Ok(route)) = (key, result.as_ref()) {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(key, route.clone());
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Factory: build a provider from RoutingConfig
// ---------------------------------------------------------------------------

/// Construct a boxed [`RouteProvider`] from the routing section of the config.
///
/// - `StraightLine` is returned without caching (it is pure and cheap).
/// - `Osrm` is wrapped in a [`CachedRouteProvider`].
pub fn build_route_provider(config: &RoutingConfig) -> Result<Box<dyn RouteProvider>, RoutingError> {
    match &config.provider {
        RouteProviderKind::StraightLine => Ok(Box::new(StraightLineRouteProvider::default())),

        #[cfg(feature = "osrm")]
        RouteProviderKind::Osrm { endpoint } => {
            let inner = Box::new(osrm::OsrmRouteProvider::new(endpoint)?);
            Ok(Box::new(CachedRouteProvider::new(
                inner,
                config.cache_capacity,
                config.fallback_to_straight_line,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl RouteProvider for CountingProvider {
        fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RoutingError::Unavailable("offline".to_string()))
            } else {
                Ok(vec![from, to])
            }
        }
    }

    fn a() -> GeoPoint {
        GeoPoint::new(35.0120, 135.7680)
    }

    fn b() -> GeoPoint {
        GeoPoint::new(35.0170, 135.7650)
    }

    #[test]
    fn straight_line_is_densified_and_keeps_endpoints() {
        let route = StraightLineRouteProvider::default().route(a(), b()).expect("route");
        assert_eq!(route.first(), Some(&a()));
        assert_eq!(route.last(), Some(&b()));
        for pair in route.windows(2) {
            assert!(distance_m(pair[0], pair[1]) <= STRAIGHT_LINE_SPACING_M + 1e-6);
        }
    }

    #[test]
    fn straight_line_between_identical_points_has_two_waypoints() {
        let route = StraightLineRouteProvider::default().route(a(), a()).expect("route");
        assert_eq!(route, vec![a(), a()]);
    }

    #[test]
    fn straight_line_rejects_invalid_points() {
        let bad = GeoPoint::new(120.0, 0.0);
        assert!(matches!(
            StraightLineRouteProvider::default().route(a(), bad),
            Err(RoutingError::NoRoute { .. })
        ));
    }

    #[test]
    fn cache_serves_repeat_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedRouteProvider::new(
            Box::new(CountingProvider {
                calls: Arc::clone(&calls),
                fail: false,
            }),
            8,
            false,
        );
        cached.route(a(), b()).expect("first");
        cached.route(a(), b()).expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_entries(), 1);

        cached.route(b(), a()).expect("reverse");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_pass_through_and_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedRouteProvider::new(
            Box::new(CountingProvider {
                calls: Arc::clone(&calls),
                fail: true,
            }),
            8,
            false,
        );
        assert!(cached.route(a(), b()).is_err());
        assert!(cached.route(a(), b()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached_entries(), 0);
    }

    #[test]
    fn fallback_replaces_failures_with_a_straight_line() {
        let cached = CachedRouteProvider::new(
            Box::new(CountingProvider {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
            }),
            8,
            true,
        );
        let route = cached.route(a(), b()).expect("fallback route");
        assert_eq!(route.last(), Some(&b()));
    }

    #[test]
    fn default_config_builds_straight_line_provider() {
        let provider = build_route_provider(&RoutingConfig::default()).expect("provider");
        assert_eq!(provider.route(a(), b()).expect("route").first(), Some(&a()));
    }

    #[test]
    fn provider_kind_uses_tagged_json() {
        let kind: RouteProviderKind =
            serde_json::from_str(r#"{ "kind": "straight_line" }"#).expect("parse");
        assert_eq!(kind, RouteProviderKind::StraightLine);
    }
}
