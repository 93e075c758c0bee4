//! Geographic primitives: lat/lng points, haversine distance and interpolation.
//!
//! This module provides:
//!
//! - **GeoPoint**: plain lat/lng value type used for positions and route waypoints
//! - **Distance**: haversine great-circle distance in meters
//! - **Interpolation**: component-wise linear interpolation between two points
//! - **GeoBounds**: bounding box used to sample random request locations
//!
//! Interpolation is planar, not geodesic; route waypoints are assumed to be
//! street-level apart.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn distance_to(&self, other: GeoPoint) -> f64 {
        distance_m(*self, other)
    }

    /// True when both coordinates are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

impl TryFrom<GeoPoint> for h3o::LatLng {
    type Error = h3o::error::InvalidLatLng;

    fn try_from(point: GeoPoint) -> Result<Self, Self::Error> {
        h3o::LatLng::new(point.lat, point.lng)
    }
}

impl From<h3o::LatLng> for GeoPoint {
    fn from(ll: h3o::LatLng) -> Self {
        Self::new(ll.lat(), ll.lng())
    }
}

/// Haversine great-circle distance between two points, in meters.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Linear interpolation of lat and lng independently. `t` is clamped to [0, 1].
pub fn interpolate(a: GeoPoint, b: GeoPoint, t: f64) -> GeoPoint {
    let t = t.clamp(0.0, 1.0);
    GeoPoint {
        lat: a.lat + (b.lat - a.lat) * t,
        lng: a.lng + (b.lng - a.lng) * t,
    }
}

/// Axis-aligned lat/lng box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south: south.min(north),
            west: west.min(east),
            north: south.max(north),
            east: west.max(east),
        }
    }

    /// Box of `half_span_deg` degrees around `center` in every direction.
    pub fn around(center: GeoPoint, half_span_deg: f64) -> Self {
        let span = half_span_deg.abs();
        Self::new(
            center.lat - span,
            center.lng - span,
            center.lat + span,
            center.lng + span,
        )
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lng)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.south + self.north) * 0.5,
            (self.west + self.east) * 0.5,
        )
    }

    /// Uniform sample inside the box.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> GeoPoint {
        GeoPoint {
            lat: self.south + rng.gen::<f64>() * (self.north - self.south),
            lng: self.west + rng.gen::<f64>() * (self.east - self.west),
        }
    }
}

impl Default for GeoBounds {
    /// Central Kyoto, roughly a zoom-14 map viewport.
    fn default() -> Self {
        Self::new(35.0, 135.75, 35.025, 135.785)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_close(a: f64, b: f64, rel: f64) {
        let scale = a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= rel * scale, "{a} vs {b}");
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = GeoPoint::new(35.0120, 135.7680);
        let b = GeoPoint::new(34.6937, 135.5023);
        assert_eq!(distance_m(a, a), 0.0);
        assert_close(distance_m(a, b), distance_m(b, a), 1e-12);
    }

    #[test]
    fn one_millidegree_of_latitude_is_about_111_meters() {
        let a = GeoPoint::new(35.0120, 135.7680);
        let b = GeoPoint::new(35.0130, 135.7680);
        let expected = EARTH_RADIUS_M * 0.001_f64.to_radians();
        assert_close(distance_m(a, b), expected, 1e-6);
    }

    #[test]
    fn antipodal_points_are_half_circumference_apart() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 180.0);
        assert_close(distance_m(a, b), std::f64::consts::PI * EARTH_RADIUS_M, 1e-9);
    }

    #[test]
    fn interpolate_hits_endpoints_and_midpoint() {
        let a = GeoPoint::new(35.0, 135.0);
        let b = GeoPoint::new(36.0, 137.0);
        assert_eq!(interpolate(a, b, 0.0), a);
        assert_eq!(interpolate(a, b, 1.0), b);
        assert_eq!(interpolate(a, b, 0.5), GeoPoint::new(35.5, 136.0));
        assert_eq!(interpolate(a, b, 2.0), b);
    }

    #[test]
    fn bounds_sample_stays_inside() {
        let bounds = GeoBounds::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(bounds.contains(bounds.sample(&mut rng)));
        }
    }

    #[test]
    fn bounds_normalize_swapped_corners() {
        let bounds = GeoBounds::new(35.1, 135.9, 35.0, 135.8);
        assert_eq!(bounds.south, 35.0);
        assert_eq!(bounds.north, 35.1);
        assert!(bounds.contains(bounds.center()));
    }

    #[test]
    fn validity_rejects_out_of_range() {
        assert!(GeoPoint::new(35.0, 135.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
