//! OSRM `/route` service: URL building, response parsing and (feature `osrm`) the
//! blocking HTTP client.

use serde::Deserialize;

use crate::error::RoutingError;
use crate::geo::GeoPoint;

/// Minimal OSRM JSON response structures.
#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRouteResponse {
    pub(crate) code: String,
    pub(crate) message: Option<String>,
    pub(crate) routes: Option<Vec<OsrmRoute>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRoute {
    pub(crate) geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmGeometry {
    pub(crate) coordinates: Vec<[f64; 2]>, // [lng, lat]
}

/// `/route/v1/driving` URL for a full-overview GeoJSON route.
pub fn route_url(endpoint: &str, from: GeoPoint, to: GeoPoint) -> String {
    format!(
        "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
        endpoint.trim_end_matches('/'),
        from.lng,
        from.lat,
        to.lng,
        to.lat,
    )
}

#[cfg_attr(not(feature = "osrm"), allow(dead_code))]
pub(crate) fn parse_route_response(
    resp: OsrmRouteResponse,
    from: GeoPoint,
    to: GeoPoint,
) -> Result<Vec<GeoPoint>, RoutingError> {
    if resp.code != "Ok" {
        let detail = match resp.message {
            Some(message) => format!("{}: {}", resp.code, message),
            None => resp.code,
        };
        return Err(RoutingError::Api(detail));
    }

    let route = resp
        .routes
        .and_then(|routes| routes.into_iter().next())
        .ok_or(RoutingError::NoRoute { from, to })?;

    // OSRM returns [lng, lat]
    Ok(route
        .geometry
        .coordinates
        .iter()
        .map(|c| GeoPoint::new(c[1], c[0]))
        .collect())
}

#[cfg(feature = "osrm")]
pub use client::OsrmRouteProvider;

#[cfg(feature = "osrm")]
mod client {
    use std::time::Duration;

    use reqwest::blocking::Client;

    use super::{parse_route_response, route_url, OsrmRouteResponse};
    use crate::error::RoutingError;
    use crate::geo::GeoPoint;
    use crate::routing::RouteProvider;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Routes via an OSRM HTTP endpoint.
    pub struct OsrmRouteProvider {
        client: Client,
        endpoint: String,
    }

    impl OsrmRouteProvider {
        pub fn new(endpoint: &str) -> Result<Self, RoutingError> {
            let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
            Ok(Self {
                client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
            })
        }
    }

    impl RouteProvider for OsrmRouteProvider {
        fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<GeoPoint>, RoutingError> {
            let url = route_url(&self.endpoint, from, to);
            tracing::debug!(%url, "requesting route");
            let response = self.client.get(&url).send()?;
            let status = response.status();
            if !status.is_success() {
                return Err(RoutingError::Status(status.as_u16()));
            }
            let parsed: OsrmRouteResponse = response.json()?;
            parse_route_response(parsed, from, to)
        }
    }
}
