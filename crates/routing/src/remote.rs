//! Remote routing service capability and an OpenRouteService client.

use std::time::Duration;

use nav_geo::GeoPoint;
use reqwest::{
    blocking::Client,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::RemoteRoutingError;

pub const DEFAULT_ORS_URL: &str = "https://api.openrouteservice.org/v2/directions/driving-car";

/// Route as reported by a remote service.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRoute {
    pub coordinates: Vec<GeoPoint>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Anything that can route through an ordered coordinate list.
pub trait RemoteRoutingService: Send + Sync {
    fn route(&self, points: &[GeoPoint]) -> Result<RemoteRoute, RemoteRoutingError>;
}

pub struct OpenRouteServiceClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct DirectionsRequest {
    /// `[lon, lat]` pairs.
    coordinates: Vec<[f64; 2]>,
    instructions: bool,
    preference: &'static str,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<RouteBody>,
}

#[derive(Deserialize)]
struct RouteBody {
    geometry: Value,
    summary: Summary,
}

#[derive(Deserialize)]
struct Summary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

impl OpenRouteServiceClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteRoutingError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl RemoteRoutingService for OpenRouteServiceClient {
    fn route(&self, points: &[GeoPoint]) -> Result<RemoteRoute, RemoteRoutingError> {
        let request = DirectionsRequest {
            coordinates: points.iter().map(|p| [p.lon, p.lat]).collect(),
            instructions: false,
            preference: "shortest",
        };
        debug!("Requesting route through {} points from {}", points.len(), self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json, application/geo+json")
            .json(&request)
            .send()?;
        if !response.status().is_success() {
            return Err(RemoteRoutingError::Status(response.status().as_u16()));
        }
        parse_directions(response.json()?)
    }
}

/// Map a directions response body onto [`RemoteRoute`].
fn parse_directions(body: Value) -> Result<RemoteRoute, RemoteRoutingError> {
    let response: DirectionsResponse = serde_json::from_value(body)
        .map_err(|err| RemoteRoutingError::Malformed(err.to_string()))?;
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(RemoteRoutingError::Empty)?;

    let coordinates = match route.geometry {
        Value::String(encoded) => decode_polyline(&encoded)?,
        Value::Object(map) => {
            let pairs: Vec<[f64; 2]> = map
                .get("coordinates")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|err| RemoteRoutingError::Malformed(err.to_string()))?
                .unwrap_or_default();
            pairs
                .into_iter()
                .map(|[lon, lat]| GeoPoint::new(lat, lon))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| RemoteRoutingError::Malformed(err.to_string()))?
        }
        other => {
            return Err(RemoteRoutingError::Malformed(format!(
                "unexpected geometry {other}"
            )));
        }
    };
    if coordinates.len() < 2 {
        return Err(RemoteRoutingError::Empty);
    }

    Ok(RemoteRoute {
        coordinates,
        distance_m: route.summary.distance,
        duration_s: route.summary.duration,
    })
}

/// Decode a precision-5 encoded polyline (the default ORS JSON geometry).
fn decode_polyline(encoded: &str) -> Result<Vec<GeoPoint>, RemoteRoutingError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let (mut lat, mut lon) = (0i64, 0i64);
    let mut points = Vec::new();

    while index < bytes.len() {
        lat += next_delta(bytes, &mut index)?;
        lon += next_delta(bytes, &mut index)?;
        let point = GeoPoint::new(lat as f64 / 1e5, lon as f64 / 1e5)
            .map_err(|err| RemoteRoutingError::Malformed(err.to_string()))?;
        points.push(point);
    }
    Ok(points)
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, RemoteRoutingError> {
    let mut result = 0i64;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*index)
            .ok_or_else(|| RemoteRoutingError::Malformed("truncated polyline".into()))?;
        *index += 1;
        let chunk = i64::from(byte)
            .checked_sub(63)
            .filter(|c| (0..64).contains(c))
            .ok_or_else(|| RemoteRoutingError::Malformed("invalid polyline byte".into()))?;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
        if shift > 60 {
            return Err(RemoteRoutingError::Malformed("polyline overflow".into()));
        }
    }
    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn maps_geojson_geometry_to_lat_lon() {
        let route = parse_directions(json!({
            "routes": [{
                "geometry": {"coordinates": [[76.9016, 10.9028], [76.9036, 10.9048]]},
                "summary": {"distance": 310.5, "duration": 42.0}
            }]
        }))
        .unwrap();
        assert_eq!(route.coordinates[0], GeoPoint::new(10.9028, 76.9016).unwrap());
        assert_eq!(route.distance_m, 310.5);
        assert_eq!(route.duration_s, 42.0);
    }

    #[test]
    fn decodes_encoded_geometry() {
        let route = parse_directions(json!({
            "routes": [{
                "geometry": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
                "summary": {"distance": 1.0, "duration": 2.0}
            }]
        }))
        .unwrap();
        let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
        assert_eq!(route.coordinates.len(), 3);
        for (point, (lat, lon)) in route.coordinates.iter().zip(expected) {
            assert_relative_eq!(point.lat, lat, epsilon = 1e-9);
            assert_relative_eq!(point.lon, lon, epsilon = 1e-9);
        }
    }

    #[test]
    fn empty_or_malformed_responses_fail() {
        assert!(matches!(
            parse_directions(json!({"routes": []})),
            Err(RemoteRoutingError::Empty)
        ));
        assert!(matches!(
            parse_directions(json!({"routes": [{"geometry": 5, "summary": {}}]})),
            Err(RemoteRoutingError::Malformed(_))
        ));
        assert!(matches!(
            parse_directions(json!({"routes": [{"geometry": "_p~i", "summary": {}}]})),
            Err(RemoteRoutingError::Malformed(_))
        ));
    }

    #[test]
    fn client_keeps_configured_endpoint() {
        let client = OpenRouteServiceClient::new(
            "http://localhost:8080/v2/directions/driving-car",
            "key",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v2/directions/driving-car");
    }
}
