use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::InvalidInputError;

/// Latitude/longitude pair in decimal degrees (WGS84).
///
/// This is the only coordinate representation used past the crate boundary. Callers that
/// hold `[lat, lon]` pairs or `{lat, lng}` objects go through [`CoordinateInput`], which
/// is also what `Deserialize` accepts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoordinateInput")]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a validated point. Rejects NaN/infinite values and out-of-range degrees.
    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidInputError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(InvalidInputError::NonFinite { lat, lon });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidInputError::Latitude(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(InvalidInputError::Longitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Normalize an arbitrary JSON value (`[lat, lon]` or `{"lat", "lng"|"lon"}`).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, InvalidInputError> {
        let input: CoordinateInput = serde_json::from_value(value.clone())
            .map_err(|_| InvalidInputError::Malformed(value.to_string()))?;
        Self::try_from(input)
    }

    /// Point offset by a planar delta in degrees. Not validated; used for
    /// synthesized positions that stay a few metres away from real coordinates.
    pub fn offset_deg(self, dlat: f64, dlon: f64) -> Self {
        Self {
            lat: self.lat + dlat,
            lon: self.lon + dlon,
        }
    }

    /// `[lat, lon]` ordering used by most map front-ends.
    pub fn to_pair(self) -> [f64; 2] {
        [self.lat, self.lon]
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Parses `"lat,lon"` as typed on a command line.
impl FromStr for GeoPoint {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| InvalidInputError::Malformed(s.to_string()))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| InvalidInputError::Malformed(s.to_string()))?;
        let lon = lon
            .trim()
            .parse::<f64>()
            .map_err(|_| InvalidInputError::Malformed(s.to_string()))?;
        Self::new(lat, lon)
    }
}

/// Coordinate shapes accepted from callers.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CoordinateInput {
    /// `[lat, lon]`
    Pair([f64; 2]),
    /// `{"lat": .., "lng": ..}` or `{"lat": .., "lon": ..}`
    Named {
        lat: f64,
        #[serde(alias = "lng")]
        lon: f64,
    },
}

impl TryFrom<CoordinateInput> for GeoPoint {
    type Error = InvalidInputError;

    fn try_from(input: CoordinateInput) -> Result<Self, Self::Error> {
        match input {
            CoordinateInput::Pair([lat, lon]) => GeoPoint::new(lat, lon),
            CoordinateInput::Named { lat, lon } => GeoPoint::new(lat, lon),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pair_and_named_forms_normalize_to_the_same_point() {
        let pair = GeoPoint::from_json(&json!([10.9028, 76.9016])).unwrap();
        let lng = GeoPoint::from_json(&json!({"lat": 10.9028, "lng": 76.9016})).unwrap();
        let lon = GeoPoint::from_json(&json!({"lat": 10.9028, "lon": 76.9016})).unwrap();
        assert_eq!(pair, lng);
        assert_eq!(pair, lon);
    }

    #[test]
    fn rejects_other_shapes() {
        for value in [
            json!("10.9,76.9"),
            json!([10.9]),
            json!([10.9, 76.9, 3.0]),
            json!({"latitude": 1.0, "longitude": 2.0}),
            json!(null),
        ] {
            assert!(
                matches!(
                    GeoPoint::from_json(&value),
                    Err(InvalidInputError::Malformed(_))
                ),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_degrees() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(InvalidInputError::Latitude(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -181.0),
            Err(InvalidInputError::Longitude(-181.0))
        );
        assert!(matches!(
            GeoPoint::new(f64::NAN, 0.0),
            Err(InvalidInputError::NonFinite { .. })
        ));
    }

    #[test]
    fn deserialize_validates() {
        let err = serde_json::from_str::<GeoPoint>("[120.0, 5.0]");
        assert!(err.is_err());
        let ok: GeoPoint = serde_json::from_str(r#"{"lat": 1.5, "lng": 2.5}"#).unwrap();
        assert_eq!(ok, GeoPoint { lat: 1.5, lon: 2.5 });
    }

    #[test]
    fn parses_cli_pairs() {
        let point: GeoPoint = " 10.9028 , 76.9016".parse().unwrap();
        assert_eq!(point.to_pair(), [10.9028, 76.9016]);
        assert!("10.9028".parse::<GeoPoint>().is_err());
    }
}
