use thiserror::Error;

/// Caller-supplied data that cannot be normalized into the internal types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInputError {
    #[error("coordinate is not a number: lat={lat}, lon={lon}")]
    NonFinite { lat: f64, lon: f64 },
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("unrecognised coordinate form: {0}")]
    Malformed(String),
    #[error("invalid identifier {0:?}")]
    Identifier(String),
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}
