use std::{io, path::PathBuf};

use nav_geo::InvalidInputError;
use thiserror::Error;

/// Failure of a route query surfaced to the caller.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no route found: {0}")]
    NoRouteFound(String),
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
}

/// The remote routing service could not produce a usable route.
#[derive(Debug, Error)]
pub enum RemoteRoutingError {
    #[error("routing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("routing service responded with {0}")]
    Status(u16),
    #[error("routing service returned no route")]
    Empty,
    #[error("malformed routing response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read road graph {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse road graph: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate node id {0}")]
    DuplicateNode(u64),
    #[error("edge references unknown node {0}")]
    UnknownNode(u64),
    #[error("edge {from}->{to} has invalid length {length}")]
    InvalidLength { from: u64, to: u64, length: f64 },
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
}
