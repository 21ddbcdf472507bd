//! Error types for the routing core.
//!
//! Terminal errors surface through [`RoutingError`]. Oracle and store
//! failures have their own types but are absorbed by the matrix provider and
//! the cache; they never reach the caller of an optimization request.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Input rejected before any network or solver work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("stop list cannot be empty")]
    EmptyStops,
    #[error("origins and destinations cannot be empty")]
    EmptyLocations,
    #[error("number of vehicles must be at least 1")]
    InvalidVehicleCount,
    #[error("capacity per vehicle must be at least 1")]
    InvalidCapacity,
    #[error("stop {index} has zero demand; demand must be at least 1")]
    ZeroDemand { index: usize },
    #[error("weights must sum to 1.0 (distance {distance}, duration {duration})")]
    InvalidWeights { distance: f64, duration: f64 },
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("matrix shape mismatch: distances {distances:?}, durations {durations:?}")]
    MatrixShape {
        distances: (usize, usize),
        durations: (usize, usize),
    },
    #[error("matrices must be {expected}x{expected} (depot plus stops), got {rows} rows")]
    MatrixSize { expected: usize, rows: usize },
}

/// Which optimization mode produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Tsp,
    Cvrp,
}

impl ProblemKind {
    /// Advice for the caller on how to make the next attempt succeed.
    pub const fn hint(self) -> &'static str {
        match self {
            ProblemKind::Tsp => "try reducing the number of stops",
            ProblemKind::Cvrp => "try increasing capacity or number of couriers",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemKind::Tsp => f.write_str("TSP"),
            ProblemKind::Cvrp => f.write_str("CVRP"),
        }
    }
}

/// Coarse error classification so callers can decide whether to retry with
/// different parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InfeasibleCapacity,
    NoSolutionFound,
}

/// Terminal errors of an optimization request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("infeasible: total demand ({demand}) exceeds total capacity ({capacity})")]
    InfeasibleCapacity { demand: u64, capacity: u64 },
    #[error("no solution found for {problem} within {timeout:?}; {}", .problem.hint())]
    NoSolutionFound {
        problem: ProblemKind,
        timeout: Duration,
    },
}

impl RoutingError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::Validation(_) => ErrorKind::Validation,
            RoutingError::InfeasibleCapacity { .. } => ErrorKind::InfeasibleCapacity,
            RoutingError::NoSolutionFound { .. } => ErrorKind::NoSolutionFound,
        }
    }
}

/// Failure of a remote distance oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no API key configured for the distance oracle")]
    MissingApiKey,
    #[error("distance oracle request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not decode distance oracle response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("distance oracle unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the key/value store behind the temporal cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cache store unreachable: {0}")]
    Unreachable(String),
    #[error("cache store lock poisoned")]
    Poisoned,
    #[error("cache store command failed: {0}")]
    Command(String),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid depot location: {0}")]
    Depot(#[from] ValidationError),
}
