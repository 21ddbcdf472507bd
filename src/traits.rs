//! Core domain traits for the routing core.
//!
//! These are intentionally minimal. Callers implement [`Stop`] for their own
//! recipient types; the remote distance service sits behind
//! [`DistanceOracle`]; the solver reads costs and demands through
//! [`CostLookup`] and [`DemandLookup`].

use std::hash::Hash;

use chrono::{DateTime, Local};

use crate::coordinate::Coordinate;
use crate::error::OracleError;

/// Unique identifier for stops.
pub trait Id: Clone + Eq + Hash {}

impl<T> Id for T where T: Clone + Eq + Hash {}

/// A delivery stop: something with an identity, a fixed location and a
/// package count.
pub trait Stop {
    type Id: Id;

    fn id(&self) -> &Self::Id;

    /// Location of the recipient.
    fn location(&self) -> Coordinate;

    /// Number of packages delivered at this stop.
    fn demand(&self) -> u32 {
        1
    }
}

/// One origin×destination matrix request sent to the oracle.
#[derive(Debug, Clone, Copy)]
pub struct OracleQuery<'a> {
    pub origins: &'a [Coordinate],
    pub destinations: &'a [Coordinate],
    pub use_traffic: bool,
    pub departure_time: Option<DateTime<Local>>,
}

/// Result for a single origin/destination pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOutcome {
    Route {
        distance_meters: i64,
        duration_seconds: i64,
    },
    Failed(String),
}

/// An element of an oracle response, indexed into the query's slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleElement {
    pub origin_index: usize,
    pub destination_index: usize,
    pub outcome: ElementOutcome,
}

/// Remote distance/duration service.
///
/// A call may fail as a whole, or succeed with some elements marked failed
/// or missing. Callers must not assume the response covers every pair.
pub trait DistanceOracle {
    fn route_matrix(&self, query: &OracleQuery<'_>) -> Result<Vec<OracleElement>, OracleError>;
}

impl<T: DistanceOracle + ?Sized> DistanceOracle for &T {
    fn route_matrix(&self, query: &OracleQuery<'_>) -> Result<Vec<OracleElement>, OracleError> {
        (**self).route_matrix(query)
    }
}

/// Arc cost between two model nodes.
pub trait CostLookup: Sync {
    fn cost(&self, from: usize, to: usize) -> i64;
}

/// Demand of a model node. The depot has demand 0.
pub trait DemandLookup: Sync {
    fn demand(&self, index: usize) -> i64;
}

impl CostLookup for Vec<Vec<i64>> {
    fn cost(&self, from: usize, to: usize) -> i64 {
        self[from][to]
    }
}

impl DemandLookup for Vec<i64> {
    fn demand(&self, index: usize) -> i64 {
        self[index]
    }
}
