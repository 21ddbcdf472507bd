//! In-memory distance oracle with scripted failures.
//!
//! Successful elements report a "road" distance of 1.3× the straight line
//! and a duration at 30 km/h, so tests can tell them apart from the 60 km/h
//! straight-line fallback.

use std::sync::Mutex;

use courier_routing::coordinate::Coordinate;
use courier_routing::error::OracleError;
use courier_routing::haversine::HaversineMatrix;
use courier_routing::traits::{DistanceOracle, ElementOutcome, OracleElement, OracleQuery};

#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Every call fails as a whole.
    FailCall,
    /// These directed pairs come back as failed elements.
    FailPairs(Vec<(Coordinate, Coordinate)>),
    /// These directed pairs are missing from the response.
    OmitPairs(Vec<(Coordinate, Coordinate)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub origins: usize,
    pub destinations: usize,
    pub use_traffic: bool,
}

impl RecordedCall {
    pub fn elements(&self) -> usize {
        self.origins * self.destinations
    }
}

#[derive(Debug)]
pub struct ScriptedOracle {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedOracle {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Script::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(Script::FailCall)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Road distance and duration this oracle reports for a pair.
    pub fn road(from: Coordinate, to: Coordinate) -> (i64, i64) {
        let meters = HaversineMatrix::distance_meters(from, to) * 13 / 10;
        (meters, meters * 3600 / 30_000)
    }

    fn scripted(list: &[(Coordinate, Coordinate)], from: Coordinate, to: Coordinate) -> bool {
        list.iter().any(|&(a, b)| a == from && b == to)
    }
}

impl DistanceOracle for ScriptedOracle {
    fn route_matrix(&self, query: &OracleQuery<'_>) -> Result<Vec<OracleElement>, OracleError> {
        self.calls.lock().unwrap().push(RecordedCall {
            origins: query.origins.len(),
            destinations: query.destinations.len(),
            use_traffic: query.use_traffic,
        });

        if matches!(self.script, Script::FailCall) {
            return Err(OracleError::Unavailable("scripted outage".to_string()));
        }

        let mut elements = Vec::new();
        for (i, &from) in query.origins.iter().enumerate() {
            for (j, &to) in query.destinations.iter().enumerate() {
                let outcome = match &self.script {
                    Script::OmitPairs(pairs) if Self::scripted(pairs, from, to) => continue,
                    Script::FailPairs(pairs) if Self::scripted(pairs, from, to) => {
                        ElementOutcome::Failed("ROUTE_NOT_FOUND".to_string())
                    }
                    _ => {
                        let (distance_meters, duration_seconds) = Self::road(from, to);
                        ElementOutcome::Route {
                            distance_meters,
                            duration_seconds,
                        }
                    }
                };
                elements.push(OracleElement {
                    origin_index: i,
                    destination_index: j,
                    outcome,
                });
            }
        }
        Ok(elements)
    }
}
