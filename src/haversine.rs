//! Haversine distance fallback (used when the oracle is unavailable).
//!
//! Uses great-circle distance and estimates travel time from an assumed
//! speed. Less accurate than road routing (ignores roads) but always
//! available.

use crate::coordinate::Coordinate;
use crate::traits::{DistanceOracle, ElementOutcome, OracleElement, OracleQuery};
use crate::error::OracleError;

/// Average driving speed assumed when no duration data is available.
pub const ASSUMED_SPEED_KMH: u32 = 60;

/// Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance and speed-based duration estimates.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: u32,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: ASSUMED_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: u32) -> Self {
        Self {
            speed_kmh: speed_kmh.max(1),
        }
    }

    /// Haversine distance between two points in whole meters (truncated).
    pub fn distance_meters(from: Coordinate, to: Coordinate) -> i64 {
        let lat1_rad = from.lat().to_radians();
        let lat2_rad = to.lat().to_radians();
        let delta_lat = (to.lat() - from.lat()).to_radians();
        let delta_lng = (to.lng() - from.lng()).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        (EARTH_RADIUS_METERS * c) as i64
    }

    /// Travel time in seconds for a distance at the assumed speed.
    ///
    /// `distance / (speed × 1000) × 3600`, truncated.
    pub fn duration_seconds(&self, distance_meters: i64) -> i64 {
        distance_meters * 3600 / (i64::from(self.speed_kmh) * 1000)
    }

    /// Distance and estimated duration for one pair.
    pub fn estimate(&self, from: Coordinate, to: Coordinate) -> (i64, i64) {
        let meters = Self::distance_meters(from, to);
        (meters, self.duration_seconds(meters))
    }
}

/// Offline oracle: every pair succeeds with a straight-line estimate.
impl DistanceOracle for HaversineMatrix {
    fn route_matrix(&self, query: &OracleQuery<'_>) -> Result<Vec<OracleElement>, OracleError> {
        let mut elements = Vec::with_capacity(query.origins.len() * query.destinations.len());
        for (i, from) in query.origins.iter().enumerate() {
            for (j, to) in query.destinations.iter().enumerate() {
                let (distance_meters, duration_seconds) = self.estimate(*from, *to);
                elements.push(OracleElement {
                    origin_index: i,
                    destination_index: j,
                    outcome: ElementOutcome::Route {
                        distance_meters,
                        duration_seconds,
                    },
                });
            }
        }
        Ok(elements)
    }
}
