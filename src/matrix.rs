//! Distance/duration matrices backed by the oracle, the temporal cache and
//! the haversine fallback.
//!
//! The oracle limits how many origin×destination elements one call may
//! carry, so large requests are split into batches that are issued
//! sequentially with a delay between them. Within a batch only cache misses
//! are sent to the oracle, and anything the oracle cannot answer is filled
//! from the straight-line estimate. The returned matrices are always fully
//! populated; `status` records whether any cell had to be estimated.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::TemporalCache;
use crate::coordinate::Coordinate;
use crate::error::ValidationError;
use crate::haversine::HaversineMatrix;
use crate::traits::{DistanceOracle, ElementOutcome, OracleQuery};

/// Element ceiling per oracle call with traffic-aware routing.
pub const TRAFFIC_MAX_ELEMENTS: usize = 100;
/// Element ceiling per oracle call without traffic.
pub const STANDARD_MAX_ELEMENTS: usize = 625;

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

pub type Matrix = Vec<Vec<i64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatrixStatus {
    Ok,
    Fallback,
}

impl MatrixStatus {
    pub const fn merge(self, other: MatrixStatus) -> MatrixStatus {
        match (self, other) {
            (MatrixStatus::Ok, MatrixStatus::Ok) => MatrixStatus::Ok,
            _ => MatrixStatus::Fallback,
        }
    }
}

/// Distances in meters and durations in seconds, indexed `[origin][destination]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelMatrices {
    pub distances: Matrix,
    pub durations: Matrix,
    pub status: MatrixStatus,
}

impl TravelMatrices {
    fn zeroed(rows: usize, cols: usize) -> Self {
        Self {
            distances: vec![vec![0; cols]; rows],
            durations: vec![vec![0; cols]; rows],
            status: MatrixStatus::Ok,
        }
    }

    fn set(&mut self, i: usize, j: usize, distance: i64, duration: i64) {
        self.distances[i][j] = distance;
        self.durations[i][j] = duration;
    }

    fn merge_block(&mut self, batch: &Batch, block: TravelMatrices) {
        for (bi, i) in batch.origins.clone().enumerate() {
            for (bj, j) in batch.destinations.clone().enumerate() {
                self.set(i, j, block.distances[bi][bj], block.durations[bi][bj]);
            }
        }
        self.status = self.status.merge(block.status);
    }
}

#[derive(Debug, Clone)]
pub struct MatrixRequest {
    pub origins: Vec<Coordinate>,
    pub destinations: Vec<Coordinate>,
    pub use_traffic: bool,
    pub departure_time: Option<DateTime<Local>>,
}

impl MatrixRequest {
    pub fn new(origins: Vec<Coordinate>, destinations: Vec<Coordinate>) -> Self {
        Self {
            origins,
            destinations,
            use_traffic: false,
            departure_time: None,
        }
    }

    /// Square request: every location to every location.
    pub fn square(locations: Vec<Coordinate>) -> Self {
        Self::new(locations.clone(), locations)
    }

    /// Enable traffic-aware durations, departing at `departure_time` (now when `None`).
    pub fn with_traffic(mut self, departure_time: Option<DateTime<Local>>) -> Self {
        self.use_traffic = true;
        self.departure_time = departure_time;
        self
    }
}

/// A rectangular slice of the full matrix sent as one oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub origins: Range<usize>,
    pub destinations: Range<usize>,
}

pub const fn max_elements(use_traffic: bool) -> usize {
    if use_traffic {
        TRAFFIC_MAX_ELEMENTS
    } else {
        STANDARD_MAX_ELEMENTS
    }
}

/// Split an `n_origins × n_destinations` grid into batches of at most
/// `max_elements` elements.
///
/// Destinations are chunked with all origins fixed. When the origins alone
/// exceed the ceiling they are tiled too.
pub fn plan_batches(n_origins: usize, n_destinations: usize, max_elements: usize) -> Vec<Batch> {
    let max_elements = max_elements.max(1);
    let origin_chunk = n_origins.min(max_elements).max(1);
    let destination_chunk = (max_elements / origin_chunk).max(1);

    let mut batches = Vec::new();
    for origin_start in (0..n_origins).step_by(origin_chunk) {
        let origins = origin_start..(origin_start + origin_chunk).min(n_origins);
        for destination_start in (0..n_destinations).step_by(destination_chunk) {
            let destinations =
                destination_start..(destination_start + destination_chunk).min(n_destinations);
            batches.push(Batch {
                origins: origins.clone(),
                destinations,
            });
        }
    }
    batches
}

pub struct MatrixProvider<O> {
    oracle: O,
    cache: Arc<dyn TemporalCache>,
    fallback: HaversineMatrix,
    batch_delay: Duration,
}

impl<O: DistanceOracle> MatrixProvider<O> {
    pub fn new(oracle: O, cache: Arc<dyn TemporalCache>) -> Self {
        Self {
            oracle,
            cache,
            fallback: HaversineMatrix::default(),
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    pub fn with_fallback(mut self, fallback: HaversineMatrix) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn cache(&self) -> &Arc<dyn TemporalCache> {
        &self.cache
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Square matrices over `locations` (depot first by convention).
    pub fn matrix_for(
        &self,
        locations: &[Coordinate],
        use_traffic: bool,
        departure_time: Option<DateTime<Local>>,
    ) -> Result<TravelMatrices, ValidationError> {
        let mut request = MatrixRequest::square(locations.to_vec());
        if use_traffic {
            request = request.with_traffic(departure_time);
        }
        self.compute_matrix(&request)
    }

    pub fn compute_matrix(&self, request: &MatrixRequest) -> Result<TravelMatrices, ValidationError> {
        if request.origins.is_empty() || request.destinations.is_empty() {
            return Err(ValidationError::EmptyLocations);
        }

        let n_origins = request.origins.len();
        let n_destinations = request.destinations.len();
        let limit = max_elements(request.use_traffic);
        info!(
            origins = n_origins,
            destinations = n_destinations,
            elements = n_origins * n_destinations,
            traffic = request.use_traffic,
            limit,
            "computing route matrix"
        );

        let batches = plan_batches(n_origins, n_destinations, limit);
        if batches.len() > 1 {
            info!(batches = batches.len(), "element count exceeds limit; batching");
        }

        let mut matrices = TravelMatrices::zeroed(n_origins, n_destinations);
        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                thread::sleep(self.batch_delay);
            }
            debug!(
                origins = ?batch.origins,
                destinations = ?batch.destinations,
                "processing batch"
            );
            let block = self.compute_block(
                &request.origins[batch.origins.clone()],
                &request.destinations[batch.destinations.clone()],
                request.use_traffic,
                request.departure_time,
            );
            matrices.merge_block(batch, block);
        }

        if matrices.status == MatrixStatus::Fallback {
            warn!("route matrix contains straight-line estimates");
        }
        Ok(matrices)
    }

    /// One oracle call's worth of cells.
    fn compute_block(
        &self,
        origins: &[Coordinate],
        destinations: &[Coordinate],
        use_traffic: bool,
        departure_time: Option<DateTime<Local>>,
    ) -> TravelMatrices {
        let mut block = TravelMatrices::zeroed(origins.len(), destinations.len());
        let mut pending = HashSet::new();
        let mut hits = 0usize;

        for (i, origin) in origins.iter().enumerate() {
            for (j, destination) in destinations.iter().enumerate() {
                if origin == destination {
                    continue;
                }
                match self.cached(*origin, *destination, use_traffic, departure_time) {
                    Some((distance, duration)) => {
                        block.set(i, j, distance, duration);
                        hits += 1;
                    }
                    None => {
                        pending.insert((i, j));
                    }
                }
            }
        }

        if hits > 0 {
            info!(hits, total = origins.len() * destinations.len(), "cache hits");
        }
        if pending.is_empty() {
            return block;
        }

        let rows = sorted_unique(pending.iter().map(|&(i, _)| i));
        let cols = sorted_unique(pending.iter().map(|&(_, j)| j));
        let query_origins: Vec<Coordinate> = rows.iter().map(|&i| origins[i]).collect();
        let query_destinations: Vec<Coordinate> = cols.iter().map(|&j| destinations[j]).collect();
        let query = OracleQuery {
            origins: &query_origins,
            destinations: &query_destinations,
            use_traffic,
            departure_time,
        };

        debug!(
            pairs = pending.len(),
            origins = rows.len(),
            destinations = cols.len(),
            "fetching pairs from oracle"
        );
        match self.oracle.route_matrix(&query) {
            Ok(elements) => {
                for element in elements {
                    let (Some(&i), Some(&j)) = (
                        rows.get(element.origin_index),
                        cols.get(element.destination_index),
                    ) else {
                        warn!(
                            origin_index = element.origin_index,
                            destination_index = element.destination_index,
                            "oracle returned an element outside the query"
                        );
                        continue;
                    };
                    if !pending.contains(&(i, j)) {
                        continue;
                    }
                    match element.outcome {
                        ElementOutcome::Route {
                            distance_meters,
                            duration_seconds,
                        } => {
                            pending.remove(&(i, j));
                            block.set(i, j, distance_meters, duration_seconds);
                            self.store(
                                origins[i],
                                destinations[j],
                                distance_meters,
                                duration_seconds,
                                use_traffic,
                                departure_time,
                            );
                        }
                        ElementOutcome::Failed(reason) => {
                            warn!(origin = i, destination = j, %reason, "oracle failed for pair");
                        }
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "oracle request failed");
            }
        }

        if !pending.is_empty() {
            warn!(pairs = pending.len(), "using straight-line fallback");
            for (i, j) in pending {
                let (distance, duration) = self.fallback.estimate(origins[i], destinations[j]);
                block.set(i, j, distance, duration);
            }
            block.status = MatrixStatus::Fallback;
        }
        block
    }

    fn cached(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        use_traffic: bool,
        departure_time: Option<DateTime<Local>>,
    ) -> Option<(i64, i64)> {
        let distance = self.cache.base_distance(origin, destination)?;
        let duration = if use_traffic {
            self.cache
                .traffic_duration(origin, destination, departure_time)?
        } else {
            self.fallback.duration_seconds(distance)
        };
        Some((distance, duration))
    }

    fn store(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        distance: i64,
        duration: i64,
        use_traffic: bool,
        departure_time: Option<DateTime<Local>>,
    ) {
        self.cache.set_base_distance(origin, destination, distance);
        if use_traffic {
            self.cache
                .set_traffic_duration(origin, destination, duration, departure_time);
        }
    }
}

fn sorted_unique(indices: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut indices: Vec<usize> = indices.collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}
