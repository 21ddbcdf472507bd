//! TSP and CVRP on top of the routing engine.
//!
//! Both problems share one model: node 0 is the depot and node `i + 1` is
//! `stops[i]`. TSP is the single-vehicle case without capacity. Costs come
//! from the weighted distance/duration matrix, but reported totals are always
//! recomputed from the original distance and duration matrices.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::balance::round_to;
use crate::cost::{self, CostWeights};
use crate::error::{ProblemKind, RoutingError, ValidationError};
use crate::matrix::TravelMatrices;
use crate::solver::{DEPOT, GuidedLocalSearch, RoutingModel, SearchParameters, VehicleRoutingSolver};
use crate::traits::Stop;

/// One hop of a route, in meters and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub distance_meters: i64,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route<I> {
    pub vehicle_index: usize,
    /// Stops in visiting order, depot excluded.
    pub stops: Vec<I>,
    /// Depot → first stop, …, last stop → depot.
    pub legs: Vec<Leg>,
    pub total_distance_meters: i64,
    pub total_duration_seconds: i64,
    pub total_load: u64,
}

impl<I> Route<I> {
    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvrpRoute<I> {
    #[serde(flatten)]
    pub route: Route<I>,
    pub avg_distance_per_stop: f64,
    /// Share of capacity used, in percent.
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvrpSolution<I> {
    /// Used vehicles only.
    pub routes: Vec<CvrpRoute<I>>,
    pub total_distance_meters: i64,
    pub total_duration_seconds: i64,
}

impl<I> CvrpSolution<I> {
    pub fn loads(&self) -> Vec<u64> {
        self.routes.iter().map(|route| route.route.total_load).collect()
    }
}

/// Vehicle count and uniform capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fleet {
    pub num_vehicles: usize,
    pub capacity_per_vehicle: u32,
}

impl Fleet {
    pub fn new(num_vehicles: usize, capacity_per_vehicle: u32) -> Result<Self, ValidationError> {
        if num_vehicles == 0 {
            return Err(ValidationError::InvalidVehicleCount);
        }
        if capacity_per_vehicle == 0 {
            return Err(ValidationError::InvalidCapacity);
        }
        Ok(Self {
            num_vehicles,
            capacity_per_vehicle,
        })
    }

    pub fn total_capacity(&self) -> u64 {
        self.num_vehicles as u64 * u64::from(self.capacity_per_vehicle)
    }
}

/// Reject demand that cannot fit in the fleet, before any solver work.
pub fn check_capacity(demands: &[u32], fleet: Fleet) -> Result<(), RoutingError> {
    let demand: u64 = demands.iter().copied().map(u64::from).sum();
    let capacity = fleet.total_capacity();
    if demand > capacity {
        return Err(RoutingError::InfeasibleCapacity { demand, capacity });
    }
    Ok(())
}

/// Every stop must carry at least one package.
pub fn check_demands<S: Stop>(stops: &[S]) -> Result<Vec<u32>, ValidationError> {
    stops
        .iter()
        .enumerate()
        .map(|(index, stop)| match stop.demand() {
            0 => Err(ValidationError::ZeroDemand { index }),
            demand => Ok(demand),
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct RouteSolver<V = GuidedLocalSearch> {
    engine: V,
    weights: CostWeights,
}

impl RouteSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: VehicleRoutingSolver> RouteSolver<V> {
    pub fn with_engine(engine: V) -> Self {
        Self {
            engine,
            weights: CostWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn weights(&self) -> CostWeights {
        self.weights
    }

    /// Shortest single-vehicle tour from the depot through every stop.
    pub fn solve_tsp<S: Stop>(
        &self,
        stops: &[S],
        matrices: &TravelMatrices,
        time_limit: Duration,
    ) -> Result<Route<S::Id>, RoutingError> {
        if stops.is_empty() {
            return Err(ValidationError::EmptyStops.into());
        }
        check_dimensions(matrices, stops.len() + 1)?;

        let costs = cost::combine(&matrices.distances, &matrices.durations, self.weights)?;
        let model = RoutingModel::new(stops.len() + 1, 1, &costs);
        let assignment = self
            .engine
            .solve(&model, &SearchParameters::with_time_limit(time_limit))
            .ok_or(RoutingError::NoSolutionFound {
                problem: ProblemKind::Tsp,
                timeout: time_limit,
            })?;

        let nodes = assignment.routes.into_iter().next().unwrap_or_default();
        let route = build_route(0, &nodes, stops, matrices);
        info!(
            stops = route.stop_count(),
            distance_m = route.total_distance_meters,
            duration_s = route.total_duration_seconds,
            "TSP solved"
        );
        Ok(route)
    }

    /// Partition stops over the fleet without exceeding any vehicle's capacity.
    pub fn solve_cvrp<S: Stop>(
        &self,
        stops: &[S],
        fleet: Fleet,
        matrices: &TravelMatrices,
        time_limit: Duration,
    ) -> Result<CvrpSolution<S::Id>, RoutingError> {
        if stops.is_empty() {
            return Err(ValidationError::EmptyStops.into());
        }
        let demands = check_demands(stops)?;
        check_capacity(&demands, fleet)?;
        check_dimensions(matrices, stops.len() + 1)?;

        let costs = cost::combine(&matrices.distances, &matrices.durations, self.weights)?;
        let node_demands: Vec<i64> = std::iter::once(0)
            .chain(demands.iter().copied().map(i64::from))
            .collect();
        let model = RoutingModel::new(stops.len() + 1, fleet.num_vehicles, &costs)
            .with_capacity(&node_demands, i64::from(fleet.capacity_per_vehicle));

        let assignment = self
            .engine
            .solve(&model, &SearchParameters::with_time_limit(time_limit))
            .ok_or(RoutingError::NoSolutionFound {
                problem: ProblemKind::Cvrp,
                timeout: time_limit,
            })?;

        let routes: Vec<CvrpRoute<S::Id>> = assignment
            .routes
            .iter()
            .enumerate()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(vehicle_index, nodes)| {
                let route = build_route(vehicle_index, nodes, stops, matrices);
                let avg_distance_per_stop =
                    round_to(route.total_distance_meters as f64 / route.stop_count() as f64, 2);
                let efficiency_score = round_to(
                    route.total_load as f64 / f64::from(fleet.capacity_per_vehicle) * 100.0,
                    1,
                );
                CvrpRoute {
                    route,
                    avg_distance_per_stop,
                    efficiency_score,
                }
            })
            .collect();

        let solution = CvrpSolution {
            total_distance_meters: routes.iter().map(|r| r.route.total_distance_meters).sum(),
            total_duration_seconds: routes.iter().map(|r| r.route.total_duration_seconds).sum(),
            routes,
        };
        info!(
            routes = solution.routes.len(),
            distance_m = solution.total_distance_meters,
            duration_s = solution.total_duration_seconds,
            "CVRP solved"
        );
        Ok(solution)
    }
}

fn check_dimensions(matrices: &TravelMatrices, expected: usize) -> Result<(), ValidationError> {
    let square = |matrix: &Vec<Vec<i64>>| {
        matrix.len() == expected && matrix.iter().all(|row| row.len() == expected)
    };
    if square(&matrices.distances) && square(&matrices.durations) {
        Ok(())
    } else {
        Err(ValidationError::MatrixSize {
            expected,
            rows: matrices.distances.len(),
        })
    }
}

fn build_route<S: Stop>(
    vehicle_index: usize,
    nodes: &[usize],
    stops: &[S],
    matrices: &TravelMatrices,
) -> Route<S::Id> {
    let path: Vec<usize> = std::iter::once(DEPOT)
        .chain(nodes.iter().copied())
        .chain(std::iter::once(DEPOT))
        .collect();
    let legs: Vec<Leg> = path
        .windows(2)
        .map(|arc| Leg {
            distance_meters: matrices.distances[arc[0]][arc[1]],
            duration_seconds: matrices.durations[arc[0]][arc[1]],
        })
        .collect();

    Route {
        vehicle_index,
        stops: nodes.iter().map(|&node| stops[node - 1].id().clone()).collect(),
        total_distance_meters: legs.iter().map(|leg| leg.distance_meters).sum(),
        total_duration_seconds: legs.iter().map(|leg| leg.duration_seconds).sum(),
        total_load: nodes
            .iter()
            .map(|&node| u64::from(stops[node - 1].demand()))
            .sum(),
        legs,
    }
}
