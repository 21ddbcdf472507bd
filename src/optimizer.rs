//! Request-level entry points: fetch matrices, solve, annotate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::balance::{self, BalanceStats};
use crate::cache::TemporalCache;
use crate::config::Settings;
use crate::coordinate::Coordinate;
use crate::cost::CostWeights;
use crate::error::{OracleError, RoutingError, ValidationError};
use crate::matrix::{MatrixProvider, MatrixStatus};
use crate::oracle::RoutesApiClient;
use crate::profiler::{ProfileSummary, Profiler};
use crate::route_solver::{self, CvrpRoute, Fleet, Leg, RouteSolver};
use crate::solver::{GuidedLocalSearch, VehicleRoutingSolver};
use crate::traits::{DistanceOracle, Id, Stop};

/// Ready-made stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery<I> {
    pub id: I,
    pub location: Coordinate,
    pub demand: u32,
}

impl<I: Id> Delivery<I> {
    /// A single-package delivery.
    pub fn new(id: I, location: Coordinate) -> Self {
        Self {
            id,
            location,
            demand: 1,
        }
    }

    pub fn with_demand(mut self, demand: u32) -> Self {
        self.demand = demand;
        self
    }
}

impl<I: Id> Stop for Delivery<I> {
    type Id = I;

    fn id(&self) -> &I {
        &self.id
    }

    fn location(&self) -> Coordinate {
        self.location
    }

    fn demand(&self) -> u32 {
        self.demand
    }
}

/// Options shared by both request kinds.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Falls back to the configured depot.
    pub depot: Option<Coordinate>,
    /// Falls back to the configured timeout for the problem kind. Zero
    /// counts as unset.
    pub timeout: Option<Duration>,
    pub use_traffic: bool,
    pub departure_time: Option<DateTime<Local>>,
}

impl RequestOptions {
    /// The request's timeout, or `default` when it is absent or zero.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout.filter(|timeout| !timeout.is_zero()).unwrap_or(default)
    }
}

#[derive(Debug, Clone)]
pub struct TspRequest<S> {
    pub stops: Vec<S>,
    pub options: RequestOptions,
}

impl<S: Stop> TspRequest<S> {
    pub fn new(stops: Vec<S>) -> Self {
        Self {
            stops,
            options: RequestOptions::default(),
        }
    }

    pub fn depot(mut self, depot: Coordinate) -> Self {
        self.options.depot = Some(depot);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_traffic(mut self, departure_time: Option<DateTime<Local>>) -> Self {
        self.options.use_traffic = true;
        self.options.departure_time = departure_time;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CvrpRequest<S> {
    pub stops: Vec<S>,
    pub num_vehicles: usize,
    pub capacity_per_vehicle: u32,
    pub options: RequestOptions,
}

impl<S: Stop> CvrpRequest<S> {
    pub fn new(stops: Vec<S>, num_vehicles: usize, capacity_per_vehicle: u32) -> Self {
        Self {
            stops,
            num_vehicles,
            capacity_per_vehicle,
            options: RequestOptions::default(),
        }
    }

    pub fn depot(mut self, depot: Coordinate) -> Self {
        self.options.depot = Some(depot);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_traffic(mut self, departure_time: Option<DateTime<Local>>) -> Self {
        self.options.use_traffic = true;
        self.options.departure_time = departure_time;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TspResult<I> {
    pub sequence: Vec<I>,
    pub legs: Vec<Leg>,
    pub total_distance_meters: i64,
    pub total_duration_seconds: i64,
    pub stop_count: usize,
    pub matrix_status: MatrixStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiling: Option<ProfileSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvrpResult<I> {
    pub routes: Vec<CvrpRoute<I>>,
    pub total_distance_meters: i64,
    pub total_duration_seconds: i64,
    pub total_stops: usize,
    pub balance: BalanceStats,
    pub matrix_status: MatrixStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiling: Option<ProfileSummary>,
}

/// Wires matrices, cost model, solver and balance analysis together.
pub struct RouteOptimizer<O, V = GuidedLocalSearch> {
    settings: Settings,
    matrices: MatrixProvider<O>,
    solver: RouteSolver<V>,
}

impl RouteOptimizer<RoutesApiClient> {
    /// Optimizer backed by the Routes API client described in `settings`.
    pub fn from_settings(
        settings: Settings,
        cache: Arc<dyn TemporalCache>,
    ) -> Result<Self, OracleError> {
        let oracle = RoutesApiClient::new(settings.oracle.clone())?;
        Ok(Self::new(settings, oracle, cache))
    }
}

impl<O: DistanceOracle> RouteOptimizer<O> {
    pub fn new(settings: Settings, oracle: O, cache: Arc<dyn TemporalCache>) -> Self {
        let matrices = MatrixProvider::new(oracle, cache).with_batch_delay(settings.batch_delay);
        Self {
            settings,
            matrices,
            solver: RouteSolver::new(),
        }
    }
}

impl<O: DistanceOracle, V: VehicleRoutingSolver> RouteOptimizer<O, V> {
    pub fn from_parts(settings: Settings, matrices: MatrixProvider<O>, solver: RouteSolver<V>) -> Self {
        Self {
            settings,
            matrices,
            solver,
        }
    }

    /// Override the default 0.5/0.5 distance/duration weighting.
    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.solver = self.solver.with_weights(weights);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn matrix_provider(&self) -> &MatrixProvider<O> {
        &self.matrices
    }

    pub fn optimize_tsp<S: Stop>(&self, request: &TspRequest<S>) -> Result<TspResult<S::Id>, RoutingError> {
        if request.stops.is_empty() {
            return Err(ValidationError::EmptyStops.into());
        }
        let options = &request.options;
        let timeout = options.effective_timeout(self.settings.tsp_timeout);
        let locations = self.locations(options.depot, &request.stops);

        let mut profiler = Profiler::new(self.settings.enable_profiling);
        let matrices = profiler.profile("distance matrix", || {
            self.matrices
                .matrix_for(&locations, options.use_traffic, options.departure_time)
        })?;
        let route = profiler.profile("solver", || {
            self.solver.solve_tsp(&request.stops, &matrices, timeout)
        })?;
        profiler.log_summary();

        Ok(TspResult {
            stop_count: route.stop_count(),
            sequence: route.stops,
            legs: route.legs,
            total_distance_meters: route.total_distance_meters,
            total_duration_seconds: route.total_duration_seconds,
            matrix_status: matrices.status,
            profiling: profiler.summary(),
        })
    }

    pub fn optimize_cvrp<S: Stop>(
        &self,
        request: &CvrpRequest<S>,
    ) -> Result<CvrpResult<S::Id>, RoutingError> {
        if request.stops.is_empty() {
            return Err(ValidationError::EmptyStops.into());
        }
        let fleet = Fleet::new(request.num_vehicles, request.capacity_per_vehicle)?;
        let demands = route_solver::check_demands(&request.stops)?;
        route_solver::check_capacity(&demands, fleet)?;

        let options = &request.options;
        let timeout = options.effective_timeout(self.settings.cvrp_timeout);
        let locations = self.locations(options.depot, &request.stops);

        let mut profiler = Profiler::new(self.settings.enable_profiling);
        let matrices = profiler.profile("distance matrix", || {
            self.matrices
                .matrix_for(&locations, options.use_traffic, options.departure_time)
        })?;
        let solution = profiler.profile("solver", || {
            self.solver.solve_cvrp(&request.stops, fleet, &matrices, timeout)
        })?;
        let balance = balance::analyze(&solution.loads());
        profiler.log_summary();

        Ok(CvrpResult {
            total_distance_meters: solution.total_distance_meters,
            total_duration_seconds: solution.total_duration_seconds,
            total_stops: request.stops.len(),
            routes: solution.routes,
            balance,
            matrix_status: matrices.status,
            profiling: profiler.summary(),
        })
    }

    /// Depot first, then stops in request order.
    fn locations<S: Stop>(&self, depot: Option<Coordinate>, stops: &[S]) -> Vec<Coordinate> {
        std::iter::once(depot.unwrap_or(self.settings.depot))
            .chain(stops.iter().map(Stop::location))
            .collect()
    }
}
