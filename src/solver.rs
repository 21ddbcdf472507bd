//! Vehicle routing engine: cheapest insertion followed by guided local search.
//!
//! The engine works on node indices only. Node 0 is the depot; every other
//! node must be visited exactly once by one vehicle. Arc costs and node
//! demands are read through [`CostLookup`] and [`DemandLookup`], so the
//! engine knows nothing about coordinates or matrices.

use std::iter;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::traits::{CostLookup, DemandLookup};

pub const DEPOT: usize = 0;

#[derive(Clone, Copy)]
struct Capacity<'a> {
    demands: &'a dyn DemandLookup,
    per_vehicle: i64,
}

/// Nodes, vehicles, arc costs and an optional capacity dimension.
#[derive(Clone, Copy)]
pub struct RoutingModel<'a> {
    num_nodes: usize,
    num_vehicles: usize,
    costs: &'a dyn CostLookup,
    capacity: Option<Capacity<'a>>,
}

impl<'a> RoutingModel<'a> {
    /// `num_nodes` includes the depot.
    pub fn new(num_nodes: usize, num_vehicles: usize, costs: &'a dyn CostLookup) -> Self {
        Self {
            num_nodes,
            num_vehicles,
            costs,
            capacity: None,
        }
    }

    /// Every vehicle starts empty and may carry at most `per_vehicle`.
    pub fn with_capacity(mut self, demands: &'a dyn DemandLookup, per_vehicle: i64) -> Self {
        self.capacity = Some(Capacity {
            demands,
            per_vehicle,
        });
        self
    }

    pub const fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub const fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn arc(&self, from: usize, to: usize) -> i64 {
        self.costs.cost(from, to)
    }

    pub fn demand(&self, node: usize) -> i64 {
        self.capacity.map_or(0, |capacity| capacity.demands.demand(node))
    }

    pub fn capacity(&self) -> Option<i64> {
        self.capacity.map(|capacity| capacity.per_vehicle)
    }

    /// Cost of depot → route → depot. Empty routes cost nothing.
    pub fn route_cost(&self, route: &[usize]) -> i64 {
        path_cost(route, |from, to| self.arc(from, to))
    }

    pub fn route_load(&self, route: &[usize]) -> i64 {
        route.iter().map(|&node| self.demand(node)).sum()
    }

    pub fn total_cost(&self, routes: &[Vec<usize>]) -> i64 {
        routes.iter().map(|route| self.route_cost(route)).sum()
    }

    fn fits(&self, load: i64, demand: i64) -> bool {
        self.capacity().is_none_or(|capacity| load + demand <= capacity)
    }
}

fn path_cost(route: &[usize], arc: impl Fn(usize, usize) -> i64) -> i64 {
    if route.is_empty() {
        return 0;
    }
    iter::once(DEPOT)
        .chain(route.iter().copied())
        .zip(route.iter().copied().chain(iter::once(DEPOT)))
        .map(|(from, to)| arc(from, to))
        .sum()
}

#[derive(Debug, Clone)]
pub struct SearchParameters {
    /// Wall-clock budget for the whole search.
    pub time_limit: Duration,
    /// Scales the penalty weight relative to the average arc cost.
    pub lambda_coefficient: f64,
    /// Guided rounds without a new best before giving up early.
    pub stall_limit: usize,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(5),
            lambda_coefficient: 0.1,
            stall_limit: 500,
        }
    }
}

impl SearchParameters {
    pub fn with_time_limit(time_limit: Duration) -> Self {
        Self {
            time_limit,
            ..Self::default()
        }
    }
}

/// One node sequence per vehicle (depot excluded, possibly empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub routes: Vec<Vec<usize>>,
    pub cost: i64,
}

pub trait VehicleRoutingSolver {
    /// Best assignment found within the time limit, or `None` when no
    /// feasible assignment was found before it expired.
    fn solve(&self, model: &RoutingModel<'_>, params: &SearchParameters) -> Option<Assignment>;
}

impl<T: VehicleRoutingSolver + ?Sized> VehicleRoutingSolver for &T {
    fn solve(&self, model: &RoutingModel<'_>, params: &SearchParameters) -> Option<Assignment> {
        (**self).solve(model, params)
    }
}

/// Guided local search over 2-opt, relocate and exchange moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidedLocalSearch;

impl VehicleRoutingSolver for GuidedLocalSearch {
    fn solve(&self, model: &RoutingModel<'_>, params: &SearchParameters) -> Option<Assignment> {
        let started = Instant::now();
        let deadline = Deadline::after(started, params.time_limit);

        let mut current = cheapest_insertion(model, deadline)?;
        let mut penalties = Penalties::new(model.num_nodes());
        local_search(&mut current, &ArcCosts::plain(model, &penalties), deadline);

        let mut best_cost = model.total_cost(&current);
        let mut best = current.clone();
        let arcs = arc_count(&current);
        if arcs == 0 {
            return Some(Assignment {
                routes: best,
                cost: best_cost,
            });
        }

        let lambda = ((params.lambda_coefficient * best_cost as f64 / arcs as f64).round() as i64).max(1);
        debug!(initial_cost = best_cost, lambda, "starting guided local search");

        let mut rounds = 0usize;
        let mut stalled = 0usize;
        while !deadline.passed() && stalled < params.stall_limit {
            rounds += 1;
            penalize(&current, model, &mut penalties);
            local_search(
                &mut current,
                &ArcCosts::penalized(model, &penalties, lambda),
                deadline,
            );

            let cost = model.total_cost(&current);
            if cost < best_cost {
                best_cost = cost;
                best.clone_from(&current);
                stalled = 0;
            } else {
                stalled += 1;
            }
        }

        info!(
            nodes = model.num_nodes(),
            vehicles = model.num_vehicles(),
            cost = best_cost,
            rounds,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "guided local search finished"
        );

        Some(Assignment {
            routes: best,
            cost: best_cost,
        })
    }
}

/// Wall-clock bound on the search. Unbounded when the limit does not fit
/// in an `Instant`.
#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(start: Instant, limit: Duration) -> Self {
        Self(start.checked_add(limit))
    }

    #[cfg(test)]
    fn unbounded() -> Self {
        Self(None)
    }

    fn passed(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

fn arc_count(routes: &[Vec<usize>]) -> usize {
    routes
        .iter()
        .filter(|route| !route.is_empty())
        .map(|route| route.len() + 1)
        .sum()
}

/// Build an initial assignment by inserting each customer at its cheapest
/// capacity-feasible position. Large, remote customers go first.
///
/// `None` when a customer fits nowhere or the deadline passes first.
fn cheapest_insertion(model: &RoutingModel<'_>, deadline: Deadline) -> Option<Vec<Vec<usize>>> {
    let mut routes: Vec<Vec<usize>> = vec![Vec::new(); model.num_vehicles()];
    let mut loads = vec![0i64; model.num_vehicles()];

    let mut order: Vec<usize> = (1..model.num_nodes()).collect();
    order.sort_by_key(|&node| {
        let round_trip = model.arc(DEPOT, node) + model.arc(node, DEPOT);
        (std::cmp::Reverse(model.demand(node)), std::cmp::Reverse(round_trip))
    });

    let costs = |from: usize, to: usize| model.arc(from, to);
    for node in order {
        if deadline.passed() {
            debug!("deadline passed during construction");
            return None;
        }
        let demand = model.demand(node);
        let mut best: Option<(usize, usize, i64)> = None;

        for (vehicle, route) in routes.iter().enumerate() {
            if !model.fits(loads[vehicle], demand) {
                continue;
            }
            for position in 0..=route.len() {
                let added = insertion_cost(route, position, node, costs);
                if best.is_none_or(|(_, _, cost)| added < cost) {
                    best = Some((vehicle, position, added));
                }
            }
        }

        let (vehicle, position, _) = best?;
        routes[vehicle].insert(position, node);
        loads[vehicle] += demand;
    }

    Some(routes)
}

/// Penalty counters for every directed arc.
#[derive(Debug, Clone)]
struct Penalties {
    size: usize,
    counts: Vec<u32>,
}

impl Penalties {
    fn new(size: usize) -> Self {
        Self {
            size,
            counts: vec![0; size * size],
        }
    }

    fn get(&self, from: usize, to: usize) -> u32 {
        self.counts[from * self.size + to]
    }

    fn bump(&mut self, from: usize, to: usize) {
        self.counts[from * self.size + to] += 1;
    }
}

/// Penalize the arcs of `routes` with maximal utility `cost / (1 + penalty)`.
fn penalize(routes: &[Vec<usize>], model: &RoutingModel<'_>, penalties: &mut Penalties) {
    let arcs: Vec<(usize, usize)> = routes
        .iter()
        .filter(|route| !route.is_empty())
        .flat_map(|route| {
            iter::once(DEPOT)
                .chain(route.iter().copied())
                .zip(route.iter().copied().chain(iter::once(DEPOT)))
        })
        .collect();

    let utility = |(from, to): (usize, usize)| {
        model.arc(from, to) as f64 / (1.0 + f64::from(penalties.get(from, to)))
    };
    let max_utility = arcs
        .iter()
        .map(|&arc| utility(arc))
        .fold(f64::NEG_INFINITY, f64::max);

    let chosen: Vec<(usize, usize)> = arcs
        .into_iter()
        .filter(|&arc| utility(arc) >= max_utility - 1e-9)
        .collect();
    for (from, to) in chosen {
        penalties.bump(from, to);
    }
}

/// Arc costs seen by local search: true cost plus `lambda × penalty`.
struct ArcCosts<'m> {
    model: &'m RoutingModel<'m>,
    penalties: &'m Penalties,
    lambda: i64,
}

impl<'m> ArcCosts<'m> {
    fn plain(model: &'m RoutingModel<'m>, penalties: &'m Penalties) -> Self {
        Self {
            model,
            penalties,
            lambda: 0,
        }
    }

    fn penalized(model: &'m RoutingModel<'m>, penalties: &'m Penalties, lambda: i64) -> Self {
        Self {
            model,
            penalties,
            lambda,
        }
    }

    fn arc(&self, from: usize, to: usize) -> i64 {
        let cost = self.model.arc(from, to);
        if self.lambda == 0 {
            cost
        } else {
            cost + self.lambda * i64::from(self.penalties.get(from, to))
        }
    }
}

fn neighbours(route: &[usize], position: usize) -> (usize, usize) {
    let prev = if position == 0 { DEPOT } else { route[position - 1] };
    let next = route.get(position + 1).copied().unwrap_or(DEPOT);
    (prev, next)
}

/// Added cost of inserting `node` before `route[position]`.
fn insertion_cost(
    route: &[usize],
    position: usize,
    node: usize,
    arc: impl Fn(usize, usize) -> i64,
) -> i64 {
    let prev = if position == 0 { DEPOT } else { route[position - 1] };
    let next = route.get(position).copied().unwrap_or(DEPOT);
    arc(prev, node) + arc(node, next) - arc(prev, next)
}

/// Saved cost of removing `route[position]`.
fn removal_gain(route: &[usize], position: usize, arc: impl Fn(usize, usize) -> i64) -> i64 {
    let node = route[position];
    let (prev, next) = neighbours(route, position);
    arc(prev, node) + arc(node, next) - arc(prev, next)
}

// ============================================================================
// Local Search Operators
// ============================================================================

/// 2-opt: reverse a segment of one route.
/// Returns true if an improvement was made.
///
/// Costs may be asymmetric, so the reversed segment's internal arcs are
/// re-priced in the opposite direction.
fn two_opt_improve(route: &mut [usize], costs: &ArcCosts<'_>, deadline: Deadline) -> bool {
    if route.len() < 2 {
        return false;
    }

    let path: Vec<usize> = iter::once(DEPOT)
        .chain(route.iter().copied())
        .chain(iter::once(DEPOT))
        .collect();
    let m = path.len();

    for i in 0..m - 3 {
        if deadline.passed() {
            return false;
        }
        let mut forward = 0;
        let mut backward = 0;
        for j in i + 2..m - 1 {
            forward += costs.arc(path[j - 1], path[j]);
            backward += costs.arc(path[j], path[j - 1]);

            let before = costs.arc(path[i], path[i + 1]) + forward + costs.arc(path[j], path[j + 1]);
            let after = costs.arc(path[i], path[j]) + backward + costs.arc(path[i + 1], path[j + 1]);
            if after < before {
                // path[i + 1..=j] is route[i..j]
                route[i..j].reverse();
                return true;
            }
        }
    }

    false
}

struct Relocation {
    from_route: usize,
    position: usize,
    to_route: usize,
    insert_at: usize,
}

/// Relocate: move one node to another position, in the same or another route.
/// Returns true if an improvement was made.
fn relocate_improve(routes: &mut [Vec<usize>], costs: &ArcCosts<'_>, deadline: Deadline) -> bool {
    let Some(relocation) = find_relocation(routes, costs, deadline) else {
        return false;
    };

    let node = routes[relocation.from_route].remove(relocation.position);
    routes[relocation.to_route].insert(relocation.insert_at, node);
    true
}

fn find_relocation(
    routes: &[Vec<usize>],
    costs: &ArcCosts<'_>,
    deadline: Deadline,
) -> Option<Relocation> {
    let model = costs.model;
    let arc = |from: usize, to: usize| costs.arc(from, to);
    let loads: Vec<i64> = routes.iter().map(|route| model.route_load(route)).collect();

    for from_route in 0..routes.len() {
        for position in 0..routes[from_route].len() {
            if deadline.passed() {
                return None;
            }
            let node = routes[from_route][position];
            let gain = removal_gain(&routes[from_route], position, arc);
            let mut reduced = routes[from_route].clone();
            reduced.remove(position);

            for to_route in 0..routes.len() {
                let same_route = to_route == from_route;
                if !same_route && !model.fits(loads[to_route], model.demand(node)) {
                    continue;
                }

                let target = if same_route { &reduced } else { &routes[to_route] };
                for insert_at in 0..=target.len() {
                    if same_route && insert_at == position {
                        continue;
                    }
                    if insertion_cost(target, insert_at, node, arc) < gain {
                        return Some(Relocation {
                            from_route,
                            position,
                            to_route,
                            insert_at,
                        });
                    }
                }
            }
        }
    }

    None
}

/// Exchange: swap two nodes between different routes.
/// Returns true if an improvement was made.
fn exchange_improve(routes: &mut [Vec<usize>], costs: &ArcCosts<'_>, deadline: Deadline) -> bool {
    let model = costs.model;
    let loads: Vec<i64> = routes.iter().map(|route| model.route_load(route)).collect();

    for first in 0..routes.len() {
        for second in first + 1..routes.len() {
            for p in 0..routes[first].len() {
                if deadline.passed() {
                    return false;
                }
                for q in 0..routes[second].len() {
                    let a = routes[first][p];
                    let b = routes[second][q];
                    let (da, db) = (model.demand(a), model.demand(b));
                    if !model.fits(loads[first] - da, db) || !model.fits(loads[second] - db, da) {
                        continue;
                    }

                    let (prev1, next1) = neighbours(&routes[first], p);
                    let (prev2, next2) = neighbours(&routes[second], q);
                    let delta = costs.arc(prev1, b) + costs.arc(b, next1)
                        - costs.arc(prev1, a)
                        - costs.arc(a, next1)
                        + costs.arc(prev2, a)
                        + costs.arc(a, next2)
                        - costs.arc(prev2, b)
                        - costs.arc(b, next2);
                    if delta < 0 {
                        routes[first][p] = b;
                        routes[second][q] = a;
                        return true;
                    }
                }
            }
        }
    }

    false
}

/// Run the operators until none improves or the deadline passes.
fn local_search(routes: &mut [Vec<usize>], costs: &ArcCosts<'_>, deadline: Deadline) {
    while !deadline.passed() {
        // 2-opt on each route to a local optimum, routes in parallel
        let mut improved = routes
            .par_iter_mut()
            .map(|route| {
                let mut any = false;
                while two_opt_improve(route, costs, deadline) {
                    any = true;
                }
                any
            })
            .reduce(|| false, |a, b| a || b);

        if relocate_improve(routes, costs, deadline) {
            improved = true;
        }

        if exchange_improve(routes, costs, deadline) {
            improved = true;
        }

        if !improved {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_costs(positions: &[i64]) -> Vec<Vec<i64>> {
        positions
            .iter()
            .map(|a| positions.iter().map(|b| (a - b).abs()).collect())
            .collect()
    }

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                result.push(tail);
            }
        }
        result
    }

    fn quick_params() -> SearchParameters {
        SearchParameters {
            time_limit: Duration::from_secs(2),
            lambda_coefficient: 0.1,
            stall_limit: 200,
        }
    }

    #[test]
    fn test_route_cost_includes_depot_legs() {
        let costs = line_costs(&[0, 10, 20]);
        let model = RoutingModel::new(3, 1, &costs);
        assert_eq!(model.route_cost(&[1, 2]), 40);
        assert_eq!(model.route_cost(&[]), 0);
    }

    #[test]
    fn test_two_opt_handles_asymmetric_costs() {
        // Going 1 -> 2 is cheap, 2 -> 1 is expensive.
        let costs = vec![
            vec![0, 1, 10, 10],
            vec![10, 0, 1, 10],
            vec![10, 50, 0, 1],
            vec![1, 10, 10, 0],
        ];
        let model = RoutingModel::new(4, 1, &costs);
        let penalties = Penalties::new(4);
        let arc_costs = ArcCosts::plain(&model, &penalties);

        let mut optimal = vec![1, 2, 3];
        assert!(!two_opt_improve(&mut optimal, &arc_costs, Deadline::unbounded()));

        let mut reversed = vec![3, 2, 1];
        let before = model.route_cost(&reversed);
        while two_opt_improve(&mut reversed, &arc_costs, Deadline::unbounded()) {}
        assert!(model.route_cost(&reversed) < before);
    }

    #[test]
    fn test_construction_respects_capacity() {
        let costs = line_costs(&[0, 1, 2, 3, 4]);
        let demands = vec![0, 3, 3, 3, 3];
        let model = RoutingModel::new(5, 2, &costs).with_capacity(&demands, 6);

        let routes = cheapest_insertion(&model, Deadline::unbounded()).unwrap();
        for route in &routes {
            assert!(model.route_load(route) <= 6);
        }
        let mut all: Vec<usize> = routes.concat();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_construction_fails_when_node_cannot_fit() {
        let costs = line_costs(&[0, 1, 2]);
        let demands = vec![0, 6, 1];
        let model = RoutingModel::new(3, 2, &costs).with_capacity(&demands, 5);
        assert!(cheapest_insertion(&model, Deadline::unbounded()).is_none());
        assert!(GuidedLocalSearch.solve(&model, &quick_params()).is_none());
    }

    #[test]
    fn test_depot_only_model() {
        let costs = vec![vec![0]];
        let model = RoutingModel::new(1, 3, &costs);
        let assignment = GuidedLocalSearch.solve(&model, &quick_params()).unwrap();
        assert_eq!(assignment.routes, vec![Vec::<usize>::new(); 3]);
        assert_eq!(assignment.cost, 0);
    }

    #[test]
    fn test_gls_matches_brute_force_on_small_tsp() {
        let points: [(i64, i64); 7] = [(0, 0), (10, 3), (2, 9), (7, 7), (12, 12), (4, 1), (1, 5)];
        let costs: Vec<Vec<i64>> = points
            .iter()
            .map(|&(ax, ay)| {
                points
                    .iter()
                    .map(|&(bx, by)| ((((ax - bx).pow(2) + (ay - by).pow(2)) as f64).sqrt() * 100.0) as i64)
                    .collect()
            })
            .collect();
        let model = RoutingModel::new(points.len(), 1, &costs);

        let optimum = permutations(&[1, 2, 3, 4, 5, 6])
            .iter()
            .map(|order| model.route_cost(order))
            .min()
            .unwrap();

        let assignment = GuidedLocalSearch.solve(&model, &quick_params()).unwrap();
        assert_eq!(assignment.cost, optimum);
        assert_eq!(assignment.cost, model.total_cost(&assignment.routes));
    }

    #[test]
    fn test_exchange_respects_capacity() {
        let costs = line_costs(&[0, 1, 100, 2, 101]);
        let demands = vec![0, 2, 1, 1, 2];
        let model = RoutingModel::new(5, 2, &costs).with_capacity(&demands, 3);
        let penalties = Penalties::new(5);
        let arc_costs = ArcCosts::plain(&model, &penalties);

        let mut routes = vec![vec![1, 2], vec![3, 4]];
        while exchange_improve(&mut routes, &arc_costs, Deadline::unbounded()) {}
        for route in &routes {
            assert!(model.route_load(route) <= 3, "route {:?} over capacity", route);
        }
    }

    #[test]
    fn test_penalize_marks_most_expensive_arc() {
        let costs = line_costs(&[0, 1, 10]);
        let model = RoutingModel::new(3, 1, &costs);
        let mut penalties = Penalties::new(3);
        // arcs: 0->1 (1), 1->2 (9), 2->0 (10)
        penalize(&[vec![1, 2]], &model, &mut penalties);
        assert_eq!(penalties.get(2, 0), 1);
        assert_eq!(penalties.get(1, 2), 0);

        // 2->0 utility drops to 5, so 1->2 (9) is next
        penalize(&[vec![1, 2]], &model, &mut penalties);
        assert_eq!(penalties.get(1, 2), 1);
    }

    #[test]
    fn test_huge_time_limit_does_not_overflow() {
        let costs = line_costs(&[0, 10]);
        let model = RoutingModel::new(2, 1, &costs);
        let params = SearchParameters::with_time_limit(Duration::from_secs(u64::MAX));

        let assignment = GuidedLocalSearch.solve(&model, &params).unwrap();
        assert_eq!(assignment.routes, vec![vec![1]]);
        assert_eq!(assignment.cost, 20);
    }

    #[test]
    fn test_search_stays_within_time_limit() {
        // Pseudo-random points on a 10 km square, deterministic seed
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            ((seed >> 33) % 10_000) as f64
        };
        let points: Vec<(f64, f64)> = (0..300).map(|_| (next(), next())).collect();
        let costs: Vec<Vec<i64>> = points
            .iter()
            .map(|a| {
                points
                    .iter()
                    .map(|b| ((a.0 - b.0).hypot(a.1 - b.1)) as i64)
                    .collect()
            })
            .collect();
        let model = RoutingModel::new(points.len(), 1, &costs);
        let limit = Duration::from_millis(200);

        let started = Instant::now();
        let assignment = GuidedLocalSearch
            .solve(&model, &SearchParameters::with_time_limit(limit))
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(assignment.routes[0].len(), 299);
        assert!(
            elapsed < limit + Duration::from_millis(300),
            "search took {:?} with a {:?} limit",
            elapsed,
            limit
        );
    }

    #[test]
    fn test_construction_stops_at_deadline() {
        let costs = line_costs(&[0, 1, 2]);
        let model = RoutingModel::new(3, 1, &costs);
        let expired = Deadline::after(Instant::now(), Duration::ZERO);
        assert!(cheapest_insertion(&model, expired).is_none());
    }
}
