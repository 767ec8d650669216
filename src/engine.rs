//! The simulation engine.
//!
//! Owns the tick loop and orchestrates the router, occupancy index,
//! analyzer, incident manager and vehicle kinematics. A tick is the
//! atomic unit: external observers only ever see state as of a completed
//! tick, and within a tick the phases run in a fixed order. All
//! randomness flows through one seeded RNG and vehicles are visited in
//! spawn order, so runs with equal seeds produce identical traces.

use crate::analyzer::{CongestionLevel, TrafficAnalyzer};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::graph::{EdgeId, NodeId, RoadGraph, TravelMode};
use crate::incident::{Accident, Blockage, IncidentManager, Severity};
use crate::occupancy::Occupancy;
use crate::router;
use crate::vehicle::{kinematics, Vehicle, VehicleStatus};
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Vehicle type mix used by batch and automatic spawning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TypeDistribution {
    pub car: f64,
    pub bicycle: f64,
    pub pedestrian: f64,
}

impl Default for TypeDistribution {
    fn default() -> Self {
        Self {
            car: 0.6,
            bicycle: 0.25,
            pedestrian: 0.15,
        }
    }
}

impl TypeDistribution {
    pub fn validate(&self) -> Result<(), SimError> {
        let shares = [self.car, self.bicycle, self.pedestrian];
        if shares.iter().any(|s| *s < 0.0 || !s.is_finite()) {
            return Err(SimError::Validation("negative share in distribution".into()));
        }
        let sum: f64 = shares.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(SimError::Validation(format!(
                "distribution sums to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }

    fn sample(&self, rng: &mut impl Rng) -> TravelMode {
        let draw = rng.gen::<f64>();
        let mut cumulative = 0.0;
        for (share, mode) in [
            (self.car, TravelMode::Car),
            (self.bicycle, TravelMode::Bicycle),
            (self.pedestrian, TravelMode::Pedestrian),
        ] {
            cumulative += share;
            if draw <= cumulative {
                return mode;
            }
        }
        TravelMode::Car
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub dt: f64,
    pub active: usize,
    pub arrived: usize,
    pub rerouted: usize,
    pub spawned: usize,
}

/// Aggregate vehicle statistics.
#[derive(Clone, Debug, Serialize)]
pub struct VehicleStats {
    pub total_spawned: u64,
    pub active: usize,
    pub arrived: usize,
    pub removed: u64,
    pub cars: usize,
    pub bicycles: usize,
    pub pedestrians: usize,
    pub average_travel_ticks: f64,
    pub total_reroutes: u64,
    pub total_wait_time: f64,
}

/// Aggregate network statistics.
#[derive(Clone, Debug, Serialize)]
pub struct TrafficStats {
    pub total_edges: usize,
    pub average_multiplier: f64,
    pub average_density: f64,
    pub max_density: f64,
    pub congested_edges: usize,
    pub blocked_edges: usize,
    pub active_accidents: usize,
}

/// A traffic simulation over one road graph.
pub struct Simulation {
    graph: RoadGraph,
    config: SimConfig,
    rng: ChaCha8Rng,
    tick_count: u64,
    vehicles: VehicleSet,
    ids: HashMap<String, VehicleId>,
    next_serial: u64,
    occupancy: Occupancy,
    analyzer: TrafficAnalyzer,
    incidents: IncidentManager,
    total_spawned: u64,
    total_removed: u64,
    last_tick: Option<Instant>,
    running: bool,
}

impl Simulation {
    /// Creates a simulation over `graph`.
    pub fn new(graph: RoadGraph, config: SimConfig) -> Self {
        let analyzer = TrafficAnalyzer::new(&graph, &config);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            graph,
            config,
            rng,
            tick_count: 0,
            vehicles: VehicleSet::default(),
            ids: HashMap::new(),
            next_serial: 0,
            occupancy: Occupancy::default(),
            analyzer,
            incidents: IncidentManager::default(),
            total_spawned: 0,
            total_removed: 0,
            last_tick: None,
            running: false,
        }
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Raises or lowers the continuous-loop flag. The flag is observed at
    /// tick boundaries; in-flight tick work always completes.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn analyzer(&self) -> &TrafficAnalyzer {
        &self.analyzer
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    pub fn incidents(&self) -> &IncidentManager {
        &self.incidents
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    /// Looks a vehicle up by wire id.
    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.ids.get(id).and_then(|key| self.vehicles.get(*key))
    }

    /// Iterates all vehicles in spawn order.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles
            .values()
            .sorted_by_key(|v| v.seq())
    }

    pub fn active_count(&self) -> usize {
        self.vehicles.values().filter(|v| v.is_active()).count()
    }

    pub fn arrived_count(&self) -> usize {
        self.vehicles.values().filter(|v| !v.is_active()).count()
    }

    /// Advances the simulation by a wall-clock-derived time step.
    pub fn tick(&mut self) -> Result<TickSummary, SimError> {
        let now = Instant::now();
        let dt = match self.last_tick {
            Some(last) => (now - last).as_secs_f64().clamp(0.010, 0.500),
            None => self.config.tick_interval_ms as f64 / 1000.0,
        };
        self.last_tick = Some(now);
        self.step(dt)
    }

    /// Advances the simulation by exactly `dt` seconds.
    pub fn step(&mut self, dt: f64) -> Result<TickSummary, SimError> {
        self.incidents.expire_accidents(self.tick_count);

        if self.config.random_accident_rate > 0.0
            && self.rng.gen::<f64>() < self.config.random_accident_rate
        {
            if let Err(err) = self.create_accident(None, None) {
                log::warn!("spontaneous accident skipped: {err}");
            }
        }

        self.analyzer
            .recompute(&self.graph, &self.occupancy, &self.vehicles, &mut self.rng);

        let rerouted = self.reroute_pass();
        let arrived = self.kinematics_pass(dt)?;
        let spawned = if self.config.auto_spawn {
            self.auto_spawn()
        } else {
            0
        };

        self.tick_count += 1;
        Ok(TickSummary {
            tick: self.tick_count,
            dt,
            active: self.active_count(),
            arrived,
            rerouted,
            spawned,
        })
    }

    /// Clears vehicles, incidents and analyzer history, and reseeds the
    /// RNG so a replayed command sequence reproduces exactly.
    pub fn reset(&mut self) {
        self.vehicles.clear();
        self.ids.clear();
        self.occupancy.clear();
        self.incidents.clear();
        self.analyzer.reset();
        self.tick_count = 0;
        self.next_serial = 0;
        self.total_spawned = 0;
        self.total_removed = 0;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.last_tick = None;
        self.running = false;
    }

    /// Stores a new seed, then resets.
    pub fn reset_with_seed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.reset();
    }

    // ---- spawning ------------------------------------------------------

    /// Spawns one vehicle. Unspecified endpoints are drawn at random;
    /// an unspecified type defaults to a car. Fails with
    /// [`SimError::NoPath`] when no feasible route exists, leaving state
    /// untouched.
    pub fn spawn_vehicle(
        &mut self,
        kind: Option<TravelMode>,
        start: Option<&str>,
        goal: Option<&str>,
    ) -> Result<String, SimError> {
        let kind = kind.unwrap_or(TravelMode::Car);
        match (start, goal) {
            (Some(start), Some(goal)) => {
                let start = self.resolve_node(start)?;
                let goal = self.resolve_node(goal)?;
                if start == goal {
                    return Err(SimError::Validation("start equals goal".into()));
                }
                self.spawn_at(kind, start, goal)
            }
            (start, goal) => {
                let start = start.map(|n| self.resolve_node(n)).transpose()?;
                let goal = goal.map(|n| self.resolve_node(n)).transpose()?;
                self.spawn_randomised(kind, start, goal)
            }
        }
    }

    /// Spawns up to `count` vehicles with types drawn from
    /// `distribution`, skipping infeasible picks.
    pub fn spawn_multiple(
        &mut self,
        count: usize,
        distribution: &TypeDistribution,
    ) -> Result<Vec<String>, SimError> {
        distribution.validate()?;
        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let kind = distribution.sample(&mut self.rng);
            if let Ok(id) = self.spawn_randomised(kind, None, None) {
                spawned.push(id);
            }
        }
        Ok(spawned)
    }

    /// Removes a vehicle outright.
    pub fn remove_vehicle(&mut self, id: &str) -> Result<(), SimError> {
        let key = self
            .ids
            .get(id)
            .copied()
            .ok_or_else(|| SimError::NotFound(format!("vehicle {id:?}")))?;
        let vehicle = &self.vehicles[key];
        if vehicle.is_active() && vehicle.position_on_edge() > 0.0 {
            if let Some((from, to)) = vehicle.current_edge_nodes() {
                let edge = self.graph.edge_between(from, to).unwrap();
                self.occupancy.leave(edge, key)?;
            }
        }
        self.vehicles.remove(key);
        self.ids.remove(id);
        self.total_removed += 1;
        Ok(())
    }

    fn resolve_node(&self, name: &str) -> Result<NodeId, SimError> {
        self.graph
            .node_id(name)
            .ok_or_else(|| SimError::Validation(format!("unknown node {name:?}")))
    }

    /// Spawns with random endpoints, retrying a bounded number of times.
    fn spawn_randomised(
        &mut self,
        kind: TravelMode,
        start: Option<NodeId>,
        goal: Option<NodeId>,
    ) -> Result<String, SimError> {
        let n = self.graph.node_count() as u32;
        if n < 2 {
            return Err(SimError::Validation("graph has fewer than two nodes".into()));
        }
        let mut last_err = None;
        for _ in 0..self.config.spawn_retry_limit.max(1) {
            let s = start.unwrap_or_else(|| NodeId(self.rng.gen_range(0..n)));
            let g = goal.unwrap_or_else(|| NodeId(self.rng.gen_range(0..n)));
            if s == g {
                continue;
            }
            match self.spawn_at(kind, s, g) {
                Ok(id) => return Ok(id),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| SimError::Validation("no distinct spawn endpoints found".into())))
    }

    fn spawn_at(&mut self, kind: TravelMode, start: NodeId, goal: NodeId) -> Result<String, SimError> {
        let route = router::route(&self.graph, start, goal, kind, |edge| {
            self.analyzer.edge_cost(&self.graph, &self.incidents, edge)
        })?;

        self.next_serial += 1;
        let id = format!("{}_{}", kind.as_str(), self.next_serial);
        let seq = self.next_serial;
        let mut vehicle = Vehicle::new(id.clone(), seq, kind, start, goal, self.tick_count);
        vehicle.set_path(route.nodes, route.edge_costs);

        // The vehicle sits at position 0 and joins occupancy on its
        // first position update.
        let key = self.vehicles.insert(vehicle);
        self.ids.insert(id.clone(), key);
        self.total_spawned += 1;
        log::debug!("spawned {id} ({})", kind.as_str());
        Ok(id)
    }

    fn auto_spawn(&mut self) -> usize {
        let active = self.active_count();
        if active >= self.config.auto_spawn_target {
            return 0;
        }
        let deficit = self.config.auto_spawn_target - active;
        let batch = deficit.min(self.config.auto_spawn_batch);
        let distribution = TypeDistribution::default();
        let mut spawned = 0;
        for _ in 0..batch {
            let kind = distribution.sample(&mut self.rng);
            // Infeasible picks are skipped and retried next tick.
            if self.spawn_randomised(kind, None, None).is_ok() {
                spawned += 1;
            }
        }
        spawned
    }

    /// Spreads per-vehicle accelerations with a clamped normal draw.
    pub fn randomise_accelerations(&mut self, stddev: f64) {
        let distr = Normal::new(1.0, stddev).expect("invalid standard deviation");
        for key in self.sorted_keys() {
            let factor: f64 = distr.sample(&mut self.rng);
            let factor = factor.clamp(0.5, 1.5);
            let base = self.vehicles[key].kind().acceleration();
            self.vehicles[key].set_acceleration(base * factor);
        }
    }

    // ---- incidents -----------------------------------------------------

    /// Creates an accident. Without an edge a random currently-occupied
    /// edge is chosen (any edge when the network is empty); without a
    /// severity one is drawn at random.
    pub fn create_accident(
        &mut self,
        edge: Option<(&str, &str)>,
        severity: Option<Severity>,
    ) -> Result<Accident, SimError> {
        let edge_id = match edge {
            Some((from, to)) => self.resolve_edge(from, to)?,
            None => self
                .random_incident_edge()
                .ok_or_else(|| SimError::Validation("graph has no edges".into()))?,
        };
        let severity =
            severity.unwrap_or_else(|| Severity::ALL[self.rng.gen_range(0..Severity::ALL.len())]);
        let clears_at = self
            .config
            .accident_duration_ticks
            .map(|d| self.tick_count + d);
        Ok(self
            .incidents
            .create_accident(edge_id, severity, self.tick_count, clears_at)
            .clone())
    }

    pub fn resolve_accident(&mut self, id: &str) -> Result<Accident, SimError> {
        self.incidents.resolve_accident(id)
    }

    /// Blocks a directed edge and force-flags every vehicle whose
    /// remaining path crosses it downstream of the vehicle's current
    /// position.
    pub fn block_road(&mut self, from: &str, to: &str, reason: &str) -> Result<(), SimError> {
        let edge = self.resolve_edge(from, to)?;
        self.incidents.block(edge, reason, self.tick_count)?;

        let (from_id, to_id) = (self.graph.edge(edge).from(), self.graph.edge(edge).to());
        for key in self.sorted_keys() {
            let vehicle = &self.vehicles[key];
            if !vehicle.is_active() {
                continue;
            }
            // A vehicle already progressing along the blocked edge cannot
            // avoid it; only strictly-downstream crossings count.
            let skip = (vehicle.position_on_edge() > 0.0) as usize;
            let crosses = vehicle
                .remaining_edges()
                .skip(skip)
                .any(|(f, t)| f == from_id && t == to_id);
            if crosses {
                self.vehicles[key].mark_for_reroute();
            }
        }
        Ok(())
    }

    pub fn unblock_road(&mut self, from: &str, to: &str) -> Result<Blockage, SimError> {
        let edge = self.resolve_edge(from, to)?;
        self.incidents.unblock(edge)
    }

    fn resolve_edge(&self, from: &str, to: &str) -> Result<EdgeId, SimError> {
        let from_id = self.resolve_node(from)?;
        let to_id = self.resolve_node(to)?;
        self.graph
            .edge_between(from_id, to_id)
            .ok_or_else(|| SimError::Validation(format!("no edge {from} -> {to}")))
    }

    fn random_incident_edge(&mut self) -> Option<EdgeId> {
        let occupied: Vec<EdgeId> = self
            .graph
            .edges()
            .map(|(id, _)| id)
            .filter(|id| self.occupancy.count(*id) > 0)
            .collect();
        if !occupied.is_empty() {
            return Some(occupied[self.rng.gen_range(0..occupied.len())]);
        }
        let count = self.graph.edge_count();
        if count > 0 {
            Some(EdgeId(self.rng.gen_range(0..count as u32)))
        } else {
            None
        }
    }

    // ---- per-tick phases -----------------------------------------------

    fn sorted_keys(&self) -> Vec<VehicleId> {
        self.vehicles
            .iter()
            .map(|(key, vehicle)| (vehicle.seq(), key))
            .sorted_by_key(|(seq, _)| *seq)
            .map(|(_, key)| key)
            .collect()
    }

    /// Current cost of an edge under this tick's analyzer state.
    fn edge_cost(&self, edge: EdgeId) -> f64 {
        self.analyzer.edge_cost(&self.graph, &self.incidents, edge)
    }

    fn current_remaining_cost(&self, vehicle: &Vehicle) -> f64 {
        vehicle
            .remaining_edges()
            .map(|(from, to)| match self.graph.edge_between(from, to) {
                Some(edge) => self.edge_cost(edge),
                None => f64::INFINITY,
            })
            .sum()
    }

    fn reroute_pass(&mut self) -> usize {
        let mut rerouted = 0;
        for key in self.sorted_keys() {
            // The rerouting window is one tick.
            if self.vehicles[key].status() == VehicleStatus::Rerouting {
                self.vehicles[key].set_status(VehicleStatus::Moving);
            }

            let vehicle = &self.vehicles[key];
            let forced = vehicle.needs_forced_reroute();
            let eligible = forced
                || matches!(
                    vehicle.status(),
                    VehicleStatus::Moving | VehicleStatus::Stuck
                );
            if !eligible || vehicle.current_edge_nodes().is_none() {
                continue;
            }
            if !forced {
                if !self.should_reroute(vehicle) {
                    continue;
                }
                // At most one adopted reroute per cooldown window; the
                // triggers re-evaluate every tick and forced replans
                // bypass the limit.
                if let Some(last) = vehicle.last_reroute_tick() {
                    if self.tick_count.saturating_sub(last) < self.config.reroute_cooldown_ticks {
                        continue;
                    }
                }
            }
            if self.try_reroute(key, forced) {
                rerouted += 1;
            }
        }
        rerouted
    }

    fn should_reroute(&self, vehicle: &Vehicle) -> bool {
        for (i, (from, to)) in vehicle.remaining_edges().enumerate() {
            if i >= self.config.reroute_lookahead_edges {
                break;
            }
            let Some(edge) = self.graph.edge_between(from, to) else {
                continue;
            };
            if self.incidents.is_blocked(edge) {
                return true;
            }
            if matches!(self.incidents.worst_severity_on(edge), Some(s) if s >= Severity::Major) {
                return true;
            }
            if self.analyzer.probability(edge) >= self.config.reroute_probability_threshold {
                return true;
            }
        }

        let planned = vehicle.planned_remaining_cost();
        if planned.is_finite() && planned > 0.0 {
            let current = self.current_remaining_cost(vehicle);
            if current > planned * (1.0 + self.config.reroute_threshold) {
                return true;
            }
        }
        false
    }

    /// Replans the vehicle's remaining path. Returns whether a strictly
    /// better path was adopted.
    fn try_reroute(&mut self, key: VehicleId, forced: bool) -> bool {
        let vehicle = &self.vehicles[key];
        let mode = vehicle.kind();
        let goal = vehicle.goal();
        let current = vehicle.current_node();
        let old_next = vehicle.next_node().unwrap();
        let mid_edge = vehicle.position_on_edge() > 0.0;
        // Mid-edge the vehicle must finish its current edge first, so the
        // replan anchors at the next node.
        let anchor = if mid_edge { old_next } else { current };

        let old_cost: f64 = vehicle
            .remaining_edges()
            .skip(mid_edge as usize)
            .map(|(from, to)| match self.graph.edge_between(from, to) {
                Some(edge) => self.edge_cost(edge),
                None => f64::INFINITY,
            })
            .sum();
        let kept_cost = vehicle.planned_current_edge_cost();

        let outcome = router::route(&self.graph, anchor, goal, mode, |edge| {
            self.edge_cost(edge)
        });

        match outcome {
            Ok(route) if route.cost + 1e-9 < old_cost => {
                let tick = self.tick_count;
                let (path, costs) = if mid_edge {
                    let mut path = Vec::with_capacity(route.nodes.len() + 1);
                    path.push(current);
                    path.extend(route.nodes.iter().copied());
                    let mut costs = Vec::with_capacity(route.edge_costs.len() + 1);
                    costs.push(kept_cost);
                    costs.extend(route.edge_costs.iter().copied());
                    (path, costs)
                } else {
                    (route.nodes, route.edge_costs)
                };

                // At position zero the vehicle occupies no edge yet, so a
                // new first hop needs no occupancy bookkeeping.
                let vehicle = &mut self.vehicles[key];
                vehicle.apply_reroute(path, costs, tick);
                log::debug!("rerouted {}", vehicle.id());
                true
            }
            Ok(_) => {
                self.vehicles[key].clear_reroute_flag();
                false
            }
            Err(_) => {
                let vehicle = &mut self.vehicles[key];
                vehicle.clear_reroute_flag();
                if forced {
                    // No alternative exists; preserve the vehicle.
                    vehicle.set_status(VehicleStatus::Stuck);
                    log::debug!("{} has no alternative path, stuck", vehicle.id());
                }
                false
            }
        }
    }

    /// Advances every active vehicle. Two passes over the id-sorted
    /// population: the first derives target speeds from the pre-tick
    /// snapshot, the second integrates motion and performs edge
    /// transitions. Returns how many vehicles arrived.
    fn kinematics_pass(&mut self, dt: f64) -> Result<usize, SimError> {
        let keys = self.sorted_keys();
        let tick = self.tick_count;

        let mut updates: Vec<(VehicleId, f64, bool)> = Vec::with_capacity(keys.len());
        for key in keys.iter().copied() {
            let vehicle = &self.vehicles[key];
            if !vehicle.is_moving_state() {
                continue;
            }
            let Some((from, to)) = vehicle.current_edge_nodes() else {
                continue;
            };
            let edge = self.graph.edge_between(from, to).unwrap();
            let curve_len = self.graph.edge(edge).curve().length();

            let mut gap: Option<f64> = None;
            for other_key in self.occupancy.on(edge) {
                if *other_key == key {
                    continue;
                }
                let other = &self.vehicles[*other_key];
                if other.position_on_edge() > vehicle.position_on_edge() {
                    let candidate =
                        (other.position_on_edge() - vehicle.position_on_edge()) * curve_len;
                    if gap.map_or(true, |g| candidate < g) {
                        gap = Some(candidate);
                    }
                }
            }

            let multiplier = self.analyzer.effective_multiplier(edge, &self.incidents);
            let raw = kinematics::follow_target(gap, vehicle.kind().max_speed(), multiplier);
            let smoothed =
                kinematics::smooth_target(vehicle.target_speed(), raw, self.config.smoothing_alpha);
            let pinned = matches!(gap, Some(g) if g < kinematics::MIN_GAP);
            updates.push((key, smoothed, pinned));
        }

        for (key, target, pinned) in updates {
            let vehicle = &mut self.vehicles[key];
            vehicle.set_target(target);
            if pinned && vehicle.status() != VehicleStatus::Rerouting {
                vehicle.set_status(VehicleStatus::Stuck);
            }
        }

        let mut arrived = 0;
        for key in keys.iter().copied() {
            let vehicle = &self.vehicles[key];
            if !vehicle.is_moving_state() {
                continue;
            }
            let Some((from, to)) = vehicle.current_edge_nodes() else {
                continue;
            };
            let edge = self.graph.edge_between(from, to).unwrap();
            let curve_len = self.graph.edge(edge).curve().length();
            let at_final = vehicle.path_index() + 2 == vehicle.path().len();
            let upcoming_edge = if at_final {
                None
            } else {
                let after_next = vehicle.path()[vehicle.path_index() + 2];
                Some(self.graph.edge_between(to, after_next).unwrap())
            };

            let vehicle = &mut self.vehicles[key];
            let speed = kinematics::integrate_speed(
                vehicle.current_speed(),
                vehicle.target_speed(),
                vehicle.acceleration(),
                dt,
            );
            vehicle.set_speed(speed);
            if speed < kinematics::SPEED_EPS {
                vehicle.add_wait_time(dt);
            }

            let delta = speed * dt / curve_len;
            if delta < kinematics::MIN_POSITION_DELTA {
                if vehicle.status() != VehicleStatus::Rerouting {
                    vehicle.set_status(if speed >= kinematics::SPEED_EPS {
                        VehicleStatus::Moving
                    } else {
                        VehicleStatus::Stuck
                    });
                }
                continue;
            }

            let new_pos = vehicle.position_on_edge() + delta;
            if new_pos < 1.0 {
                let entering = vehicle.position_on_edge() == 0.0;
                vehicle.add_distance(speed * dt);
                vehicle.set_position(new_pos);
                if vehicle.status() != VehicleStatus::Rerouting {
                    vehicle.set_status(if speed >= kinematics::SPEED_EPS {
                        VehicleStatus::Moving
                    } else {
                        VehicleStatus::Stuck
                    });
                }
                if entering {
                    // First movement onto the open interval; the vehicle
                    // now occupies the edge.
                    self.occupancy.enter(edge, key);
                }
                continue;
            }

            // Crossing the node at the end of the edge. A vehicle still
            // at position 0 never joined the index.
            let was_on_edge = vehicle.position_on_edge() > 0.0;
            let distance_to_node = (1.0 - vehicle.position_on_edge()) * curve_len;
            if at_final {
                vehicle.add_distance(distance_to_node);
                vehicle.arrive(tick);
                if was_on_edge {
                    self.occupancy.leave(edge, key)?;
                }
                arrived += 1;
                continue;
            }

            let upcoming = upcoming_edge.unwrap();
            if self.incidents.is_blocked(upcoming) {
                // Hold short of the node; no vehicle enters a blocked edge.
                vehicle.set_speed(0.0);
                vehicle.set_target(0.0);
                vehicle.set_status(VehicleStatus::Stuck);
                vehicle.mark_for_reroute();
                continue;
            }

            vehicle.add_distance(distance_to_node);
            vehicle.advance_edge();
            if vehicle.status() != VehicleStatus::Rerouting {
                vehicle.set_status(VehicleStatus::Moving);
            }
            if was_on_edge {
                self.occupancy.leave(edge, key)?;
            }
        }

        Ok(arrived)
    }

    // ---- statistics ----------------------------------------------------

    pub fn vehicle_statistics(&self) -> VehicleStats {
        let by_kind = self.vehicles.values().counts_by(|v| v.kind());
        let arrived: Vec<&Vehicle> = self.vehicles.values().filter(|v| !v.is_active()).collect();
        let average_travel_ticks = if arrived.is_empty() {
            0.0
        } else {
            arrived
                .iter()
                .map(|v| (v.arrival_tick().unwrap() - v.spawn_tick()) as f64)
                .sum::<f64>()
                / arrived.len() as f64
        };
        VehicleStats {
            total_spawned: self.total_spawned,
            active: self.active_count(),
            arrived: arrived.len(),
            removed: self.total_removed,
            cars: by_kind.get(&TravelMode::Car).copied().unwrap_or(0),
            bicycles: by_kind.get(&TravelMode::Bicycle).copied().unwrap_or(0),
            pedestrians: by_kind.get(&TravelMode::Pedestrian).copied().unwrap_or(0),
            average_travel_ticks,
            total_reroutes: self
                .vehicles
                .values()
                .map(|v| u64::from(v.reroute_count()))
                .sum(),
            total_wait_time: self.vehicles.values().map(|v| v.wait_time()).sum(),
        }
    }

    pub fn traffic_statistics(&self) -> TrafficStats {
        let mut multiplier_sum = 0.0;
        let mut density_sum = 0.0;
        let mut max_density: f64 = 0.0;
        let mut congested = 0;
        let mut edges = 0;
        for (_, flow) in self.analyzer.flows() {
            edges += 1;
            multiplier_sum += flow.multiplier;
            density_sum += flow.density;
            max_density = max_density.max(flow.density);
            if flow.level == CongestionLevel::Congested {
                congested += 1;
            }
        }
        TrafficStats {
            total_edges: edges,
            average_multiplier: if edges > 0 {
                multiplier_sum / edges as f64
            } else {
                0.0
            },
            average_density: if edges > 0 {
                density_sum / edges as f64
            } else {
                0.0
            },
            max_density,
            congested_edges: congested,
            blocked_edges: self.incidents.blockages().len(),
            active_accidents: self.incidents.accidents().len(),
        }
    }
}
