//! Vehicle state and per-type constants.

use crate::graph::{NodeId, TravelMode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub(crate) mod kinematics;

/// Per-type kinematic constants. The travel mode doubles as the vehicle
/// type, so the constants hang off [`TravelMode`].
impl TravelMode {
    /// Top speed in length units per second.
    pub fn max_speed(self) -> f64 {
        match self {
            TravelMode::Car => 60.0,
            TravelMode::Bicycle => 40.0,
            TravelMode::Pedestrian => 20.0,
        }
    }

    /// Share of edge capacity one vehicle of this type consumes.
    pub fn capacity_weight(self) -> f64 {
        match self {
            TravelMode::Car => 1.0,
            TravelMode::Bicycle => 0.5,
            TravelMode::Pedestrian => 0.2,
        }
    }

    /// Default acceleration in length units per second squared.
    pub fn acceleration(self) -> f64 {
        match self {
            TravelMode::Car => 2.5,
            TravelMode::Bicycle => 1.8,
            TravelMode::Pedestrian => 1.2,
        }
    }
}

/// Lifecycle state of a vehicle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    /// Created but not yet assigned a path.
    Waiting,
    Moving,
    /// Pinned at (or decelerating to) zero speed behind a leader or a
    /// blockage.
    Stuck,
    /// Replanned this tick.
    Rerouting,
    Arrived,
}

/// A simulated vehicle.
///
/// Mutated only by the engine and the kinematics pass; everything else
/// reads through the accessors.
pub struct Vehicle {
    id: String,
    /// Spawn sequence number; the engine iterates vehicles in this order.
    seq: u64,
    kind: TravelMode,
    status: VehicleStatus,
    start: NodeId,
    goal: NodeId,
    path: Vec<NodeId>,
    path_index: usize,
    /// Fractional progress along the current edge's curve, in `[0, 1]`.
    pos: f64,
    speed: f64,
    /// Smoothed target speed.
    target: f64,
    accel: f64,
    reroute_count: u32,
    spawn_tick: u64,
    arrival_tick: Option<u64>,
    /// Planned cost of each remaining edge, front = current edge.
    planned_costs: VecDeque<f64>,
    /// Tick of the last adopted reroute; gates the cooldown window.
    last_reroute_tick: Option<u64>,
    force_reroute: bool,
    total_distance: f64,
    wait_time: f64,
}

impl Vehicle {
    pub(crate) fn new(
        id: String,
        seq: u64,
        kind: TravelMode,
        start: NodeId,
        goal: NodeId,
        spawn_tick: u64,
    ) -> Self {
        Self {
            id,
            seq,
            kind,
            status: VehicleStatus::Waiting,
            start,
            goal,
            path: Vec::new(),
            path_index: 0,
            pos: 0.0,
            speed: 0.0,
            target: kind.max_speed(),
            accel: kind.acceleration(),
            reroute_count: 0,
            spawn_tick,
            arrival_tick: None,
            planned_costs: VecDeque::new(),
            last_reroute_tick: None,
            force_reroute: false,
            total_distance: 0.0,
            wait_time: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> TravelMode {
        self.kind
    }

    pub fn status(&self) -> VehicleStatus {
        self.status
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn goal(&self) -> NodeId {
        self.goal
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn path_index(&self) -> usize {
        self.path_index
    }

    /// The node the vehicle last departed (or sits at).
    pub fn current_node(&self) -> NodeId {
        self.path[self.path_index]
    }

    /// The node the vehicle is heading to, absent once arrived.
    pub fn next_node(&self) -> Option<NodeId> {
        self.path.get(self.path_index + 1).copied()
    }

    /// The directed edge currently being traversed.
    pub fn current_edge_nodes(&self) -> Option<(NodeId, NodeId)> {
        self.next_node().map(|next| (self.current_node(), next))
    }

    pub fn position_on_edge(&self) -> f64 {
        self.pos
    }

    pub fn current_speed(&self) -> f64 {
        self.speed
    }

    pub fn target_speed(&self) -> f64 {
        self.target
    }

    pub fn acceleration(&self) -> f64 {
        self.accel
    }

    pub fn reroute_count(&self) -> u32 {
        self.reroute_count
    }

    pub fn spawn_tick(&self) -> u64 {
        self.spawn_tick
    }

    pub fn arrival_tick(&self) -> Option<u64> {
        self.arrival_tick
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn wait_time(&self) -> f64 {
        self.wait_time
    }

    pub fn is_active(&self) -> bool {
        self.status != VehicleStatus::Arrived
    }

    /// Whether the kinematics pass advances this vehicle.
    pub(crate) fn is_moving_state(&self) -> bool {
        matches!(
            self.status,
            VehicleStatus::Moving | VehicleStatus::Stuck | VehicleStatus::Rerouting
        )
    }

    pub(crate) fn last_reroute_tick(&self) -> Option<u64> {
        self.last_reroute_tick
    }

    pub(crate) fn needs_forced_reroute(&self) -> bool {
        self.force_reroute
    }

    /// Remaining edges of the path, starting with the current edge.
    pub(crate) fn remaining_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.path[self.path_index..]
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
    }

    /// Planned cost of the remaining path at the time it was computed.
    pub(crate) fn planned_remaining_cost(&self) -> f64 {
        self.planned_costs.iter().sum()
    }

    /// Planned cost of the edge currently being traversed.
    pub(crate) fn planned_current_edge_cost(&self) -> f64 {
        self.planned_costs.front().copied().unwrap_or(0.0)
    }

    /// Installs the initial path.
    pub(crate) fn set_path(&mut self, path: Vec<NodeId>, edge_costs: Vec<f64>) {
        debug_assert!(path.len() >= 2);
        self.path = path;
        self.path_index = 0;
        self.pos = 0.0;
        self.planned_costs = edge_costs.into();
        self.status = VehicleStatus::Moving;
    }

    /// Replaces the path after a reroute. The new path must start at the
    /// current node and, when the vehicle is mid-edge, keep the current
    /// edge as its first hop; `position_on_edge` is preserved.
    pub(crate) fn apply_reroute(&mut self, path: Vec<NodeId>, edge_costs: Vec<f64>, tick: u64) {
        debug_assert_eq!(path.first(), Some(&self.current_node()));
        self.path = path;
        self.path_index = 0;
        self.planned_costs = edge_costs.into();
        self.reroute_count += 1;
        self.last_reroute_tick = Some(tick);
        self.force_reroute = false;
        self.status = VehicleStatus::Rerouting;
    }

    /// Clears the forced-reroute flag after an unsuccessful replan.
    pub(crate) fn clear_reroute_flag(&mut self) {
        self.force_reroute = false;
    }

    /// Flags the vehicle for a forced reroute on the next tick.
    pub(crate) fn mark_for_reroute(&mut self) {
        self.force_reroute = true;
    }

    /// Steps onto the next edge of the path.
    pub(crate) fn advance_edge(&mut self) {
        self.path_index += 1;
        self.pos = 0.0;
        self.planned_costs.pop_front();
    }

    /// Completes the journey at the final node.
    pub(crate) fn arrive(&mut self, tick: u64) {
        self.path_index += 1;
        self.pos = 1.0;
        self.speed = 0.0;
        self.target = 0.0;
        self.planned_costs.pop_front();
        self.status = VehicleStatus::Arrived;
        self.arrival_tick = Some(tick);
    }

    pub(crate) fn set_status(&mut self, status: VehicleStatus) {
        self.status = status;
    }

    pub(crate) fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub(crate) fn set_position(&mut self, pos: f64) {
        self.pos = pos;
    }

    pub(crate) fn set_acceleration(&mut self, accel: f64) {
        self.accel = accel;
    }

    pub(crate) fn add_distance(&mut self, distance: f64) {
        self.total_distance += distance;
    }

    pub(crate) fn add_wait_time(&mut self, dt: f64) {
        self.wait_time += dt;
    }
}
