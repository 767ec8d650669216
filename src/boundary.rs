//! Command/query operations backing the external surface.
//!
//! A [`Boundary`] owns one [`Simulation`] plus the named-map registry and
//! exposes every operation a transport adapter (e.g. an HTTP server)
//! needs, with JSON-serializable response types. The boundary is
//! synchronous: the host serializes calls against the tick loop, so every
//! query observes the state of the last completed tick.

use crate::analyzer::CongestionLevel;
use crate::config::{SimConfig, MAX_TICK_INTERVAL_MS, MIN_TICK_INTERVAL_MS};
use crate::engine::{Simulation, TickSummary, TrafficStats, TypeDistribution, VehicleStats};
use crate::error::SimError;
use crate::graph::{RoadGraph, TravelMode};
use crate::incident::{Accident, Blockage};
use crate::map::MapRegistry;
use crate::vehicle::{Vehicle, VehicleStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct MapsResponse {
    pub maps: Vec<String>,
    pub current: String,
}

/// The loaded graph in renderable form.
#[derive(Clone, Debug, Serialize)]
pub struct GraphData {
    pub name: String,
    pub nodes: BTreeMap<String, [f64; 2]>,
    pub edges: Vec<EdgeData>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EdgeData {
    pub from: String,
    pub to: String,
    pub distance: f64,
    pub allowed: Vec<TravelMode>,
    pub one_way: bool,
    /// Signed lateral bow of the rendering curve, as a fraction of the
    /// chord. Clients derive the identical curve from this.
    pub curve_offset: f64,
    pub curve_length: f64,
}

/// A vehicle on the wire.
#[derive(Clone, Debug, Serialize)]
pub struct VehicleRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TravelMode,
    pub status: VehicleStatus,
    pub start_node: String,
    pub goal_node: String,
    pub current_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_node: Option<String>,
    pub path: Vec<String>,
    pub path_index: usize,
    pub position_on_edge: f64,
    pub current_speed: f64,
    pub target_speed: f64,
    /// The type's nominal top speed.
    pub speed_multiplier: f64,
    pub reroute_count: u32,
    pub spawn_tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_tick: Option<u64>,
    pub total_distance: f64,
    pub wait_time: f64,
}

/// Per-edge traffic state on the wire.
#[derive(Clone, Debug, Serialize)]
pub struct EdgeTrafficRecord {
    pub from: String,
    pub to: String,
    pub vehicle_count: usize,
    pub weighted_load: f64,
    pub capacity: f64,
    pub density: f64,
    pub level: CongestionLevel,
    pub multiplier: f64,
    pub congestion_probability: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub tick: u64,
    pub is_running: bool,
    pub vehicles: Vec<VehicleRecord>,
    pub edge_traffic: Vec<EdgeTrafficRecord>,
    pub vehicle_stats: VehicleStats,
    pub traffic_stats: TrafficStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct BottleneckRecord {
    pub from: String,
    pub to: String,
    pub vehicle_count: usize,
    pub density: f64,
    pub level: CongestionLevel,
    pub probability: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CongestionReport {
    pub bottlenecks: Vec<BottleneckRecord>,
    pub stats: TrafficStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccidentRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub severity: crate::incident::Severity,
    pub created_tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clears_at_tick: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockageRecord {
    pub from: String,
    pub to: String,
    pub reason: String,
    pub created_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationInfo {
    pub map: String,
    pub nodes: usize,
    pub edges: usize,
    pub tick: u64,
    pub is_running: bool,
    pub tick_interval_ms: u64,
    pub total_spawned: u64,
    pub active_vehicles: usize,
}

/// Number of bottleneck entries in a congestion report.
const BOTTLENECK_TOP_K: usize = 10;

/// The external boundary of the simulator.
pub struct Boundary {
    registry: MapRegistry,
    current_map: String,
    sim: Simulation,
}

impl Boundary {
    /// Creates a boundary over the built-in `simple` map.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        Self::with_map("simple", config)
    }

    /// Creates a boundary over the named map.
    pub fn with_map(map: &str, config: SimConfig) -> Result<Self, SimError> {
        let registry = MapRegistry::default();
        let data = registry.load(map)?;
        let graph = RoadGraph::from_map(map, &data)?;
        Ok(Self {
            registry,
            current_map: map.to_owned(),
            sim: Simulation::new(graph, config),
        })
    }

    /// The engine behind the boundary.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Registers an additional file-backed map.
    pub fn register_map(&mut self, name: &str, path: std::path::PathBuf) {
        self.registry.register_file(name, path);
    }

    // ---- queries -------------------------------------------------------

    pub fn health(&self) -> Health {
        Health { status: "ok" }
    }

    pub fn list_maps(&self) -> MapsResponse {
        MapsResponse {
            maps: self.registry.names(),
            current: self.current_map.clone(),
        }
    }

    pub fn get_map(&self) -> GraphData {
        let graph = self.sim.graph();
        GraphData {
            name: graph.name().to_owned(),
            nodes: graph
                .nodes()
                .map(|(_, node)| (node.name().to_owned(), [node.pos().x, node.pos().y]))
                .collect(),
            edges: graph
                .edges()
                .map(|(id, edge)| {
                    let (from, to) = graph.edge_names(id);
                    EdgeData {
                        from: from.to_owned(),
                        to: to.to_owned(),
                        distance: edge.base_len(),
                        allowed: edge.modes().to_vec(),
                        one_way: edge.one_way(),
                        curve_offset: edge.curve().offset(),
                        curve_length: edge.curve().length(),
                    }
                })
                .collect(),
        }
    }

    pub fn get_state(&self) -> StateSnapshot {
        StateSnapshot {
            tick: self.sim.tick_count(),
            is_running: self.sim.is_running(),
            vehicles: self.list_vehicles(),
            edge_traffic: self.get_edge_traffic(),
            vehicle_stats: self.sim.vehicle_statistics(),
            traffic_stats: self.sim.traffic_statistics(),
        }
    }

    pub fn list_vehicles(&self) -> Vec<VehicleRecord> {
        self.sim
            .iter_vehicles()
            .map(|v| vehicle_record(self.sim.graph(), v))
            .collect()
    }

    pub fn get_vehicle(&self, id: &str) -> Result<VehicleRecord, SimError> {
        self.sim
            .vehicle(id)
            .map(|v| vehicle_record(self.sim.graph(), v))
            .ok_or_else(|| SimError::NotFound(format!("vehicle {id:?}")))
    }

    pub fn get_traffic_statistics(&self) -> TrafficStats {
        self.sim.traffic_statistics()
    }

    pub fn get_edge_traffic(&self) -> Vec<EdgeTrafficRecord> {
        let graph = self.sim.graph();
        self.sim
            .analyzer()
            .flows()
            .map(|(id, flow)| {
                let (from, to) = graph.edge_names(id);
                EdgeTrafficRecord {
                    from: from.to_owned(),
                    to: to.to_owned(),
                    vehicle_count: flow.vehicle_count,
                    weighted_load: flow.weighted_load,
                    capacity: flow.capacity,
                    density: flow.density,
                    level: flow.level,
                    multiplier: flow.multiplier,
                    congestion_probability: flow.probability,
                }
            })
            .collect()
    }

    pub fn get_congestion_report(&self) -> CongestionReport {
        let graph = self.sim.graph();
        let bottlenecks = self
            .sim
            .analyzer()
            .bottlenecks(graph, BOTTLENECK_TOP_K)
            .into_iter()
            .map(|(id, flow)| {
                let (from, to) = graph.edge_names(id);
                BottleneckRecord {
                    from: from.to_owned(),
                    to: to.to_owned(),
                    vehicle_count: flow.vehicle_count,
                    density: flow.density,
                    level: flow.level,
                    probability: flow.probability,
                }
            })
            .collect();
        CongestionReport {
            bottlenecks,
            stats: self.sim.traffic_statistics(),
        }
    }

    pub fn list_accidents(&self) -> Vec<AccidentRecord> {
        self.sim
            .incidents()
            .accidents()
            .iter()
            .map(|a| accident_record(self.sim.graph(), a))
            .collect()
    }

    pub fn list_blocked_roads(&self) -> Vec<BlockageRecord> {
        self.sim
            .incidents()
            .blockages()
            .into_iter()
            .map(|b| blockage_record(self.sim.graph(), b))
            .collect()
    }

    pub fn get_simulation_info(&self) -> SimulationInfo {
        SimulationInfo {
            map: self.current_map.clone(),
            nodes: self.sim.graph().node_count(),
            edges: self.sim.graph().edge_count(),
            tick: self.sim.tick_count(),
            is_running: self.sim.is_running(),
            tick_interval_ms: self.sim.config().tick_interval_ms,
            total_spawned: self.sim.total_spawned(),
            active_vehicles: self.sim.active_count(),
        }
    }

    // ---- commands ------------------------------------------------------

    pub fn spawn_vehicle(
        &mut self,
        kind: Option<&str>,
        start: Option<&str>,
        goal: Option<&str>,
    ) -> Result<String, SimError> {
        let kind: Option<TravelMode> = kind.map(str::parse).transpose()?;
        self.sim.spawn_vehicle(kind, start, goal)
    }

    pub fn spawn_multiple(
        &mut self,
        count: usize,
        distribution: TypeDistribution,
    ) -> Result<Vec<String>, SimError> {
        self.sim.spawn_multiple(count, &distribution)
    }

    /// Advances one tick and returns the resulting state.
    pub fn tick(&mut self) -> Result<StateSnapshot, SimError> {
        self.sim.tick()?;
        Ok(self.get_state())
    }

    pub fn remove_vehicle(&mut self, id: &str) -> Result<(), SimError> {
        self.sim.remove_vehicle(id)
    }

    pub fn reset_simulation(&mut self) {
        self.sim.reset();
    }

    /// Loads a different map; the simulation restarts from scratch.
    pub fn switch_map(&mut self, name: &str) -> Result<(), SimError> {
        let data = self.registry.load(name)?;
        let graph = RoadGraph::from_map(name, &data)?;
        let config = self.sim.config().clone();
        self.sim = Simulation::new(graph, config);
        self.current_map = name.to_owned();
        log::info!("switched to map {name:?}");
        Ok(())
    }

    pub fn create_accident(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        severity: Option<&str>,
    ) -> Result<AccidentRecord, SimError> {
        let edge = match (from, to) {
            (Some(from), Some(to)) => Some((from, to)),
            (None, None) => None,
            _ => {
                return Err(SimError::Validation(
                    "accident edge needs both endpoints or neither".into(),
                ))
            }
        };
        let severity: Option<crate::incident::Severity> =
            severity.map(str::parse).transpose()?;
        let accident = self.sim.create_accident(edge, severity)?;
        Ok(accident_record(self.sim.graph(), &accident))
    }

    pub fn resolve_accident(&mut self, id: &str) -> Result<(), SimError> {
        self.sim.resolve_accident(id).map(|_| ())
    }

    pub fn block_road(&mut self, from: &str, to: &str, reason: &str) -> Result<(), SimError> {
        self.sim.block_road(from, to, reason)
    }

    pub fn unblock_road(&mut self, from: &str, to: &str) -> Result<(), SimError> {
        self.sim.unblock_road(from, to).map(|_| ())
    }

    /// Raises the continuous-loop flag. The host is expected to drive
    /// [`Boundary::run`] (or call `tick` itself) while the flag is up.
    pub fn start_continuous(&mut self, interval_ms: u64) -> Result<(), SimError> {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&interval_ms) {
            return Err(SimError::Validation(format!(
                "tick interval {interval_ms} ms outside {MIN_TICK_INTERVAL_MS}..={MAX_TICK_INTERVAL_MS}"
            )));
        }
        self.sim.config_mut().tick_interval_ms = interval_ms;
        self.sim.set_running(true);
        Ok(())
    }

    pub fn stop_continuous(&mut self) {
        self.sim.set_running(false);
    }

    /// Drives the tick loop until the running flag is lowered or
    /// `max_ticks` elapse. Cancellation is observed at tick boundaries;
    /// in-flight tick work always completes.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<Vec<TickSummary>, SimError> {
        let mut summaries = Vec::new();
        while self.sim.is_running() {
            summaries.push(self.sim.tick()?);
            if let Some(max) = max_ticks {
                if summaries.len() as u64 >= max {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(self.sim.config().tick_interval_ms));
        }
        Ok(summaries)
    }
}

fn vehicle_record(graph: &RoadGraph, vehicle: &Vehicle) -> VehicleRecord {
    let name = |id| graph.node(id).name().to_owned();
    VehicleRecord {
        id: vehicle.id().to_owned(),
        kind: vehicle.kind(),
        status: vehicle.status(),
        start_node: name(vehicle.start()),
        goal_node: name(vehicle.goal()),
        current_node: name(vehicle.current_node()),
        next_node: vehicle.next_node().map(name),
        path: vehicle.path().iter().map(|n| name(*n)).collect(),
        path_index: vehicle.path_index(),
        position_on_edge: vehicle.position_on_edge(),
        current_speed: vehicle.current_speed(),
        target_speed: vehicle.target_speed(),
        speed_multiplier: vehicle.kind().max_speed(),
        reroute_count: vehicle.reroute_count(),
        spawn_tick: vehicle.spawn_tick(),
        arrival_tick: vehicle.arrival_tick(),
        total_distance: vehicle.total_distance(),
        wait_time: vehicle.wait_time(),
    }
}

fn accident_record(graph: &RoadGraph, accident: &Accident) -> AccidentRecord {
    let (from, to) = graph.edge_names(accident.edge);
    AccidentRecord {
        id: accident.id.clone(),
        from: from.to_owned(),
        to: to.to_owned(),
        severity: accident.severity,
        created_tick: accident.created_tick,
        clears_at_tick: accident.clears_at_tick,
    }
}

fn blockage_record(graph: &RoadGraph, blockage: &Blockage) -> BlockageRecord {
    let (from, to) = graph.edge_names(blockage.edge);
    BlockageRecord {
        from: from.to_owned(),
        to: to.to_owned(),
        reason: blockage.reason.clone(),
        created_tick: blockage.created_tick,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn health_and_info_answer() {
        let boundary = Boundary::new(SimConfig::default()).unwrap();
        assert_eq!(boundary.health().status, "ok");
        let info = boundary.get_simulation_info();
        assert_eq!(info.map, "simple");
        assert_eq!(info.tick, 0);
        assert!(!info.is_running);
    }

    #[test]
    fn map_listing_names_the_builtins() {
        let boundary = Boundary::new(SimConfig::default()).unwrap();
        let maps = boundary.list_maps();
        assert!(maps.maps.contains(&"simple".to_owned()));
        assert!(maps.maps.contains(&"city".to_owned()));
        assert_eq!(maps.current, "simple");
    }

    #[test]
    fn switching_maps_resets_the_simulation() {
        let mut boundary = Boundary::new(SimConfig::default()).unwrap();
        boundary
            .spawn_vehicle(Some("car"), Some("a"), Some("e"))
            .unwrap();
        assert_eq!(boundary.list_vehicles().len(), 1);
        boundary.switch_map("city").unwrap();
        assert_eq!(boundary.list_vehicles().len(), 0);
        assert_eq!(boundary.get_simulation_info().map, "city");
        // Nodes of the old map are gone.
        assert!(matches!(
            boundary.spawn_vehicle(Some("car"), Some("a"), Some("e")),
            Err(SimError::Validation(_))
        ));
    }

    #[test]
    fn interval_bounds_are_enforced() {
        let mut boundary = Boundary::new(SimConfig::default()).unwrap();
        assert!(matches!(
            boundary.start_continuous(10),
            Err(SimError::Validation(_))
        ));
        assert!(matches!(
            boundary.start_continuous(900),
            Err(SimError::Validation(_))
        ));
        boundary.start_continuous(100).unwrap();
        assert!(boundary.simulation().is_running());
        boundary.stop_continuous();
        assert!(!boundary.simulation().is_running());
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let mut boundary = Boundary::new(SimConfig::default()).unwrap();
        assert!(matches!(
            boundary.create_accident(Some("a"), Some("b"), Some("catastrophic")),
            Err(SimError::Validation(_))
        ));
    }
}
