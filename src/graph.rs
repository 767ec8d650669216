//! The directed road network.

use crate::error::SimError;
use crate::map::MapData;
use crate::math::Point2d;
use cgmath::MetricSpace;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

pub use curve::{curve_offset, EdgeCurve};

mod curve;

/// Index of a node in the road graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// Index of a directed edge in the road graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EdgeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a vehicle travels. Doubles as the vehicle type: every vehicle
/// moves in exactly one mode and edges restrict which modes may enter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Car,
    Bicycle,
    Pedestrian,
}

impl TravelMode {
    pub const ALL: [TravelMode; 3] = [TravelMode::Car, TravelMode::Bicycle, TravelMode::Pedestrian];

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Car => "car",
            TravelMode::Bicycle => "bicycle",
            TravelMode::Pedestrian => "pedestrian",
        }
    }
}

impl std::str::FromStr for TravelMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(TravelMode::Car),
            "bicycle" => Ok(TravelMode::Bicycle),
            "pedestrian" => Ok(TravelMode::Pedestrian),
            other => Err(SimError::Validation(format!("unknown mode {other:?}"))),
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the road network.
pub struct Node {
    name: String,
    pos: Point2d,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pos(&self) -> Point2d {
        self.pos
    }
}

/// A directed edge of the road network.
pub struct Edge {
    from: NodeId,
    to: NodeId,
    /// Base length in graph units; the unit of routing costs.
    base_len: f64,
    modes: SmallVec<[TravelMode; 3]>,
    one_way: bool,
    curve: EdgeCurve,
}

impl Edge {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Base length `L₀` in graph units.
    pub fn base_len(&self) -> f64 {
        self.base_len
    }

    pub fn one_way(&self) -> bool {
        self.one_way
    }

    pub fn modes(&self) -> &[TravelMode] {
        &self.modes
    }

    pub fn allows(&self, mode: TravelMode) -> bool {
        self.modes.contains(&mode)
    }

    /// The rendering curve; its sampled length converts vehicle speeds
    /// to fractional edge progress.
    pub fn curve(&self) -> &EdgeCurve {
        &self.curve
    }
}

/// The road network: nodes with planar coordinates and directed edges
/// with length, mode restrictions and curve geometry.
///
/// Nodes and edges are interned; all lookups by id are O(1) and all
/// iteration orders follow the (deterministic) load order.
pub struct RoadGraph {
    name: String,
    nodes: Vec<Node>,
    node_index: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    edge_index: HashMap<(NodeId, NodeId), EdgeId>,
    out_edges: Vec<SmallVec<[EdgeId; 4]>>,
}

impl RoadGraph {
    /// Builds a road graph from declarative map data.
    ///
    /// Edges with `one_way: false` materialise their reverse twin with
    /// identical attributes (the twin gets its own curve, derived from
    /// the reversed name pair).
    pub fn from_map(name: &str, data: &MapData) -> Result<Self, SimError> {
        if data.nodes.is_empty() {
            return Err(SimError::MapLoad(format!("map {name:?} has no nodes")));
        }

        let mut graph = RoadGraph {
            name: name.to_owned(),
            nodes: Vec::with_capacity(data.nodes.len()),
            node_index: HashMap::with_capacity(data.nodes.len()),
            edges: Vec::with_capacity(data.edges.len()),
            edge_index: HashMap::with_capacity(data.edges.len()),
            out_edges: Vec::new(),
        };

        for (node_name, [x, y]) in &data.nodes {
            let id = NodeId(graph.nodes.len() as u32);
            graph.nodes.push(Node {
                name: node_name.clone(),
                pos: Point2d::new(*x, *y),
            });
            graph.node_index.insert(node_name.clone(), id);
        }
        graph.out_edges = vec![SmallVec::new(); graph.nodes.len()];

        for spec in &data.edges {
            if spec.distance <= 0.0 {
                return Err(SimError::MapLoad(format!(
                    "edge {} -> {} has non-positive distance",
                    spec.from, spec.to
                )));
            }
            if spec.allowed.is_empty() {
                return Err(SimError::MapLoad(format!(
                    "edge {} -> {} allows no modes",
                    spec.from, spec.to
                )));
            }
            let from = graph.resolve(&spec.from)?;
            let to = graph.resolve(&spec.to)?;
            if from == to {
                return Err(SimError::MapLoad(format!("self-loop at {}", spec.from)));
            }
            graph.push_edge(from, to, spec)?;
            if !spec.one_way {
                graph.push_edge(to, from, spec)?;
            }
        }

        Ok(graph)
    }

    fn resolve(&self, name: &str) -> Result<NodeId, SimError> {
        self.node_index
            .get(name)
            .copied()
            .ok_or_else(|| SimError::MapLoad(format!("edge references unknown node {name:?}")))
    }

    fn push_edge(&mut self, from: NodeId, to: NodeId, spec: &crate::map::EdgeSpec) -> Result<EdgeId, SimError> {
        if self.edge_index.contains_key(&(from, to)) {
            return Err(SimError::MapLoad(format!(
                "duplicate edge {} -> {}",
                self.nodes[from.index()].name,
                self.nodes[to.index()].name
            )));
        }
        let id = EdgeId(self.edges.len() as u32);
        let curve = EdgeCurve::between(
            &self.nodes[from.index()].name,
            &self.nodes[to.index()].name,
            self.nodes[from.index()].pos,
            self.nodes[to.index()].pos,
        );
        self.edges.push(Edge {
            from,
            to,
            base_len: spec.distance,
            modes: spec.allowed.iter().copied().collect(),
            one_way: spec.one_way,
            curve,
        });
        self.edge_index.insert((from, to), id);
        self.out_edges[from.index()].push(id);
        Ok(id)
    }

    /// Name of the map this graph was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// Looks a node up by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    /// O(1) lookup of the directed edge between two nodes.
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.edge_index.get(&(from, to)).copied()
    }

    /// Iterates all nodes in load order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Iterates all directed edges in load order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i as u32), e))
    }

    /// Outgoing edges of `node` passable by `mode`. Blockages are not a
    /// graph concern; the router's cost function handles them.
    pub fn neighbors(&self, node: NodeId, mode: TravelMode) -> impl Iterator<Item = EdgeId> + '_ {
        self.out_edges[node.index()]
            .iter()
            .copied()
            .filter(move |id| self.edges[id.index()].allows(mode))
    }

    /// Euclidean distance between two nodes' coordinates.
    pub fn distance_between(&self, a: NodeId, b: NodeId) -> f64 {
        self.nodes[a.index()].pos.distance(self.nodes[b.index()].pos)
    }

    /// Names of an edge's endpoints, `(from, to)`.
    pub fn edge_names(&self, id: EdgeId) -> (&str, &str) {
        let edge = &self.edges[id.index()];
        (
            self.nodes[edge.from.index()].name.as_str(),
            self.nodes[edge.to.index()].name.as_str(),
        )
    }
}
