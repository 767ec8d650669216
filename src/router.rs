//! Weighted shortest-path routing over live edge costs.
//!
//! A* with the straight-line heuristic on node coordinates. Edge costs
//! are supplied per query by the caller (the engine derives them from the
//! analyzer and active incidents), so a route always reflects the traffic
//! picture of the current tick. An infinite cost marks an impassable
//! edge.
//!
//! The heuristic is scaled by [`HEURISTIC_SCALE`], the minimum of the
//! free-flow multiplier range; without the scaling a sub-1.0 multiplier
//! would let the straight-line estimate overestimate and break
//! admissibility.

use crate::error::SimError;
use crate::graph::{EdgeId, NodeId, RoadGraph, TravelMode};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Lower bound of the free-flow multiplier range.
pub const HEURISTIC_SCALE: f64 = 0.5;

/// A computed route.
#[derive(Clone, Debug)]
pub struct Route {
    /// Node sequence from start to goal, inclusive.
    pub nodes: Vec<NodeId>,
    /// Total cost under the query's cost function.
    pub cost: f64,
    /// Cost of each traversed edge, `nodes.len() - 1` entries.
    pub edge_costs: Vec<f64>,
}

/// A frontier entry. The heap is a max-heap, so the ordering is reversed
/// on f-score; equal f-scores break toward the lexicographically lower
/// node name so expansion order is fully specified.
struct Candidate<'a> {
    f: f64,
    node: NodeId,
    name: &'a str,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.name.cmp(self.name))
    }
}

/// Finds the cheapest path from `start` to `goal` for `mode`.
///
/// Edges are skipped when `mode` is not allowed on them or when `cost`
/// returns a non-finite value. Returns [`SimError::NoPath`] when the goal
/// is unreachable.
pub fn route(
    graph: &RoadGraph,
    start: NodeId,
    goal: NodeId,
    mode: TravelMode,
    cost: impl Fn(EdgeId) -> f64,
) -> Result<Route, SimError> {
    if start == goal {
        return Ok(Route {
            nodes: vec![start],
            cost: 0.0,
            edge_costs: vec![],
        });
    }

    let n = graph.node_count();
    let mut g_score = vec![f64::INFINITY; n];
    let mut came_from: Vec<Option<(NodeId, EdgeId)>> = vec![None; n];
    let mut closed = vec![false; n];
    let mut open = BinaryHeap::new();

    g_score[start.index()] = 0.0;
    open.push(Candidate {
        f: heuristic(graph, start, goal),
        node: start,
        name: graph.node(start).name(),
    });

    while let Some(Candidate { node, .. }) = open.pop() {
        if node == goal {
            return Ok(reconstruct(&came_from, goal, &cost));
        }
        if closed[node.index()] {
            continue;
        }
        closed[node.index()] = true;

        let g = g_score[node.index()];
        for edge_id in graph.neighbors(node, mode) {
            let edge_cost = cost(edge_id);
            if !edge_cost.is_finite() {
                continue;
            }
            let next = graph.edge(edge_id).to();
            if closed[next.index()] {
                continue;
            }
            let tentative = g + edge_cost;
            if tentative < g_score[next.index()] {
                g_score[next.index()] = tentative;
                came_from[next.index()] = Some((node, edge_id));
                open.push(Candidate {
                    f: tentative + heuristic(graph, next, goal),
                    node: next,
                    name: graph.node(next).name(),
                });
            }
        }
    }

    Err(SimError::NoPath {
        from: graph.node(start).name().to_owned(),
        to: graph.node(goal).name().to_owned(),
    })
}

fn heuristic(graph: &RoadGraph, node: NodeId, goal: NodeId) -> f64 {
    HEURISTIC_SCALE * graph.distance_between(node, goal)
}

fn reconstruct(
    came_from: &[Option<(NodeId, EdgeId)>],
    goal: NodeId,
    cost: &impl Fn(EdgeId) -> f64,
) -> Route {
    let mut nodes = vec![goal];
    let mut edge_costs = vec![];
    let mut current = goal;
    while let Some((prev, edge_id)) = came_from[current.index()] {
        edge_costs.push(cost(edge_id));
        nodes.push(prev);
        current = prev;
    }
    nodes.reverse();
    edge_costs.reverse();
    let cost = edge_costs.iter().sum();
    Route {
        nodes,
        cost,
        edge_costs,
    }
}
