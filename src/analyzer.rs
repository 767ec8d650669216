//! Per-edge congestion analysis.
//!
//! Each tick the analyzer rebuilds one [`EdgeFlow`] per directed edge
//! from live occupancy: weighted load, density against capacity, the
//! congestion level, a sampled-and-smoothed cost multiplier and a fused
//! congestion probability. The engine's routing costs and reroute
//! decisions all read from here.

use crate::config::SimConfig;
use crate::graph::{EdgeId, RoadGraph};
use crate::incident::IncidentManager;
use crate::occupancy::Occupancy;
use crate::util::Interval;
use crate::VehicleSet;
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Congestion bands derived from density.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    FreeFlow,
    Light,
    Moderate,
    Heavy,
    Congested,
}

impl CongestionLevel {
    /// Classifies a density value.
    pub fn from_density(density: f64) -> Self {
        if density < 0.3 {
            CongestionLevel::FreeFlow
        } else if density < 0.6 {
            CongestionLevel::Light
        } else if density < 0.85 {
            CongestionLevel::Moderate
        } else if density < 1.0 {
            CongestionLevel::Heavy
        } else {
            CongestionLevel::Congested
        }
    }

    /// The range the cost multiplier is sampled from at this level.
    pub fn multiplier_range(self) -> Interval<f64> {
        match self {
            CongestionLevel::FreeFlow => Interval::new(0.5, 0.8),
            CongestionLevel::Light => Interval::new(0.8, 1.2),
            CongestionLevel::Moderate => Interval::new(1.2, 2.0),
            CongestionLevel::Heavy => Interval::new(2.0, 3.5),
            CongestionLevel::Congested => Interval::new(3.5, 5.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CongestionLevel::FreeFlow => "free_flow",
            CongestionLevel::Light => "light",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::Heavy => "heavy",
            CongestionLevel::Congested => "congested",
        }
    }
}

/// The traffic state of one directed edge, recomputed every tick.
#[derive(Clone, Debug)]
pub struct EdgeFlow {
    pub vehicle_count: usize,
    pub weighted_load: f64,
    pub capacity: f64,
    pub density: f64,
    pub level: CongestionLevel,
    /// Smoothed cost multiplier, before any incident overlay.
    pub multiplier: f64,
    /// Fused likelihood that this edge is or will become congested.
    pub probability: f64,
}

impl EdgeFlow {
    fn fresh(capacity: f64) -> Self {
        Self {
            vehicle_count: 0,
            weighted_load: 0.0,
            capacity,
            density: 0.0,
            level: CongestionLevel::FreeFlow,
            multiplier: 1.0,
            probability: 0.0,
        }
    }
}

/// Derives per-edge congestion state from occupancy and recent history.
pub struct TrafficAnalyzer {
    flows: Vec<EdgeFlow>,
    history: Vec<VecDeque<f64>>,
    alpha: f64,
    window: usize,
}

impl TrafficAnalyzer {
    pub fn new(graph: &RoadGraph, config: &SimConfig) -> Self {
        let flows = graph
            .edges()
            .map(|(_, edge)| EdgeFlow::fresh(edge_capacity(edge.base_len(), config)))
            .collect::<Vec<_>>();
        let history = vec![VecDeque::with_capacity(config.history_window); flows.len()];
        Self {
            flows,
            history,
            alpha: config.smoothing_alpha,
            window: config.history_window,
        }
    }

    /// Recomputes every edge's flow state from current occupancy.
    ///
    /// Edges are visited in load order and every multiplier draw goes
    /// through `rng`, so a seeded run reproduces exactly.
    pub fn recompute(
        &mut self,
        graph: &RoadGraph,
        occupancy: &Occupancy,
        vehicles: &VehicleSet,
        rng: &mut impl Rng,
    ) {
        for (edge_id, _) in graph.edges() {
            let idx = edge_id.index();
            let vehicle_count = occupancy.count(edge_id);
            let weighted_load = occupancy.weighted(edge_id, vehicles);
            let capacity = self.flows[idx].capacity;
            let density = weighted_load / capacity;
            let level = CongestionLevel::from_density(density);

            let sampled = sample_multiplier(level, rng);
            let smoothed = self.alpha * sampled + (1.0 - self.alpha) * self.flows[idx].multiplier;

            let history = &mut self.history[idx];
            if history.len() == self.window {
                history.pop_front();
            }
            history.push_back(smoothed);

            let probability = fuse_probability(density, history);

            self.flows[idx] = EdgeFlow {
                vehicle_count,
                weighted_load,
                capacity,
                density,
                level,
                multiplier: smoothed,
                probability,
            };
        }
    }

    pub fn flow(&self, edge: EdgeId) -> &EdgeFlow {
        &self.flows[edge.index()]
    }

    pub fn probability(&self, edge: EdgeId) -> f64 {
        self.flows[edge.index()].probability
    }

    /// The multiplier with accident penalties composed in.
    pub fn effective_multiplier(&self, edge: EdgeId, incidents: &IncidentManager) -> f64 {
        let penalty = incidents
            .worst_severity_on(edge)
            .map(|s| s.penalty())
            .unwrap_or(1.0);
        self.flows[edge.index()].multiplier * penalty
    }

    /// Current traversal cost of an edge: base length times the effective
    /// multiplier, infinite while the edge is blocked.
    pub fn edge_cost(&self, graph: &RoadGraph, incidents: &IncidentManager, edge: EdgeId) -> f64 {
        if incidents.is_blocked(edge) {
            return f64::INFINITY;
        }
        graph.edge(edge).base_len() * self.effective_multiplier(edge, incidents)
    }

    /// The `k` most stressed edges: by descending probability, then
    /// descending vehicle count, then ascending edge name pair.
    pub fn bottlenecks<'a>(
        &'a self,
        graph: &'a RoadGraph,
        k: usize,
    ) -> Vec<(EdgeId, &'a EdgeFlow)> {
        self.flows
            .iter()
            .enumerate()
            .map(|(idx, flow)| (EdgeId(idx as u32), flow))
            .sorted_by(|(a_id, a), (b_id, b)| {
                b.probability
                    .total_cmp(&a.probability)
                    .then_with(|| b.vehicle_count.cmp(&a.vehicle_count))
                    .then_with(|| graph.edge_names(*a_id).cmp(&graph.edge_names(*b_id)))
            })
            .take(k)
            .collect()
    }

    /// Drops all derived state and history; capacities are retained.
    pub fn reset(&mut self) {
        for flow in &mut self.flows {
            *flow = EdgeFlow::fresh(flow.capacity);
        }
        for history in &mut self.history {
            history.clear();
        }
    }

    pub fn flows(&self) -> impl Iterator<Item = (EdgeId, &EdgeFlow)> {
        self.flows
            .iter()
            .enumerate()
            .map(|(idx, flow)| (EdgeId(idx as u32), flow))
    }
}

/// Capacity in weighted vehicles: the base capacity scaled up for edges
/// longer than the reference length. Short edges keep the base capacity.
fn edge_capacity(base_len: f64, config: &SimConfig) -> f64 {
    config.base_edge_capacity * (base_len / config.capacity_length_ref).max(1.0)
}

/// Draws a multiplier uniformly from the level's range. A degenerate
/// range degrades to the neutral multiplier instead of panicking.
fn sample_multiplier(level: CongestionLevel, rng: &mut impl Rng) -> f64 {
    let range = level.multiplier_range();
    if range.min < range.max {
        range.lerp(rng.gen::<f64>())
    } else {
        1.0
    }
}

/// Fuses live density with the recent multiplier history into a
/// congestion probability in `[0, 1]`.
fn fuse_probability(density: f64, history: &VecDeque<f64>) -> f64 {
    let base = density.min(1.0);
    let hist = if history.is_empty() {
        0.0
    } else {
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        ((mean - 1.0).clamp(0.0, 1.0) / 2.0).min(0.5)
    };
    (base + hist).min(1.0)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn level_thresholds_are_half_open() {
        assert_eq!(CongestionLevel::from_density(0.0), CongestionLevel::FreeFlow);
        assert_eq!(CongestionLevel::from_density(0.2999), CongestionLevel::FreeFlow);
        assert_eq!(CongestionLevel::from_density(0.3), CongestionLevel::Light);
        assert_eq!(CongestionLevel::from_density(0.6), CongestionLevel::Moderate);
        assert_eq!(CongestionLevel::from_density(0.85), CongestionLevel::Heavy);
        assert_eq!(CongestionLevel::from_density(0.9999), CongestionLevel::Heavy);
        assert_eq!(CongestionLevel::from_density(1.0), CongestionLevel::Congested);
        assert_eq!(CongestionLevel::from_density(4.2), CongestionLevel::Congested);
    }

    #[test]
    fn probability_saturates_with_density() {
        let history = VecDeque::new();
        assert_approx_eq!(fuse_probability(0.4, &history), 0.4);
        assert_approx_eq!(fuse_probability(3.0, &history), 1.0);
    }

    #[test]
    fn history_contributes_at_most_half() {
        let mut history = VecDeque::new();
        for _ in 0..20 {
            history.push_back(4.8);
        }
        assert_approx_eq!(fuse_probability(0.1, &history), 0.6);
        // A calm history adds nothing.
        history.clear();
        for _ in 0..20 {
            history.push_back(0.7);
        }
        assert_approx_eq!(fuse_probability(0.1, &history), 0.1);
    }

    #[test]
    fn capacity_scales_with_length_but_never_shrinks() {
        let config = SimConfig::default();
        assert_approx_eq!(edge_capacity(100.0, &config), config.base_edge_capacity);
        assert_approx_eq!(edge_capacity(50.0, &config), config.base_edge_capacity);
        assert_approx_eq!(edge_capacity(300.0, &config), 3.0 * config.base_edge_capacity);
    }
}
