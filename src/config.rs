//! Tunable simulation parameters.

use serde::{Deserialize, Serialize};

/// Smallest accepted continuous tick interval in milliseconds.
pub const MIN_TICK_INTERVAL_MS: u64 = 25;

/// Largest accepted continuous tick interval in milliseconds.
pub const MAX_TICK_INTERVAL_MS: u64 = 500;

/// Configuration of the simulation engine.
///
/// All fields have working defaults; construct with `SimConfig::default()`
/// and override selectively. The configuration is captured when a
/// [`crate::Simulation`] is created and survives `reset`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Relative increase of the remaining path cost over the planned cost
    /// that triggers a reroute.
    pub reroute_threshold: f64,
    /// How many upcoming edges the reroute decision inspects.
    pub reroute_lookahead_edges: usize,
    /// Congestion probability at which a lookahead edge triggers a reroute.
    pub reroute_probability_threshold: f64,
    /// Minimum ticks between adopted reroutes of the same vehicle.
    /// Triggers re-evaluate every tick, and forced replans around fresh
    /// blockages bypass the limit.
    pub reroute_cooldown_ticks: u64,
    /// Weighted vehicle capacity of an edge of reference length.
    pub base_edge_capacity: f64,
    /// Base length at which an edge has exactly `base_edge_capacity`.
    /// Longer edges scale proportionally; shorter edges do not shrink.
    pub capacity_length_ref: f64,
    /// Exponential smoothing factor for edge multipliers and vehicle
    /// target speeds.
    pub smoothing_alpha: f64,
    /// Number of multiplier samples kept per edge for the congestion
    /// probability estimate.
    pub history_window: usize,
    /// Whether the engine tops up the population every tick.
    pub auto_spawn: bool,
    /// Population the auto-spawner aims for.
    pub auto_spawn_target: usize,
    /// Maximum vehicles spawned per tick by the auto-spawner.
    pub auto_spawn_batch: usize,
    /// Attempts at finding a routable (start, goal) pair per spawn.
    pub spawn_retry_limit: usize,
    /// Interval of the continuous tick loop in milliseconds.
    pub tick_interval_ms: u64,
    /// When set, accidents clear themselves after this many ticks.
    /// Unset means accidents persist until resolved.
    pub accident_duration_ticks: Option<u64>,
    /// Per-tick probability of a spontaneous random accident.
    pub random_accident_rate: f64,
    /// Seed of the engine RNG. `reset` restores the RNG to this seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            reroute_threshold: 0.20,
            reroute_lookahead_edges: 3,
            reroute_probability_threshold: 0.5,
            reroute_cooldown_ticks: 5,
            base_edge_capacity: 4.0,
            capacity_length_ref: 100.0,
            smoothing_alpha: 0.3,
            history_window: 20,
            auto_spawn: false,
            auto_spawn_target: 75,
            auto_spawn_batch: 3,
            spawn_retry_limit: 5,
            tick_interval_ms: 100,
            accident_duration_ticks: None,
            random_accident_rate: 0.0,
            seed: 42,
        }
    }
}
