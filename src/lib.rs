//! Continuous-time multi-agent traffic microsimulation.
//!
//! A population of autonomous vehicles traverses a directed road graph.
//! Each tick the engine derives per-edge congestion from live occupancy,
//! samples edge cost multipliers, reroutes vehicles whose downstream
//! conditions degrade, and advances every vehicle with a car-following
//! model along curved edge geometry.
//!
//! The [`Simulation`] type owns the tick loop; [`Boundary`] wraps it with
//! the command/query operations an external transport (e.g. HTTP) exposes.

use slotmap::{new_key_type, SlotMap};
use vehicle::Vehicle;

pub mod analyzer;
pub mod boundary;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod incident;
pub mod map;
pub mod math;
pub mod occupancy;
pub mod router;
mod util;
pub mod vehicle;

new_key_type! {
    /// Arena key for vehicles. All cross-references between the engine,
    /// the occupancy index and the analyzer are held as these keys.
    pub struct VehicleId;
}

pub(crate) type VehicleSet = SlotMap<VehicleId, Vehicle>;

pub use boundary::Boundary;
pub use config::SimConfig;
pub use engine::Simulation;
pub use error::SimError;
pub use graph::{EdgeId, NodeId, RoadGraph, TravelMode};
pub use vehicle::VehicleStatus;
