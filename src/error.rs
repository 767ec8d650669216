//! Error kinds surfaced by the simulation.

use thiserror::Error;

/// Errors produced by the engine and the external boundary.
///
/// The first four variants are caller errors and leave the simulation
/// untouched. [`SimError::MapLoad`] and [`SimError::OccupancyCorrupt`] are
/// fatal: the engine state can no longer be trusted and must be reset or
/// reloaded.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed input: unknown mode, unknown node, bad severity,
    /// malformed spawn distribution, out-of-range tick interval.
    #[error("validation: {0}")]
    Validation(String),

    /// A referenced vehicle or incident does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation contradicts current state, e.g. blocking an
    /// already-blocked edge.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The goal is unreachable under current costs and restrictions.
    #[error("no path from {from} to {to}")]
    NoPath { from: String, to: String },

    /// The map file could not be read or violates a graph invariant.
    #[error("map load failed: {0}")]
    MapLoad(String),

    /// The occupancy index disagrees with vehicle state, e.g. a vehicle
    /// left an edge it never entered. The current tick is aborted.
    #[error("occupancy corrupt: {0}")]
    OccupancyCorrupt(String),
}

impl SimError {
    /// Stable machine-readable kind, used in wire error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::Validation(_) => "validation",
            SimError::NotFound(_) => "not-found",
            SimError::Conflict(_) => "conflict",
            SimError::NoPath { .. } => "no-path",
            SimError::MapLoad(_) => "map-load",
            SimError::OccupancyCorrupt(_) => "occupancy-corrupt",
        }
    }

    /// Whether the engine can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::MapLoad(_) | SimError::OccupancyCorrupt(_))
    }
}
