//! Live index of which vehicles are on which directed edge.

use crate::error::SimError;
use crate::graph::EdgeId;
use crate::{VehicleId, VehicleSet};
use std::collections::HashMap;

/// Maps each directed edge to the vehicles currently traversing it.
///
/// Membership is strict: a vehicle is on its `(current_node, next_node)`
/// edge only while `0 < position_on_edge < 1`. Freshly spawned and
/// freshly transitioned vehicles sit at position 0 and enter the index
/// on their first position update. Updates happen atomically with the
/// position change, so a per-tick snapshot is always self-consistent.
#[derive(Default)]
pub struct Occupancy {
    per_edge: HashMap<EdgeId, Vec<VehicleId>>,
}

impl Occupancy {
    /// Records `vehicle` entering `edge`.
    pub fn enter(&mut self, edge: EdgeId, vehicle: VehicleId) {
        self.per_edge.entry(edge).or_default().push(vehicle);
    }

    /// Records `vehicle` leaving `edge`.
    ///
    /// Leaving an edge the vehicle never entered means the index and the
    /// vehicle state have diverged; that is unrecoverable and reported as
    /// [`SimError::OccupancyCorrupt`].
    pub fn leave(&mut self, edge: EdgeId, vehicle: VehicleId) -> Result<(), SimError> {
        let slot = self.per_edge.get_mut(&edge);
        let removed = slot
            .map(|ids| {
                let before = ids.len();
                ids.retain(|id| *id != vehicle);
                before != ids.len()
            })
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(SimError::OccupancyCorrupt(format!(
                "vehicle {vehicle:?} left edge {edge:?} it never entered"
            )))
        }
    }

    /// The vehicles on `edge`, in entry order.
    pub fn on(&self, edge: EdgeId) -> &[VehicleId] {
        self.per_edge.get(&edge).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of vehicles on `edge`.
    pub fn count(&self, edge: EdgeId) -> usize {
        self.on(edge).len()
    }

    /// Sum of the capacity weights of the vehicles on `edge`.
    pub fn weighted(&self, edge: EdgeId, vehicles: &VehicleSet) -> f64 {
        self.on(edge)
            .iter()
            .filter_map(|id| vehicles.get(*id))
            .map(|v| v.kind().capacity_weight())
            .sum()
    }

    /// Drops all occupancy state.
    pub fn clear(&mut self) {
        self.per_edge.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::SlotMap;

    fn probe_keys(count: usize) -> Vec<VehicleId> {
        let mut arena: SlotMap<VehicleId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn enter_then_leave_round_trips() {
        let mut occupancy = Occupancy::default();
        let keys = probe_keys(2);
        let edge = EdgeId(0);
        occupancy.enter(edge, keys[0]);
        occupancy.enter(edge, keys[1]);
        assert_eq!(occupancy.count(edge), 2);
        assert_eq!(occupancy.on(edge), [keys[0], keys[1]]);
        occupancy.leave(edge, keys[0]).unwrap();
        assert_eq!(occupancy.on(edge), [keys[1]]);
    }

    #[test]
    fn leaving_unentered_edge_is_corrupt() {
        let mut occupancy = Occupancy::default();
        let keys = probe_keys(1);
        assert!(matches!(
            occupancy.leave(EdgeId(3), keys[0]),
            Err(SimError::OccupancyCorrupt(_))
        ));
    }
}
