//! Accidents and road blockages.
//!
//! An accident multiplies the affected edge's cost without closing it; a
//! blockage makes the edge impassable until lifted. The engine overlays
//! both onto routing costs through the analyzer and force-reroutes
//! vehicles whose paths cross a fresh blockage.

use crate::error::SimError;
use crate::graph::EdgeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Accident severity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Minor, Severity::Major, Severity::Severe];

    /// Factor composed onto the edge multiplier while the accident is
    /// active.
    pub fn penalty(self) -> f64 {
        match self {
            Severity::Minor => 1.5,
            Severity::Major => 2.5,
            Severity::Severe => 4.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Severe => "severe",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            "severe" => Ok(Severity::Severe),
            other => Err(SimError::Validation(format!("unknown severity {other:?}"))),
        }
    }
}

/// An active accident on a directed edge.
#[derive(Clone, Debug)]
pub struct Accident {
    pub id: String,
    pub edge: EdgeId,
    pub severity: Severity,
    pub created_tick: u64,
    /// Tick at which the accident clears itself, when auto-clearing is
    /// configured.
    pub clears_at_tick: Option<u64>,
}

/// An active blockage on a directed edge.
#[derive(Clone, Debug)]
pub struct Blockage {
    pub edge: EdgeId,
    pub reason: String,
    pub created_tick: u64,
}

/// Lifecycle of accidents and blockages.
#[derive(Default)]
pub struct IncidentManager {
    accidents: Vec<Accident>,
    blocked: HashMap<EdgeId, Blockage>,
    accident_counter: u64,
}

impl IncidentManager {
    /// Registers a new accident and returns it.
    pub fn create_accident(
        &mut self,
        edge: EdgeId,
        severity: Severity,
        created_tick: u64,
        clears_at_tick: Option<u64>,
    ) -> &Accident {
        self.accident_counter += 1;
        let accident = Accident {
            id: format!("accident_{}", self.accident_counter),
            edge,
            severity,
            created_tick,
            clears_at_tick,
        };
        log::info!(
            "accident {} ({}) on edge {:?}",
            accident.id,
            severity.as_str(),
            edge
        );
        self.accidents.push(accident);
        self.accidents.last().unwrap()
    }

    /// Removes the accident with the given id.
    pub fn resolve_accident(&mut self, id: &str) -> Result<Accident, SimError> {
        let idx = self
            .accidents
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| SimError::NotFound(format!("accident {id:?}")))?;
        let accident = self.accidents.remove(idx);
        log::info!("accident {} resolved", accident.id);
        Ok(accident)
    }

    /// Clears accidents whose auto-clear tick has passed, returning them.
    pub fn expire_accidents(&mut self, tick: u64) -> Vec<Accident> {
        let mut expired = Vec::new();
        self.accidents.retain(|a| match a.clears_at_tick {
            Some(at) if at <= tick => {
                expired.push(a.clone());
                false
            }
            _ => true,
        });
        for accident in &expired {
            log::info!("accident {} auto-cleared", accident.id);
        }
        expired
    }

    /// The most severe active accident on the edge, if any.
    pub fn worst_severity_on(&self, edge: EdgeId) -> Option<Severity> {
        self.accidents
            .iter()
            .filter(|a| a.edge == edge)
            .map(|a| a.severity)
            .max()
    }

    /// Marks an edge impassable.
    pub fn block(&mut self, edge: EdgeId, reason: &str, created_tick: u64) -> Result<(), SimError> {
        if self.blocked.contains_key(&edge) {
            return Err(SimError::Conflict(format!("edge {edge:?} already blocked")));
        }
        log::info!("edge {:?} blocked: {}", edge, reason);
        self.blocked.insert(
            edge,
            Blockage {
                edge,
                reason: reason.to_owned(),
                created_tick,
            },
        );
        Ok(())
    }

    /// Lifts a blockage.
    pub fn unblock(&mut self, edge: EdgeId) -> Result<Blockage, SimError> {
        let blockage = self
            .blocked
            .remove(&edge)
            .ok_or_else(|| SimError::Conflict(format!("edge {edge:?} is not blocked")))?;
        log::info!("edge {:?} unblocked", edge);
        Ok(blockage)
    }

    pub fn is_blocked(&self, edge: EdgeId) -> bool {
        self.blocked.contains_key(&edge)
    }

    /// Active accidents in creation order.
    pub fn accidents(&self) -> &[Accident] {
        &self.accidents
    }

    /// Active blockages, ordered by edge for stable output.
    pub fn blockages(&self) -> Vec<&Blockage> {
        let mut all: Vec<_> = self.blocked.values().collect();
        all.sort_by_key(|b| b.edge);
        all
    }

    pub fn clear(&mut self) {
        self.accidents.clear();
        self.blocked.clear();
        self.accident_counter = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accident_lifecycle() {
        let mut incidents = IncidentManager::default();
        let id = incidents
            .create_accident(EdgeId(1), Severity::Major, 3, None)
            .id
            .clone();
        assert_eq!(id, "accident_1");
        assert_eq!(incidents.worst_severity_on(EdgeId(1)), Some(Severity::Major));
        incidents.resolve_accident(&id).unwrap();
        assert!(incidents.worst_severity_on(EdgeId(1)).is_none());
        assert!(matches!(
            incidents.resolve_accident(&id),
            Err(SimError::NotFound(_))
        ));
    }

    #[test]
    fn worst_severity_wins() {
        let mut incidents = IncidentManager::default();
        incidents.create_accident(EdgeId(0), Severity::Minor, 0, None);
        incidents.create_accident(EdgeId(0), Severity::Severe, 0, None);
        assert_eq!(incidents.worst_severity_on(EdgeId(0)), Some(Severity::Severe));
    }

    #[test]
    fn expiry_honours_the_deadline() {
        let mut incidents = IncidentManager::default();
        incidents.create_accident(EdgeId(0), Severity::Minor, 0, Some(10));
        incidents.create_accident(EdgeId(1), Severity::Minor, 0, None);
        assert!(incidents.expire_accidents(9).is_empty());
        let expired = incidents.expire_accidents(10);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].edge, EdgeId(0));
        assert_eq!(incidents.accidents().len(), 1);
    }

    #[test]
    fn double_block_is_a_conflict() {
        let mut incidents = IncidentManager::default();
        incidents.block(EdgeId(2), "works", 0).unwrap();
        assert!(matches!(
            incidents.block(EdgeId(2), "works", 1),
            Err(SimError::Conflict(_))
        ));
        incidents.unblock(EdgeId(2)).unwrap();
        assert!(matches!(
            incidents.unblock(EdgeId(2)),
            Err(SimError::Conflict(_))
        ));
    }
}
