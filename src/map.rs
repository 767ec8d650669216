//! Declarative map format and the named-map registry.

use crate::error::SimError;
use crate::graph::TravelMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A road map as declared in a map file.
///
/// ```json
/// {
///   "nodes": { "a": [0.0, 0.0], "b": [120.0, 40.0] },
///   "edges": [
///     { "from": "a", "to": "b", "distance": 126.0, "allowed": ["car"], "one_way": false }
///   ]
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapData {
    /// Node name to `[x, y]` planar coordinates.
    pub nodes: BTreeMap<String, [f64; 2]>,
    pub edges: Vec<EdgeSpec>,
}

/// One declared edge. `one_way: false` (the default) declares the road in
/// both directions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    pub distance: f64,
    pub allowed: Vec<TravelMode>,
    #[serde(default)]
    pub one_way: bool,
}

impl MapData {
    /// Parses map JSON.
    pub fn parse(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| SimError::MapLoad(e.to_string()))
    }
}

/// Where a registered map's JSON comes from.
enum MapSource {
    Builtin(&'static str),
    File(PathBuf),
}

/// Registry of available maps by name.
///
/// Ships with the built-in `simple` and `city` maps; file-backed maps can
/// be registered at runtime.
pub struct MapRegistry {
    maps: BTreeMap<String, MapSource>,
}

impl Default for MapRegistry {
    fn default() -> Self {
        let mut maps = BTreeMap::new();
        maps.insert(
            "simple".to_owned(),
            MapSource::Builtin(include_str!("../maps/simple.json")),
        );
        maps.insert(
            "city".to_owned(),
            MapSource::Builtin(include_str!("../maps/city.json")),
        );
        Self { maps }
    }
}

impl MapRegistry {
    /// Registers a file-backed map under `name`, replacing any previous
    /// registration of that name.
    pub fn register_file(&mut self, name: &str, path: PathBuf) {
        self.maps.insert(name.to_owned(), MapSource::File(path));
    }

    /// Names of all registered maps, sorted.
    pub fn names(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Loads and parses the named map.
    pub fn load(&self, name: &str) -> Result<MapData, SimError> {
        match self.maps.get(name) {
            Some(MapSource::Builtin(json)) => MapData::parse(json),
            Some(MapSource::File(path)) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| SimError::MapLoad(format!("{}: {e}", path.display())))?;
                MapData::parse(&json)
            }
            None => Err(SimError::NotFound(format!("map {name:?}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::RoadGraph;

    #[test]
    fn builtin_maps_load() {
        let registry = MapRegistry::default();
        for name in registry.names() {
            let data = registry.load(&name).unwrap();
            let graph = RoadGraph::from_map(&name, &data).unwrap();
            assert!(graph.node_count() >= 3, "map {name} too small");
            assert!(graph.edge_count() > graph.node_count());
        }
    }

    #[test]
    fn unknown_map_is_not_found() {
        let registry = MapRegistry::default();
        assert!(matches!(
            registry.load("atlantis"),
            Err(SimError::NotFound(_))
        ));
    }

    #[test]
    fn one_way_defaults_to_false() {
        let data = MapData::parse(
            r#"{ "nodes": { "a": [0,0], "b": [1,1] },
                 "edges": [ { "from": "a", "to": "b", "distance": 5.0, "allowed": ["car"] } ] }"#,
        )
        .unwrap();
        assert!(!data.edges[0].one_way);
    }
}
