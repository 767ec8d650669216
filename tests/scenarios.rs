//! End-to-end simulation scenarios.

use traffic_flow::engine::TypeDistribution;
use traffic_flow::map::MapData;
use traffic_flow::{Boundary, RoadGraph, SimConfig, SimError, Simulation, TravelMode, VehicleStatus};

fn sim_from(json: &str, config: SimConfig) -> Simulation {
    let data = MapData::parse(json).unwrap();
    let graph = RoadGraph::from_map("test", &data).unwrap();
    Simulation::new(graph, config)
}

fn path_names(sim: &Simulation, id: &str) -> Vec<String> {
    sim.vehicle(id)
        .unwrap()
        .path()
        .iter()
        .map(|n| sim.graph().node(*n).name().to_owned())
        .collect()
}

/// A three-node chain; a single car crosses it without ever rerouting.
#[test]
fn simple_traversal_arrives() {
    let mut sim = sim_from(
        r#"{
            "nodes": { "a": [0.0, 0.0], "b": [60.0, 0.0], "c": [120.0, 0.0] },
            "edges": [
                { "from": "a", "to": "b", "distance": 2.0, "allowed": ["car"], "one_way": true },
                { "from": "b", "to": "c", "distance": 2.0, "allowed": ["car"], "one_way": true }
            ]
        }"#,
        SimConfig::default(),
    );

    let id = sim
        .spawn_vehicle(Some(TravelMode::Car), Some("a"), Some("c"))
        .unwrap();
    assert_eq!(path_names(&sim, &id), ["a", "b", "c"]);

    let mut arrived_at = None;
    for tick in 0..2000 {
        sim.step(0.1).unwrap();
        let vehicle = sim.vehicle(&id).unwrap();
        assert!(vehicle.position_on_edge() >= 0.0 && vehicle.position_on_edge() <= 1.0);
        if vehicle.status() == VehicleStatus::Arrived {
            arrived_at = Some(tick);
            break;
        }
    }
    assert!(arrived_at.is_some(), "vehicle never arrived");

    let vehicle = sim.vehicle(&id).unwrap();
    assert_eq!(vehicle.reroute_count(), 0);
    assert_eq!(
        sim.graph().node(vehicle.current_node()).name(),
        "c",
        "arrived vehicle rests at its goal"
    );
    // Arrived vehicles no longer appear in occupancy; the flows of the
    // following tick see an empty network.
    sim.step(0.1).unwrap();
    for (_, flow) in sim.analyzer().flows() {
        assert_eq!(flow.vehicle_count, 0);
    }
}

/// Five cars released back-to-back onto one long edge form a jam with
/// monotone target speeds behind the leader.
#[test]
fn car_following_jam_orders_target_speeds() {
    let mut sim = sim_from(
        r#"{
            "nodes": { "j1": [0.0, 0.0], "j2": [500.0, 0.0] },
            "edges": [
                { "from": "j1", "to": "j2", "distance": 500.0, "allowed": ["car"], "one_way": true }
            ]
        }"#,
        SimConfig::default(),
    );

    let mut ids = Vec::new();
    for i in 0..5 {
        let id = sim
            .spawn_vehicle(Some(TravelMode::Car), Some("j1"), Some("j2"))
            .unwrap();
        ids.push(id);
        if i < 4 {
            for _ in 0..15 {
                sim.step(0.1).unwrap();
            }
        }
    }
    sim.step(0.1).unwrap();

    let targets: Vec<f64> = ids
        .iter()
        .map(|id| sim.vehicle(id).unwrap().target_speed())
        .collect();

    // Leader runs free at (at least) the nominal type maximum.
    assert!(
        targets[0] >= TravelMode::Car.max_speed(),
        "leader target {} below type max",
        targets[0]
    );
    // Each follower's target is bounded by its leader's.
    for pair in targets.windows(2) {
        assert!(
            pair[1] <= pair[0] + 1e-9,
            "follower target {} exceeds leader {}",
            pair[1],
            pair[0]
        );
    }
    // The last car sits pinned behind the queue.
    let last = sim.vehicle(&ids[4]).unwrap();
    assert_eq!(last.status(), VehicleStatus::Stuck);
    assert_eq!(last.current_speed(), 0.0);
}

fn parallel_paths_map() -> &'static str {
    r#"{
        "nodes": { "a": [0.0, 100.0], "b": [200.0, 0.0], "c": [200.0, 200.0], "d": [400.0, 100.0] },
        "edges": [
            { "from": "a", "to": "b", "distance": 150.0, "allowed": ["car"], "one_way": true },
            { "from": "b", "to": "d", "distance": 150.0, "allowed": ["car"], "one_way": true },
            { "from": "a", "to": "c", "distance": 200.0, "allowed": ["car"], "one_way": true },
            { "from": "c", "to": "d", "distance": 200.0, "allowed": ["car"], "one_way": true }
        ]
    }"#
}

/// Blocking the committed corridor forces a reroute onto the alternative.
#[test]
fn blockage_forces_reroute() {
    let mut sim = sim_from(parallel_paths_map(), SimConfig::default());

    let id = sim
        .spawn_vehicle(Some(TravelMode::Car), Some("a"), Some("d"))
        .unwrap();
    assert_eq!(path_names(&sim, &id), ["a", "b", "d"]);

    sim.block_road("b", "d", "collision cleanup").unwrap();
    for _ in 0..2 {
        sim.step(0.1).unwrap();
    }

    let vehicle = sim.vehicle(&id).unwrap();
    assert_eq!(path_names(&sim, &id), ["a", "c", "d"]);
    assert!(vehicle.reroute_count() >= 1);
}

/// A mode with no usable edges is rejected without touching state.
#[test]
fn pedestrian_spawn_rejected_on_car_only_graph() {
    let mut sim = sim_from(parallel_paths_map(), SimConfig::default());

    let result = sim.spawn_vehicle(Some(TravelMode::Pedestrian), Some("a"), Some("d"));
    assert!(matches!(result, Err(SimError::NoPath { .. })));
    assert_eq!(sim.total_spawned(), 0);
    assert_eq!(sim.active_count(), 0);
}

/// The overloaded edge tops the congestion report.
#[test]
fn bottleneck_ranking_prefers_the_overloaded_edge() {
    let config = SimConfig {
        base_edge_capacity: 3.0,
        ..SimConfig::default()
    };
    let data = MapData::parse(
        r#"{
            "nodes": { "x": [0.0, 0.0], "y": [100.0, 0.0], "z": [200.0, 0.0] },
            "edges": [
                { "from": "x", "to": "y", "distance": 100.0, "allowed": ["car"], "one_way": true },
                { "from": "y", "to": "z", "distance": 100.0, "allowed": ["car"], "one_way": true }
            ]
        }"#,
    )
    .unwrap();
    let graph = RoadGraph::from_map("bottleneck", &data).unwrap();
    let mut sim = Simulation::new(graph, config);

    for _ in 0..10 {
        sim.spawn_vehicle(Some(TravelMode::Car), Some("x"), Some("y"))
            .unwrap();
    }
    for _ in 0..2 {
        sim.spawn_vehicle(Some(TravelMode::Car), Some("y"), Some("z"))
            .unwrap();
    }
    // One tick moves every vehicle off position 0 and onto its edge;
    // the next tick's analysis sees the full load.
    sim.step(0.1).unwrap();
    sim.step(0.1).unwrap();

    let ranked = sim.analyzer().bottlenecks(sim.graph(), 10);
    let (top_edge, top_flow) = ranked[0];
    assert_eq!(sim.graph().edge_names(top_edge), ("x", "y"));
    assert_eq!(
        top_flow.level,
        traffic_flow::analyzer::CongestionLevel::Congested
    );
    assert!(top_flow.probability >= 0.9);
    assert_eq!(top_flow.vehicle_count, 10);
}

/// Edge occupancy requires strictly positive progress: a vehicle at
/// position 0, whether freshly spawned or freshly transitioned, is not
/// yet on the edge and joins it on its first position update.
#[test]
fn occupancy_is_strict_at_spawn_and_transition() {
    let mut sim = sim_from(
        r#"{
            "nodes": { "a": [0.0, 0.0], "b": [100.0, 0.0], "c": [200.0, 0.0] },
            "edges": [
                { "from": "a", "to": "b", "distance": 100.0, "allowed": ["car"], "one_way": true },
                { "from": "b", "to": "c", "distance": 100.0, "allowed": ["car"], "one_way": true }
            ]
        }"#,
        SimConfig::default(),
    );

    let id = sim
        .spawn_vehicle(Some(TravelMode::Car), Some("a"), Some("c"))
        .unwrap();
    let a = sim.graph().node_id("a").unwrap();
    let b = sim.graph().node_id("b").unwrap();
    let c = sim.graph().node_id("c").unwrap();
    let ab = sim.graph().edge_between(a, b).unwrap();
    let bc = sim.graph().edge_between(b, c).unwrap();

    // Freshly spawned at position 0: on no edge yet.
    assert_eq!(sim.occupancy().count(ab), 0);
    sim.step(0.1).unwrap();
    assert!(sim.vehicle(&id).unwrap().position_on_edge() > 0.0);
    assert_eq!(sim.occupancy().count(ab), 1);

    // Drive until the vehicle transitions onto (b, c).
    let mut transitioned = false;
    for _ in 0..2000 {
        sim.step(0.1).unwrap();
        let vehicle = sim.vehicle(&id).unwrap();
        if vehicle.current_node() == b && vehicle.position_on_edge() == 0.0 {
            transitioned = true;
            break;
        }
    }
    assert!(transitioned, "vehicle never reached the second edge");

    // At the transition instant it occupies neither edge.
    assert_eq!(sim.occupancy().count(ab), 0);
    assert_eq!(sim.occupancy().count(bc), 0);
    sim.step(0.1).unwrap();
    assert_eq!(sim.occupancy().count(bc), 1);
}

/// No vehicle ever enters a blocked edge; unblocking restores the trip.
#[test]
fn blocked_edge_is_never_entered_and_unblock_restores_flow() {
    let mut sim = sim_from(
        r#"{
            "nodes": { "a": [0.0, 0.0], "b": [80.0, 0.0], "c": [160.0, 0.0] },
            "edges": [
                { "from": "a", "to": "b", "distance": 80.0, "allowed": ["car"], "one_way": true },
                { "from": "b", "to": "c", "distance": 80.0, "allowed": ["car"], "one_way": true }
            ]
        }"#,
        SimConfig::default(),
    );

    let id = sim
        .spawn_vehicle(Some(TravelMode::Car), Some("a"), Some("c"))
        .unwrap();
    sim.step(0.1).unwrap();
    sim.block_road("b", "c", "burst water main").unwrap();

    let b = sim.graph().node_id("b").unwrap();
    let c = sim.graph().node_id("c").unwrap();
    for _ in 0..150 {
        sim.step(0.1).unwrap();
        let vehicle = sim.vehicle(&id).unwrap();
        assert_ne!(
            vehicle.current_edge_nodes(),
            Some((b, c)),
            "vehicle entered the blocked edge"
        );
        assert!(vehicle.is_active());
    }
    // Pinned before the blocked edge with nowhere to go.
    let vehicle = sim.vehicle(&id).unwrap();
    assert_eq!(vehicle.status(), VehicleStatus::Stuck);

    sim.unblock_road("b", "c").unwrap();
    let mut arrived = false;
    for _ in 0..600 {
        sim.step(0.1).unwrap();
        if sim.vehicle(&id).unwrap().status() == VehicleStatus::Arrived {
            arrived = true;
            break;
        }
    }
    assert!(arrived, "vehicle never recovered after unblock");
}

/// Spawned = active + arrived + removed across arbitrary activity.
#[test]
fn vehicle_conservation_holds() {
    let mut boundary = Boundary::with_map("city", SimConfig::default()).unwrap();
    let ids = boundary
        .spawn_multiple(20, TypeDistribution::default())
        .unwrap();
    assert!(!ids.is_empty());

    for i in 0..300 {
        boundary.simulation_mut().step(0.1).unwrap();
        if i == 50 {
            boundary.remove_vehicle(&ids[0]).unwrap();
        }
        if i == 60 {
            boundary.remove_vehicle(&ids[1]).unwrap();
        }
        let stats = boundary.simulation().vehicle_statistics();
        assert_eq!(
            stats.total_spawned,
            stats.active as u64 + stats.arrived as u64 + stats.removed,
            "conservation violated at tick {i}"
        );
    }
}

/// Vehicles only ever occupy edges their mode is allowed on.
#[test]
fn mode_restrictions_are_never_violated() {
    let mut boundary = Boundary::with_map("city", SimConfig::default()).unwrap();
    boundary
        .spawn_multiple(
            15,
            TypeDistribution {
                car: 0.4,
                bicycle: 0.3,
                pedestrian: 0.3,
            },
        )
        .unwrap();

    for _ in 0..150 {
        boundary.simulation_mut().step(0.1).unwrap();
        let sim = boundary.simulation();
        for vehicle in sim.iter_vehicles() {
            for (from, to) in vehicle
                .path()
                .windows(2)
                .map(|pair| (pair[0], pair[1]))
            {
                let edge = sim
                    .graph()
                    .edge_between(from, to)
                    .expect("path edge exists");
                assert!(
                    sim.graph().edge(edge).allows(vehicle.kind()),
                    "vehicle {} routed over a forbidden edge",
                    vehicle.id()
                );
            }
        }
    }
}

/// Reroute counters never decrease.
#[test]
fn reroute_count_is_monotone() {
    let mut boundary = Boundary::with_map("city", SimConfig::default()).unwrap();
    let ids = boundary
        .spawn_multiple(10, TypeDistribution::default())
        .unwrap();

    let mut last: Vec<u32> = vec![0; ids.len()];
    for i in 0..200 {
        boundary.simulation_mut().step(0.1).unwrap();
        if i == 20 {
            // Stir the pot.
            let _ = boundary.create_accident(None, None, Some("severe"));
        }
        for (idx, id) in ids.iter().enumerate() {
            if let Some(vehicle) = boundary.simulation().vehicle(id) {
                let count = vehicle.reroute_count();
                assert!(count >= last[idx]);
                last[idx] = count;
            }
        }
    }
}
