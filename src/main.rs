use std::time::Instant;

use traffic_flow::engine::TypeDistribution;
use traffic_flow::{Boundary, SimConfig};

fn main() {
    let config = SimConfig {
        auto_spawn: true,
        auto_spawn_target: 100,
        ..SimConfig::default()
    };
    let mut boundary = Boundary::with_map("city", config).unwrap();
    boundary
        .spawn_multiple(50, TypeDistribution::default())
        .unwrap();

    println!("Simulating...");
    const NUM_TICKS: u64 = 1000;
    loop {
        let start = Instant::now();
        for _ in 0..NUM_TICKS {
            boundary.simulation_mut().step(0.1).unwrap();
        }
        let per_tick = start.elapsed() / NUM_TICKS as u32;
        let info = boundary.get_simulation_info();
        let stats = boundary.get_traffic_statistics();
        println!(
            "tick {} | {:?}/tick | {} active | {} spawned | {} congested edges | avg multiplier {:.2}",
            info.tick,
            per_tick,
            info.active_vehicles,
            info.total_spawned,
            stats.congested_edges,
            stats.average_multiplier,
        );
    }
}
