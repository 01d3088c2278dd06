//! End-to-end scenarios through the session facade.

use voltgrid_core::config::GridConfig;
use voltgrid_core::coord::{BlockPos, Direction, RegionPos};
use voltgrid_core::event::GridEvent;
use voltgrid_core::grid::PowerGrid;
use voltgrid_core::maintenance::MaintenanceSchedule;
use voltgrid_core::network::Network;
use voltgrid_core::test_utils::*;

// ===========================================================================
// Helpers
// ===========================================================================

fn quiet_grid() -> PowerGrid {
    PowerGrid::new(GridConfig {
        maintenance: MaintenanceSchedule::DISABLED,
        ..GridConfig::default()
    })
}

/// Place `nodes` in a row along +x, linked by a cable between each pair.
fn build_row(grid: &mut PowerGrid, world: &mut TestWorld, nodes: Vec<TestNode>) -> Vec<BlockPos> {
    let mut positions = Vec::new();
    let mut pos = BlockPos::new(0, 64, 0);
    for (i, node) in nodes.into_iter().enumerate() {
        if i > 0 {
            world.insert(pos, TestNode::cable());
            grid.on_node_placed(pos, world);
            pos = pos.offset(Direction::East);
        }
        world.insert(pos, node);
        grid.on_node_placed(pos, world);
        positions.push(pos);
        pos = pos.offset(Direction::East);
    }
    positions
}

// ===========================================================================
// Arbitration scenarios
// ===========================================================================

#[test]
fn full_supply_splits_ten_into_four_and_six() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let pos = build_row(
        &mut grid,
        &mut world,
        vec![TestNode::producer(10), TestNode::consumer(4), TestNode::consumer(6)],
    );

    let outcome = grid.step(&mut world);

    assert!(outcome.events.is_empty());
    assert_eq!(world.consumer(pos[1]).last_received, 4);
    assert_eq!(world.consumer(pos[2]).last_received, 6);
    let net = grid.registry().network_at(pos[0]).unwrap();
    assert_eq!(net.stats().produced, 10);
    assert_eq!(net.stats().consumed, 10);
}

#[test]
fn scarcity_rations_nine_into_three_and_six() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let pos = build_row(
        &mut grid,
        &mut world,
        vec![TestNode::producer(9), TestNode::consumer(4), TestNode::consumer(8)],
    );

    let outcome = grid.step(&mut world);

    assert_eq!(world.consumer(pos[1]).last_received, 3);
    assert_eq!(world.consumer(pos[2]).last_received, 6);
    let id = grid.registry().id_at(pos[0]).unwrap();
    assert_eq!(
        outcome.events,
        vec![GridEvent::Brownout {
            network: id,
            deficit: 3,
            tick: 1
        }]
    );
}

#[test]
fn battery_covers_shortfall() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let pos = build_row(
        &mut grid,
        &mut world,
        vec![
            TestNode::producer(5),
            TestNode::battery(1000, 5, 50, 50),
            TestNode::consumer(10),
        ],
    );

    let outcome = grid.step(&mut world);

    assert!(outcome.events.is_empty());
    assert_eq!(world.consumer(pos[2]).last_received, 10);
    assert_eq!(world.storage(pos[1]).stored, 0);
    let net = grid.registry().network_at(pos[0]).unwrap();
    assert_eq!(net.stats().from_storage, 5);
    assert_eq!(net.stats().consumed, 10);
}

#[test]
fn surplus_fills_battery_over_several_ticks() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let pos = build_row(
        &mut grid,
        &mut world,
        vec![TestNode::producer(30), TestNode::battery(50, 0, 20, 20)],
    );

    for _ in 0..5 {
        grid.step(&mut world);
    }

    assert_eq!(world.storage(pos[1]).stored, 50);
    let net = grid.registry().network_at(pos[0]).unwrap();
    assert_eq!(net.stats().produced, 0);
    assert!(net.stored_energy() <= net.max_storage());
}

// ===========================================================================
// Topology scenarios
// ===========================================================================

#[test]
fn bridging_two_grids_conserves_members() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let left = world.cable_line(BlockPos::new(0, 0, 0), Direction::East, 4);
    let right = world.cable_line(BlockPos::new(5, 0, 0), Direction::East, 3);
    for pos in left.iter().chain(&right) {
        grid.on_node_placed(*pos, &mut world);
    }
    let a = grid.registry().id_at(left[0]).unwrap();
    let b = grid.registry().id_at(right[0]).unwrap();

    let bridge = BlockPos::new(4, 0, 0);
    world.insert(bridge, TestNode::cable());
    grid.on_node_placed(bridge, &mut world);

    assert_eq!(grid.registry().len(), 1);
    assert_eq!(grid.registry().network(a).map(Network::len), Some(8));
    assert!(grid.registry().is_retired(b));
    assert!(grid.registry().check_consistency().is_empty());
}

#[test]
fn removing_every_node_leaves_nothing_registered() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let line = world.cable_line(BlockPos::new(0, 0, 0), Direction::South, 6);
    for pos in &line {
        grid.on_node_placed(*pos, &mut world);
    }

    for pos in &line {
        world.remove(*pos);
        grid.on_node_removed(*pos, &mut world);
        assert!(grid.registry().check_consistency().is_empty());
    }

    assert!(grid.registry().is_empty());
    assert_eq!(grid.registry().indexed_len(), 0);
}

#[test]
fn region_unload_is_repaired_by_maintenance() {
    let mut world = TestWorld::new();
    let mut grid = PowerGrid::new(GridConfig {
        maintenance: MaintenanceSchedule {
            validate_every: 1,
            orphan_sweep_every: 2,
        },
        ..GridConfig::default()
    });

    // A line crossing the boundary between regions (0, 0) and (1, 0).
    let line = world.cable_line(BlockPos::new(12, 0, 0), Direction::East, 8);
    for pos in &line {
        grid.on_node_placed(*pos, &mut world);
    }
    let id = grid.registry().id_at(line[0]).unwrap();

    world.unload_region(RegionPos::new(1, 0));
    let outcome = grid.step(&mut world);
    let validation = outcome.maintenance.validation.unwrap();
    assert_eq!(validation.removed.len(), 4);
    assert_eq!(grid.registry().network(id).map(Network::len), Some(4));

    world.reload_region(RegionPos::new(1, 0));
    let outcome = grid.step(&mut world);
    let orphans = outcome.maintenance.orphans.unwrap();
    assert_eq!(orphans.joined.len(), 4);
    assert_eq!(grid.registry().network(id).map(Network::len), Some(8));
    assert!(grid.registry().check_consistency().is_empty());
}

#[test]
fn snapshot_survives_session_restart() {
    let mut world = TestWorld::new();
    let mut grid = quiet_grid();
    let pos = build_row(
        &mut grid,
        &mut world,
        vec![TestNode::producer(10), TestNode::consumer(10).accepting_at_most(3)],
    );
    grid.step(&mut world);
    let id = grid.registry().id_at(pos[0]).unwrap();
    assert_eq!(grid.registry().network(id).map(Network::stored_energy), Some(7));

    let bytes = grid.save().unwrap();
    grid.end_session();

    let mut resumed = quiet_grid();
    resumed.load(&bytes).unwrap();
    let mut positions = world.loaded_positions();
    positions.sort();
    for p in positions {
        resumed.on_node_placed(p, &mut world);
    }

    assert_eq!(resumed.registry().len(), 1);
    assert_eq!(
        resumed.registry().network(id).map(Network::stored_energy),
        Some(7)
    );
}
