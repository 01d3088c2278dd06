//! Cable grid example: a host world, placement, rationing, and a cut cable.
//!
//! Builds a small world with a generator, two machines, and a battery joined
//! by cables. Runs a few ticks, cuts the line in the middle to show the
//! split, then saves and restores the session.
//!
//! Run with: `cargo run -p voltgrid-examples --example cable_grid [grid.toml]`
//! Set `RUST_LOG=debug` to see the engine's repair and merge logs.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;
use voltgrid_core::config::GridConfig;
use voltgrid_core::coord::{BlockPos, Direction};
use voltgrid_core::energy::Energy;
use voltgrid_core::grid::PowerGrid;
use voltgrid_core::id::NetworkId;
use voltgrid_core::node::{Consumer, GridNode, Producer, Storage};
use voltgrid_core::world::GridWorld;

// ---------------------------------------------------------------------------
// Host blocks
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Kind {
    Cable,
    Generator { output: Energy },
    Machine { demand: Energy, powered: Energy },
    Battery { stored: Energy, capacity: Energy, rate: Energy },
}

#[derive(Debug)]
struct Block {
    kind: Kind,
    network: Option<NetworkId>,
}

impl Block {
    fn new(kind: Kind) -> Self {
        Self { kind, network: None }
    }
}

impl Producer for Block {
    fn max_output(&self) -> Energy {
        match self.kind {
            Kind::Generator { output } => output,
            _ => 0,
        }
    }

    fn produce_energy(&mut self, max_requested: Energy) -> Energy {
        max_requested.min(self.max_output())
    }
}

impl Consumer for Block {
    fn energy_demand(&self) -> Energy {
        match self.kind {
            Kind::Machine { demand, .. } => demand,
            _ => 0,
        }
    }

    fn consume_energy(&mut self, offered: Energy) -> Energy {
        match &mut self.kind {
            Kind::Machine { demand, powered } => {
                *powered = offered.min(*demand);
                *powered
            }
            _ => 0,
        }
    }
}

impl Storage for Block {
    fn can_charge(&self) -> bool {
        matches!(self.kind, Kind::Battery { stored, capacity, .. } if stored < capacity)
    }

    fn can_discharge(&self) -> bool {
        matches!(self.kind, Kind::Battery { stored, .. } if stored > 0)
    }

    fn max_charge_rate(&self) -> Energy {
        match self.kind {
            Kind::Battery { rate, .. } => rate,
            _ => 0,
        }
    }

    fn max_discharge_rate(&self) -> Energy {
        self.max_charge_rate()
    }

    fn charge_energy(&mut self, offered: Energy) -> Energy {
        match &mut self.kind {
            Kind::Battery {
                stored,
                capacity,
                rate,
            } => {
                let took = offered.min(*rate).min(capacity.saturating_sub(*stored));
                *stored += took;
                took
            }
            _ => 0,
        }
    }

    fn discharge_energy(&mut self, requested: Energy) -> Energy {
        match &mut self.kind {
            Kind::Battery { stored, rate, .. } => {
                let released = requested.min(*rate).min(*stored);
                *stored -= released;
                released
            }
            _ => 0,
        }
    }

    fn stored_energy(&self) -> Energy {
        match self.kind {
            Kind::Battery { stored, .. } => stored,
            _ => 0,
        }
    }

    fn capacity(&self) -> Energy {
        match self.kind {
            Kind::Battery { capacity, .. } => capacity,
            _ => 0,
        }
    }
}

impl GridNode for Block {
    fn connects(&self, _side: Direction) -> bool {
        true
    }

    fn network(&self) -> Option<NetworkId> {
        self.network
    }

    fn set_network(&mut self, network: Option<NetworkId>) {
        self.network = network;
    }

    fn as_producer(&self) -> Option<&dyn Producer> {
        matches!(self.kind, Kind::Generator { .. }).then_some(self as &dyn Producer)
    }

    fn as_producer_mut(&mut self) -> Option<&mut dyn Producer> {
        if matches!(self.kind, Kind::Generator { .. }) {
            Some(self)
        } else {
            None
        }
    }

    fn as_consumer(&self) -> Option<&dyn Consumer> {
        matches!(self.kind, Kind::Machine { .. }).then_some(self as &dyn Consumer)
    }

    fn as_consumer_mut(&mut self) -> Option<&mut dyn Consumer> {
        if matches!(self.kind, Kind::Machine { .. }) {
            Some(self)
        } else {
            None
        }
    }

    fn as_storage(&self) -> Option<&dyn Storage> {
        matches!(self.kind, Kind::Battery { .. }).then_some(self as &dyn Storage)
    }

    fn as_storage_mut(&mut self) -> Option<&mut dyn Storage> {
        if matches!(self.kind, Kind::Battery { .. }) {
            Some(self)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct World {
    blocks: HashMap<BlockPos, Block>,
}

impl GridWorld for World {
    fn node(&self, pos: BlockPos) -> Option<&dyn GridNode> {
        self.blocks.get(&pos).map(|b| b as &dyn GridNode)
    }

    fn node_mut(&mut self, pos: BlockPos) -> Option<&mut dyn GridNode> {
        self.blocks.get_mut(&pos).map(|b| b as &mut dyn GridNode)
    }

    fn loaded_positions(&self) -> Vec<BlockPos> {
        self.blocks.keys().copied().collect()
    }
}

fn powered(world: &World, pos: BlockPos) -> Energy {
    match world.blocks.get(&pos).map(|b| &b.kind) {
        Some(Kind::Machine { powered, .. }) => *powered,
        _ => 0,
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match voltgrid_data::load_config(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => GridConfig::default(),
    };

    let mut world = World::default();
    let mut grid = PowerGrid::new(config);

    // Generator - cable x3 - machine - cable - machine, battery on top of the
    // first cable.
    let generator = BlockPos::new(0, 64, 0);
    let line: Vec<BlockPos> = (1..=3).map(|x| BlockPos::new(x, 64, 0)).collect();
    let machine_a = BlockPos::new(4, 64, 0);
    let link = BlockPos::new(5, 64, 0);
    let machine_b = BlockPos::new(6, 64, 0);
    let battery = line[0].offset(Direction::Up);

    let mut build = |world: &mut World, pos: BlockPos, kind: Kind| {
        world.blocks.insert(pos, Block::new(kind));
        grid.on_node_placed(pos, world);
    };
    build(&mut world, generator, Kind::Generator { output: 30 });
    for pos in &line {
        build(&mut world, *pos, Kind::Cable);
    }
    build(&mut world, machine_a, Kind::Machine { demand: 20, powered: 0 });
    build(&mut world, link, Kind::Cable);
    build(&mut world, machine_b, Kind::Machine { demand: 20, powered: 0 });
    build(
        &mut world,
        battery,
        Kind::Battery {
            stored: 100,
            capacity: 500,
            rate: 5,
        },
    );

    info!(networks = grid.registry().len(), "grid built");

    // 30 generated + 5 from the battery against 40 demanded.
    for _ in 0..3 {
        let outcome = grid.step(&mut world);
        for event in &outcome.events {
            info!(tick = outcome.tick, ?event, "grid event");
        }
        info!(
            tick = outcome.tick,
            machine_a = powered(&world, machine_a),
            machine_b = powered(&world, machine_b),
            "tick"
        );
    }

    // Cut the link: machine B ends up on its own, unpowered network.
    world.blocks.remove(&link);
    let removal = grid.on_node_removed(link, &mut world);
    info!(rebuilt = ?removal.rebuilt, networks = grid.registry().len(), "link removed");

    let outcome = grid.step(&mut world);
    for event in &outcome.events {
        info!(tick = outcome.tick, ?event, "grid event");
    }
    info!(
        machine_a = powered(&world, machine_a),
        machine_b = powered(&world, machine_b),
        "after cut"
    );

    match grid.save() {
        Ok(bytes) => {
            grid.end_session();
            let mut resumed = PowerGrid::default();
            match resumed.load(&bytes) {
                Ok(records) => info!(bytes = bytes.len(), records, "session saved and restored"),
                Err(e) => eprintln!("restore failed: {e}"),
            }
        }
        Err(e) => eprintln!("save failed: {e}"),
    }
}
