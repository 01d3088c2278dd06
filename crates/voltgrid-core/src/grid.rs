//! The grid session: one registry, one tick counter, one maintenance
//! schedule, created when a world is opened and torn down when it closes.

use tracing::info;

use crate::config::GridConfig;
use crate::coord::BlockPos;
use crate::driver::TickDriver;
use crate::energy::Ticks;
use crate::event::GridEvent;
use crate::id::NetworkId;
use crate::maintenance::{MaintenanceDriver, MaintenanceReport};
use crate::persist::{GridSnapshot, SnapshotError};
use crate::placement::Removal;
use crate::registry::{GridRegistry, Placement};
use crate::world::GridWorld;

/// Result of one [`PowerGrid::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub tick: Ticks,
    pub events: Vec<GridEvent>,
    pub maintenance: MaintenanceReport,
}

/// Owns all grid state for one session.
///
/// The host forwards world events to the `on_*` handlers and calls
/// [`step`](Self::step) once per simulation tick.
#[derive(Debug, Clone)]
pub struct PowerGrid {
    config: GridConfig,
    registry: GridRegistry,
    ticker: TickDriver,
    maintenance: MaintenanceDriver,
}

impl Default for PowerGrid {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

impl PowerGrid {
    pub fn new(config: GridConfig) -> Self {
        info!(
            network_buffer = config.network_buffer,
            rebuild_on_removal = config.rebuild_on_removal,
            "grid session started"
        );
        Self {
            registry: GridRegistry::new(config.network_buffer),
            ticker: TickDriver::new(),
            maintenance: MaintenanceDriver::new(config.maintenance),
            config,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn registry(&self) -> &GridRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut GridRegistry {
        &mut self.registry
    }

    pub fn current_tick(&self) -> Ticks {
        self.ticker.current_tick()
    }

    /// Advance one tick: arbitrate every network, then run due maintenance.
    pub fn step(&mut self, world: &mut dyn GridWorld) -> StepOutcome {
        let (tick, events) = self.ticker.step(&mut self.registry, world);
        let maintenance = self.maintenance.on_tick(tick, &mut self.registry, world);
        StepOutcome {
            tick,
            events,
            maintenance,
        }
    }

    // -- World events --

    pub fn on_node_placed(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> Placement {
        self.registry.on_node_placed(pos, world)
    }

    /// Call after the node has left the world.
    pub fn on_node_removed(&mut self, pos: BlockPos, world: &mut dyn GridWorld) -> Removal {
        self.registry
            .on_node_removed(pos, world, self.config.rebuild_on_removal)
    }

    pub fn on_neighbors_changed(
        &mut self,
        pos: BlockPos,
        world: &mut dyn GridWorld,
    ) -> Vec<NetworkId> {
        self.registry.on_neighbors_changed(pos, world)
    }

    // -- Persistence --

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot::new(
            self.current_tick(),
            self.registry.next_serial(),
            self.registry.records(),
        )
    }

    pub fn save(&self) -> Result<Vec<u8>, SnapshotError> {
        self.snapshot().encode()
    }

    /// Resume from a snapshot. Networks stay dormant until a node naming
    /// them is placed or found by the orphan sweep. Returns how many
    /// records were kept.
    pub fn restore(&mut self, snapshot: GridSnapshot) -> usize {
        self.ticker = TickDriver::starting_at(snapshot.header.tick);
        let kept = self.registry.restore(snapshot.records, snapshot.next_serial);
        info!(tick = snapshot.header.tick, records = kept, "grid state restored");
        kept
    }

    pub fn load(&mut self, data: &[u8]) -> Result<usize, SnapshotError> {
        let snapshot = GridSnapshot::decode(data)?;
        Ok(self.restore(snapshot))
    }

    /// Capture final state and drop every network.
    pub fn end_session(&mut self) -> GridSnapshot {
        let snapshot = self.snapshot();
        self.registry.clear();
        info!(
            tick = snapshot.header.tick,
            records = snapshot.records.len(),
            "grid session ended"
        );
        snapshot
    }
}
