//! The tick driver: advances every active network once per simulation step.

use crate::energy::Ticks;
use crate::event::GridEvent;
use crate::registry::GridRegistry;
use crate::world::GridWorld;

impl GridRegistry {
    /// Tick every active network in ascending identifier order.
    ///
    /// Returns the supply transitions seen this tick.
    pub fn tick_all(&mut self, world: &mut dyn GridWorld, tick: Ticks) -> Vec<GridEvent> {
        let mut events = Vec::new();
        for network in self.networks_mut() {
            if !network.is_active() {
                continue;
            }
            let unmet = network.tick(world);
            if let Some(event) = network.note_supply(unmet, tick) {
                events.push(event);
            }
        }
        events
    }
}

/// Owns the simulation tick counter.
#[derive(Debug, Clone, Default)]
pub struct TickDriver {
    tick: Ticks,
}

impl TickDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting from `tick`.
    pub fn starting_at(tick: Ticks) -> Self {
        Self { tick }
    }

    /// The last tick that ran. Zero before the first step.
    pub fn current_tick(&self) -> Ticks {
        self.tick
    }

    /// Advance the counter and tick every network. Returns the new tick and
    /// its events.
    pub fn step(
        &mut self,
        registry: &mut GridRegistry,
        world: &mut dyn GridWorld,
    ) -> (Ticks, Vec<GridEvent>) {
        self.tick += 1;
        (self.tick, registry.tick_all(world, self.tick))
    }
}
