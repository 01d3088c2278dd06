//! Periodic validation and orphan recovery.
//!
//! Both passes are proportional to network or world size, so they run on a
//! slower cadence than the tick.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::energy::Ticks;
use crate::network::RepairReport;
use crate::registry::{GridRegistry, OrphanReport};
use crate::world::GridWorld;

/// Validation every 5 s at 20 ticks per second.
pub const DEFAULT_VALIDATE_EVERY: Ticks = 100;

/// Orphan sweep every 60 s at 20 ticks per second.
pub const DEFAULT_ORPHAN_SWEEP_EVERY: Ticks = 1200;

/// How often each maintenance pass runs, in ticks. Zero disables a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSchedule {
    pub validate_every: Ticks,
    pub orphan_sweep_every: Ticks,
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self {
            validate_every: DEFAULT_VALIDATE_EVERY,
            orphan_sweep_every: DEFAULT_ORPHAN_SWEEP_EVERY,
        }
    }
}

impl MaintenanceSchedule {
    /// A schedule with both passes disabled.
    pub const DISABLED: MaintenanceSchedule = MaintenanceSchedule {
        validate_every: 0,
        orphan_sweep_every: 0,
    };

    pub fn validation_due(&self, tick: Ticks) -> bool {
        is_due(self.validate_every, tick)
    }

    pub fn orphan_sweep_due(&self, tick: Ticks) -> bool {
        is_due(self.orphan_sweep_every, tick)
    }
}

fn is_due(interval: Ticks, tick: Ticks) -> bool {
    interval != 0 && tick % interval == 0
}

/// What maintenance did on one tick. A pass that did not run is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub validation: Option<RepairReport>,
    pub orphans: Option<OrphanReport>,
}

impl MaintenanceReport {
    /// Whether any pass ran.
    pub fn ran(&self) -> bool {
        self.validation.is_some() || self.orphans.is_some()
    }
}

/// Runs the maintenance passes on their schedule.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceDriver {
    schedule: MaintenanceSchedule,
}

impl MaintenanceDriver {
    pub fn new(schedule: MaintenanceSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> MaintenanceSchedule {
        self.schedule
    }

    /// Run whichever passes are due at `tick`. Validation runs first so the
    /// sweep sees a clean index.
    pub fn on_tick(
        &self,
        tick: Ticks,
        registry: &mut GridRegistry,
        world: &mut dyn GridWorld,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        if self.schedule.validation_due(tick) {
            debug!(tick, "running validation pass");
            report.validation = Some(registry.validate_and_repair(world));
        }
        if self.schedule.orphan_sweep_due(tick) {
            debug!(tick, "running orphan sweep");
            report.orphans = Some(registry.recover_orphans(world));
        }
        report
    }
}
