//! Engine configuration. Loading from disk lives in `voltgrid-data`.

use serde::{Deserialize, Serialize};

use crate::energy::Energy;
use crate::maintenance::MaintenanceSchedule;

/// Default pass-through buffer of a new network.
pub const DEFAULT_NETWORK_BUFFER: Energy = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Buffer cap given to every new network.
    pub network_buffer: Energy,
    /// Rebuild a network when a removal may have cut it in two.
    pub rebuild_on_removal: bool,
    pub maintenance: MaintenanceSchedule,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            network_buffer: DEFAULT_NETWORK_BUFFER,
            rebuild_on_removal: true,
            maintenance: MaintenanceSchedule::default(),
        }
    }
}
