use crate::energy::{Energy, Ticks};
use crate::id::NetworkId;

/// Events emitted by the tick driver on supply state transitions.
///
/// Events fire only when a network crosses between satisfied and short,
/// never every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEvent {
    /// A network could not cover its consumers' total demand.
    Brownout {
        network: NetworkId,
        /// Demand minus the energy available to consumers this tick.
        deficit: Energy,
        tick: Ticks,
    },
    /// A network that was short is fully supplied again.
    Restored { network: NetworkId, tick: Ticks },
}

impl GridEvent {
    pub fn network(&self) -> NetworkId {
        match self {
            GridEvent::Brownout { network, .. } | GridEvent::Restored { network, .. } => *network,
        }
    }
}
