//! Base-station PHY: one timing core, many terminals.

use crate::carrier::{Carrier, CarrierConfig};
use crate::timing_core::TimingCore;
use crate::{PhyRole, RadioPhy};
use rnsim_common::{NodeId, SimError, SimTime};
use tracing::debug;

/// PHY of a base station. HARQ buffers and receptions are keyed per terminal.
pub struct BaseStationPhy {
    core: TimingCore,
}

impl BaseStationPhy {
    /// Validate `config` and create the PHY. `seed` drives the CRC outcomes.
    pub fn new(node_id: NodeId, config: CarrierConfig, seed: u64) -> Result<Self, SimError> {
        let carrier = Carrier::new(config)?;
        Ok(BaseStationPhy { core: TimingCore::new(node_id, PhyRole::BaseStation.as_str(), carrier, seed) })
    }

    /// Start serving `terminal`.
    pub fn attach_terminal(&mut self, terminal: NodeId) {
        debug!(node = %self.core.node_id(), %terminal, "terminal attached");
        self.core.add_peer(terminal);
    }
}

impl RadioPhy for BaseStationPhy {
    fn core(&self) -> &TimingCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TimingCore {
        &mut self.core
    }

    fn role(&self) -> PhyRole {
        PhyRole::BaseStation
    }

    fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError> {
        self.core.run(now)
    }
}
