//! # rnsim-nr
//!
//! Per-node radio timing: maps the free-running simulation clock onto
//! frames, slots and symbols, books transmissions and receptions against
//! that grid, keeps HARQ retransmission buffers and decides CRC outcomes.
//!
//! Two roles share one [`TimingCore`]:
//!
//! - [`BaseStationPhy`] serves any number of attached terminals
//! - [`TerminalPhy`] talks to one serving base station and reports channel
//!   quality periodically
//!
//! Upper layers drive both through the [`RadioPhy`] trait.

mod base_station;
mod bler;
mod carrier;
mod cqi;
mod harq;
mod sink;
mod terminal;
mod timing;
mod timing_core;

pub use base_station::BaseStationPhy;
pub use bler::{BlockErrorModel, SaturationAwareErrors, UniformBlockErrors, DEFAULT_BLOCK_ERROR_RATE};
pub use carrier::{
    Carrier, CarrierConfig, FRAME_DURATION, MAX_HARQ_PROCESSES, SUPPORTED_ANTENNA_COUNTS,
    SUPPORTED_SCS_KHZ, SYMBOLS_PER_SLOT,
};
pub use cqi::{cqi_from_sinr, ChannelQualityTracker, CsiReportConfig, CQI_SINR_THRESHOLDS_DB, MAX_CQI};
pub use harq::{HarqBuffer, HarqOutcome};
pub use sink::{ChannelQualityReport, PhyIndication, ReceiveSink, RxMeta};
pub use terminal::TerminalPhy;
pub use timing::{RxDescriptor, TimingContext, TimingInfo, TxDescriptor};
pub use timing_core::{PhyStats, TimingCore};

use rnsim_common::{ControlMessage, NodeId, Packet, SimError, SimTime, TransportBlock, Vec3};

/// Which side of the link a PHY sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyRole {
    /// Serves many terminals.
    BaseStation,
    /// Served by one base station.
    Terminal,
}

impl PhyRole {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhyRole::BaseStation => "base_station",
            PhyRole::Terminal => "terminal",
        }
    }
}

/// The interface upper layers use to drive a PHY.
///
/// Implementors expose their [`TimingCore`]; every operation except `run`
/// and `csi_rs_request` defaults to the core's behaviour.
pub trait RadioPhy {
    /// Shared timing core.
    fn core(&self) -> &TimingCore;

    /// Mutable shared timing core.
    fn core_mut(&mut self) -> &mut TimingCore;

    /// Role of this PHY.
    fn role(&self) -> PhyRole;

    /// Advance to `now`, do all due work, and return the next time this PHY needs to run.
    fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError>;

    /// Book a CSI-RS measurement occasion. Only terminals measure.
    fn csi_rs_request(&mut self, _timing: TimingInfo) -> Result<(), SimError> {
        Ok(())
    }

    /// Owning node.
    fn node_id(&self) -> NodeId {
        self.core().node_id()
    }

    /// Carrier and time grid.
    fn carrier(&self) -> &Carrier {
        self.core().carrier()
    }

    /// Move the antenna.
    fn set_position(&mut self, position: Vec3) {
        self.core_mut().set_position(position);
    }

    /// Peers this PHY exchanges data with.
    fn peers(&self) -> Vec<NodeId> {
        self.core().peers().collect()
    }

    /// Book a transmission; `None` retransmits the HARQ buffer.
    fn tx_request(&mut self, descriptor: TxDescriptor, block: Option<TransportBlock>) -> Result<(), SimError> {
        self.core_mut().tx_request(descriptor, block)
    }

    /// Book a reception.
    fn rx_request(&mut self, descriptor: RxDescriptor, timing: TimingInfo) -> Result<(), SimError> {
        self.core_mut().rx_request(descriptor, timing)
    }

    /// Queue a control message.
    fn send_control(&mut self, message: ControlMessage) {
        self.core_mut().send_control(message);
    }

    /// Deliver upward through `sink` instead of the indication queue.
    fn register_receive_sink(&mut self, sink: Box<dyn ReceiveSink>) {
        self.core_mut().register_receive_sink(sink);
    }

    /// Hand over a packet from the channel.
    fn push_received(&mut self, packet: Packet) {
        self.core_mut().push_received(packet);
    }

    /// Take everything transmitted since the last call.
    fn pull_transmitted(&mut self) -> Vec<Packet> {
        self.core_mut().pull_transmitted()
    }

    /// Take queued indications.
    fn take_indications(&mut self) -> Vec<PhyIndication> {
        self.core_mut().take_indications()
    }

    /// Timing context of the last run.
    fn timing(&self) -> TimingContext {
        self.core().timing()
    }

    /// Counters.
    fn stats(&self) -> &PhyStats {
        self.core().stats()
    }
}
