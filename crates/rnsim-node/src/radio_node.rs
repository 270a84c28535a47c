//! A complete radio node: traffic, RLC, MAC and PHY behind [`SimNode`].

use crate::mac::{MacStats, SlotMac};
use crate::rlc::{Rlc, RlcStats};
use crate::traffic::TrafficSource;
use rnsim_common::{earliest, NodeId, Packet, PacketBuffer, ReceiverInfo, SimError, SimNode, SimTime, Vec3};
use rnsim_nr::{PhyStats, RadioPhy};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::trace;

/// Interface index of the node's only carrier.
const PRIMARY_INTERFACE: usize = 0;

/// Snapshot of every layer's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioNodeStats {
    /// Node id.
    pub id: NodeId,
    /// Node name.
    pub name: String,
    /// Application packets generated.
    pub generated: u64,
    /// RLC counters.
    pub rlc: RlcStats,
    /// MAC counters.
    pub mac: MacStats,
    /// PHY counters.
    pub phy: PhyStats,
    /// Packets dropped because no interface matched their carrier.
    pub unmatched: u64,
}

/// A node wiring `TrafficSource -> Rlc -> SlotMac -> RadioPhy`.
pub struct RadioNode {
    id: NodeId,
    name: String,
    position: Vec3,
    velocity: Vec3,
    buffer: PacketBuffer,
    traffic: Option<Box<dyn TrafficSource>>,
    rlc: Box<dyn Rlc>,
    mac: SlotMac,
    phy: Box<dyn RadioPhy>,
}

impl RadioNode {
    /// Assemble a node. The PHY is moved to `position`.
    pub fn new(
        name: impl Into<String>,
        position: Vec3,
        mut phy: Box<dyn RadioPhy>,
        mac: SlotMac,
        rlc: Box<dyn Rlc>,
        traffic: Option<Box<dyn TrafficSource>>,
    ) -> Self {
        phy.set_position(position);
        let buffer = PacketBuffer::new(vec![phy.carrier().config().center_frequency_hz]);
        RadioNode {
            id: phy.node_id(),
            name: name.into(),
            position,
            velocity: Vec3::ZERO,
            buffer,
            traffic,
            rlc,
            mac,
            phy,
        }
    }

    /// Set a constant velocity (used only for reporting to the channel).
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Move the node.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.phy.set_position(position);
    }

    /// The PHY.
    pub fn phy(&self) -> &dyn RadioPhy {
        self.phy.as_ref()
    }

    /// The MAC.
    pub fn mac(&self) -> &SlotMac {
        &self.mac
    }

    /// The RLC.
    pub fn rlc(&self) -> &dyn Rlc {
        self.rlc.as_ref()
    }

    /// Counters of every layer.
    pub fn stats(&self) -> RadioNodeStats {
        RadioNodeStats {
            id: self.id,
            name: self.name.clone(),
            generated: self.traffic.as_ref().map_or(0, |t| t.generated()),
            rlc: self.rlc.stats().clone(),
            mac: self.mac.stats().clone(),
            phy: self.phy.stats().clone(),
            unmatched: self.buffer.unmatched(),
        }
    }
}

impl SimNode for RadioNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn receiver_info(&self) -> ReceiverInfo {
        ReceiverInfo {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            num_receive_antennas: self.phy.carrier().config().num_receive_antennas,
            receive_frequencies_hz: self.buffer.interfaces().to_vec(),
        }
    }

    fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError> {
        for packet in self.buffer.drain_received(PRIMARY_INTERFACE) {
            self.phy.push_received(packet);
        }

        if let Some(traffic) = self.traffic.as_mut() {
            for sdu in traffic.run(now) {
                self.rlc.enqueue(sdu);
            }
        }

        self.mac.on_slot(now, self.phy.as_mut(), self.rlc.as_mut())?;
        let mut phy_next = self.phy.run(now)?;

        let indications = self.phy.take_indications();
        if !indications.is_empty() {
            for indication in indications {
                self.mac.on_indication(indication, self.phy.as_mut(), self.rlc.as_mut());
            }
            // Flush feedback queued by the MAC at this same instant.
            phy_next = self.phy.run(now)?;
        }

        for packet in self.phy.pull_transmitted() {
            trace!(node = %self.id, to = %packet.destination(), "packet queued");
            self.buffer.queue_transmit(packet);
        }

        let mut next = earliest(phy_next, self.traffic.as_ref().and_then(|t| t.next_time()));
        if !self.phy.peers().is_empty() {
            next = earliest(next, Some(self.mac.next_slot_start(self.phy.as_ref(), now)));
        }
        Ok(next)
    }

    fn pull_transmitted(&mut self) -> Vec<Packet> {
        self.buffer.pull_transmitted()
    }

    fn push_received(&mut self, packet: Packet) {
        self.buffer.push_received(packet);
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.stats()).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
