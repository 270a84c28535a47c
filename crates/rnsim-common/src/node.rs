//! The node abstraction seen by the scheduler.

use crate::{NodeId, Packet, SimError, SimTime, Vec3};
use std::any::Any;
use std::collections::VecDeque;

/// What the channel needs to know about a candidate receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverInfo {
    /// Receiver node id.
    pub id: NodeId,
    /// Receiver position (m).
    pub position: Vec3,
    /// Receiver velocity (m/s).
    pub velocity: Vec3,
    /// Number of receive antennas.
    pub num_receive_antennas: usize,
    /// Carrier frequencies the receiver listens on. Empty means every frequency.
    pub receive_frequencies_hz: Vec<f64>,
}

/// Frequencies closer than this are treated as the same carrier.
pub const FREQUENCY_MATCH_TOLERANCE_HZ: f64 = 1.0;

impl ReceiverInfo {
    /// True when the receiver listens on `frequency_hz`.
    pub fn listens_on(&self, frequency_hz: f64) -> bool {
        self.receive_frequencies_hz.is_empty()
            || self
                .receive_frequencies_hz
                .iter()
                .any(|f| (f - frequency_hz).abs() < FREQUENCY_MATCH_TOLERANCE_HZ)
    }
}

/// Outgoing queue plus one receive queue per radio interface.
///
/// Interface `i` is the carrier at `interfaces[i]`. The transmit queue is
/// drained by the scheduler on every distribution step.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    interfaces: Vec<f64>,
    tx_queue: Vec<Packet>,
    rx_queues: Vec<VecDeque<Packet>>,
    unmatched: u64,
}

impl PacketBuffer {
    /// Create a buffer with one receive queue per interface frequency.
    pub fn new(interfaces: Vec<f64>) -> Self {
        let rx_queues = interfaces.iter().map(|_| VecDeque::new()).collect();
        PacketBuffer {
            interfaces,
            tx_queue: Vec::new(),
            rx_queues,
            unmatched: 0,
        }
    }

    /// Interface carrier frequencies.
    pub fn interfaces(&self) -> &[f64] {
        &self.interfaces
    }

    /// Index of the interface tuned to `frequency_hz`.
    pub fn interface_for(&self, frequency_hz: f64) -> Option<usize> {
        self.interfaces
            .iter()
            .position(|f| (f - frequency_hz).abs() < FREQUENCY_MATCH_TOLERANCE_HZ)
    }

    /// Queue a packet for transmission.
    pub fn queue_transmit(&mut self, packet: Packet) {
        self.tx_queue.push(packet);
    }

    /// Take every queued transmission, leaving the queue empty.
    pub fn pull_transmitted(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.tx_queue)
    }

    /// Number of packets waiting to be transmitted.
    pub fn pending_transmit(&self) -> usize {
        self.tx_queue.len()
    }

    /// Store a received packet on the interface matching its frequency.
    ///
    /// Returns false (and counts the packet as unmatched) when no interface is
    /// tuned to the packet's carrier.
    pub fn push_received(&mut self, packet: Packet) -> bool {
        match self.interface_for(packet.center_frequency_hz) {
            Some(idx) => {
                self.rx_queues[idx].push_back(packet);
                true
            }
            None => {
                self.unmatched += 1;
                false
            }
        }
    }

    /// Drain the receive queue of one interface.
    pub fn drain_received(&mut self, interface: usize) -> Vec<Packet> {
        self.rx_queues
            .get_mut(interface)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Packets waiting on an interface.
    pub fn pending_received(&self, interface: usize) -> usize {
        self.rx_queues.get(interface).map_or(0, VecDeque::len)
    }

    /// Packets dropped because no interface matched their carrier.
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }
}

/// A participant in the simulation.
///
/// The scheduler calls [`SimNode::run`] whenever the node's requested wake-up
/// time is reached, then drains [`SimNode::pull_transmitted`] and hands
/// channel-processed packets to the other nodes via
/// [`SimNode::push_received`].
pub trait SimNode {
    /// Unique id.
    fn id(&self) -> NodeId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Current position.
    fn position(&self) -> Vec3;

    /// Current velocity.
    fn velocity(&self) -> Vec3;

    /// Receiver description for the channel.
    fn receiver_info(&self) -> ReceiverInfo;

    /// Do all work due at `now` and return the next time the node needs to run.
    ///
    /// `None` means the node has nothing scheduled.
    fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError>;

    /// Take everything queued for transmission.
    fn pull_transmitted(&mut self) -> Vec<Packet>;

    /// Accept a packet delivered by the channel.
    fn push_received(&mut self, packet: Packet);

    /// Counters for the run summary. Nodes that keep none return `None`.
    fn report(&self) -> Option<serde_json::Value> {
        None
    }

    /// Downcast support for callers that know the concrete node type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
