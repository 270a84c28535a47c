//! Moving packets from transmitters to receivers through the channel.

use rnsim_channel::ChannelModel;
use rnsim_common::{IrrelevantPacketPolicy, Packet, ReceiverInfo, SimNode};
use rnsim_metrics::{metric_defs, metrics};
use tracing::trace;

/// What one distribution step did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DistributionOutcome {
    /// Packets pulled from transmit queues.
    pub transmitted: u64,
    /// Packet copies handed to receivers.
    pub delivered: u64,
    /// Copies dropped as irrelevant.
    pub dropped: u64,
    /// Indices (into the node slice) of nodes that received something, ascending.
    pub receivers: Vec<usize>,
}

impl DistributionOutcome {
    /// True when at least one packet was put on the air.
    pub fn any_transmitted(&self) -> bool {
        self.transmitted > 0
    }
}

/// Ask the channel whether `packet` concerns `receiver`.
pub fn is_relevant(channel: &dyn ChannelModel, receiver: &dyn SimNode, packet: &Packet) -> (bool, ReceiverInfo) {
    let info = receiver.receiver_info();
    (channel.is_relevant(&info, packet), info)
}

/// Pull every transmit queue and deliver each packet to every other node.
///
/// `nodes` must be sorted by id; transmitters are visited in that order.
pub fn distribute(
    nodes: &mut [Box<dyn SimNode>],
    channel: &mut dyn ChannelModel,
    policy: IrrelevantPacketPolicy,
) -> DistributionOutcome {
    let mut outcome = DistributionOutcome::default();
    let mut received = vec![false; nodes.len()];

    for tx in 0..nodes.len() {
        let packets = nodes[tx].pull_transmitted();
        if packets.is_empty() {
            continue;
        }
        outcome.transmitted += packets.len() as u64;

        for packet in &packets {
            for rx in (0..nodes.len()).filter(|&rx| rx != tx) {
                let (relevant, info) = is_relevant(channel, nodes[rx].as_ref(), packet);
                let delivered = if relevant {
                    Some(channel.impair(&info, packet))
                } else {
                    match policy {
                        IrrelevantPacketPolicy::DeliverUnmodified => Some(packet.clone()),
                        IrrelevantPacketPolicy::Drop => None,
                    }
                };
                match delivered {
                    Some(copy) => {
                        trace!(from = %packet.transmitter_id, to = %nodes[rx].id(), "deliver");
                        nodes[rx].push_received(copy);
                        received[rx] = true;
                        outcome.delivered += 1;
                    }
                    None => outcome.dropped += 1,
                }
            }
        }
    }

    outcome.receivers = received
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.then_some(i))
        .collect();

    if outcome.transmitted > 0 {
        metrics::counter!(metric_defs::PACKETS_TRANSMITTED.name).increment(outcome.transmitted);
        metrics::counter!(metric_defs::PACKETS_DELIVERED.name).increment(outcome.delivered);
    }
    outcome
}
