//! The timing core shared by both PHY roles.
//!
//! A [`TimingCore`] is advanced only when its owner calls [`TimingCore::run`].
//! Each run does, in order:
//!
//! 1. reception intake: data packets handed over since the last run are
//!    buffered by the symbol-within-frame their reception started on;
//! 2. reception completion: descriptors ending on the symbol just before the
//!    current one are resolved, the CRC outcome is drawn and the block is
//!    delivered upward;
//! 3. the transmit step: every pending descriptor produces exactly one packet,
//!    through the HARQ buffer.
//!
//! The value returned by `run` is the earliest pending reception end.

use crate::bler::{BlockErrorModel, UniformBlockErrors, DEFAULT_BLOCK_ERROR_RATE};
use crate::carrier::Carrier;
use crate::harq::{HarqBuffer, HarqOutcome};
use crate::sink::{ChannelQualityReport, PhyIndication, ReceiveSink, RxMeta};
use crate::timing::{check_span, PendingRx, RxDescriptor, TimingContext, TimingInfo, TxDescriptor};
use rnsim_common::{
    Abstraction, Complex64, ControlMessage, DataPayload, NodeId, Packet, PacketPayload, SimError,
    SimTime, TransportBlock, Vec3,
};
use rnsim_metrics::{metric_defs, metrics, NodeLabels};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Amplitude of each placeholder QPSK component.
const SAMPLE_AMPLITUDE: f64 = 0.5;

/// Counters kept by every PHY.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhyStats {
    /// Data packets put on the air (new data and retransmissions).
    pub blocks_transmitted: u64,
    /// Of which retransmissions.
    pub retransmissions: u64,
    /// Control packets put on the air.
    pub control_transmitted: u64,
    /// Completed data receptions delivered upward.
    pub blocks_received: u64,
    /// Of which failed the CRC.
    pub crc_failures: u64,
    /// Reception descriptors that found no buffered packet.
    pub missed_receptions: u64,
    /// Control messages received.
    pub control_received: u64,
    /// Packets not addressed to this node or not from a peer.
    pub ignored_packets: u64,
}

/// Frame/slot/symbol timing, transmit and receive contexts and HARQ buffers.
pub struct TimingCore {
    node_id: NodeId,
    carrier: Carrier,
    position: Vec3,
    peers: BTreeSet<NodeId>,
    timing: TimingContext,
    now: SimTime,

    // Transmit side
    tx_pending: Vec<(TxDescriptor, Option<TransportBlock>)>,
    control_pending: Vec<ControlMessage>,
    outbox: Vec<Packet>,
    harq: HarqBuffer,

    // Receive side, both indexed by symbol within the frame
    inbox: Vec<Packet>,
    rx_context: Vec<Vec<PendingRx>>,
    rx_buffer: Vec<Vec<Packet>>,
    errors: Box<dyn BlockErrorModel>,
    latest_sinr: BTreeMap<NodeId, f64>,

    // Upward delivery
    sink: Option<Box<dyn ReceiveSink>>,
    indications: Vec<PhyIndication>,

    stats: PhyStats,
    labels: NodeLabels,
}

impl TimingCore {
    /// Core for `node_id` with the default 10% block-error model seeded by `seed`.
    pub fn new(node_id: NodeId, role: &str, carrier: Carrier, seed: u64) -> Self {
        let symbols = carrier.symbols_per_frame() as usize;
        let harq = HarqBuffer::new(carrier.config().num_harq_processes);
        TimingCore {
            node_id,
            timing: TimingContext::at(&carrier, SimTime::ZERO),
            carrier,
            position: Vec3::ZERO,
            peers: BTreeSet::new(),
            now: SimTime::ZERO,
            tx_pending: Vec::new(),
            control_pending: Vec::new(),
            outbox: Vec::new(),
            harq,
            inbox: Vec::new(),
            rx_context: vec![Vec::new(); symbols],
            rx_buffer: vec![Vec::new(); symbols],
            errors: Box::new(UniformBlockErrors::new(DEFAULT_BLOCK_ERROR_RATE, seed)),
            latest_sinr: BTreeMap::new(),
            sink: None,
            indications: Vec::new(),
            stats: PhyStats::default(),
            labels: NodeLabels::new(node_id.to_string(), role),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Owning node.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Carrier and time grid.
    pub fn carrier(&self) -> &Carrier {
        &self.carrier
    }

    /// Timing context as of the last [`advance`](Self::advance).
    pub fn timing(&self) -> TimingContext {
        self.timing
    }

    /// Time of the last [`advance`](Self::advance).
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Current antenna position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Move the antenna.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Peers this node exchanges data with.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.iter().copied()
    }

    /// Accept data and control from `peer`.
    pub fn add_peer(&mut self, peer: NodeId) {
        self.peers.insert(peer);
    }

    /// Counters.
    pub fn stats(&self) -> &PhyStats {
        &self.stats
    }

    /// HARQ buffers.
    pub fn harq(&self) -> &HarqBuffer {
        &self.harq
    }

    /// Mutable HARQ buffers, for releasing acknowledged processes.
    pub fn harq_mut(&mut self) -> &mut HarqBuffer {
        &mut self.harq
    }

    /// SINR of the last block received from `peer`.
    pub fn latest_sinr(&self, peer: NodeId) -> Option<f64> {
        self.latest_sinr.get(&peer).copied()
    }

    /// Replace the CRC-outcome model.
    pub fn set_block_error_model(&mut self, model: Box<dyn BlockErrorModel>) {
        self.errors = model;
    }

    /// Deliver upward through `sink` instead of the indication queue.
    pub fn register_receive_sink(&mut self, sink: Box<dyn ReceiveSink>) {
        self.sink = Some(sink);
    }

    /// Take queued indications (only filled while no sink is registered).
    pub fn take_indications(&mut self) -> Vec<PhyIndication> {
        std::mem::take(&mut self.indications)
    }

    /// Number of reception descriptors not yet resolved.
    pub fn pending_receptions(&self) -> usize {
        self.rx_context.iter().map(Vec::len).sum()
    }

    // ------------------------------------------------------------------------
    // Upper-layer requests
    // ------------------------------------------------------------------------

    /// Map `now` onto the frame structure.
    pub fn advance(&mut self, now: SimTime) -> TimingContext {
        self.now = now;
        self.timing = TimingContext::at(&self.carrier, now);
        self.timing
    }

    /// Book a transmission for the next run. `None` retransmits the buffered block.
    pub fn tx_request(
        &mut self,
        descriptor: TxDescriptor,
        block: Option<TransportBlock>,
    ) -> Result<(), SimError> {
        check_span(descriptor.start_symbol, descriptor.num_symbols)?;
        let num_processes = self.harq.num_processes();
        if descriptor.harq_id >= num_processes {
            return Err(SimError::HarqProcessOutOfRange { harq_id: descriptor.harq_id, num_processes });
        }
        self.tx_pending.push((descriptor, block));
        Ok(())
    }

    /// Book a reception starting at `info.symbol` of `info.slot`.
    pub fn rx_request(&mut self, descriptor: RxDescriptor, info: TimingInfo) -> Result<(), SimError> {
        let (pending, end_symbol) = PendingRx::resolve(&self.carrier, descriptor, info)?;
        trace!(
            node = %self.node_id,
            peer = %descriptor.peer,
            harq_id = descriptor.harq_id,
            end = %pending.end_time,
            "reception booked"
        );
        self.rx_context[end_symbol as usize].push(pending);
        Ok(())
    }

    /// Queue a control message for the next run.
    pub fn send_control(&mut self, message: ControlMessage) {
        self.control_pending.push(message);
    }

    /// Hand over a packet from the channel. It is processed on the next run.
    pub fn push_received(&mut self, packet: Packet) {
        self.inbox.push(packet);
    }

    /// Take every packet produced by the last runs.
    pub fn pull_transmitted(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    /// Deliver a channel-quality report upward.
    pub fn deliver_channel_quality(&mut self, report: ChannelQualityReport) {
        self.upward().on_channel_quality(report);
    }

    /// The registered sink, or the indication queue when there is none.
    fn upward(&mut self) -> &mut dyn ReceiveSink {
        match self.sink.as_deref_mut() {
            Some(sink) => sink,
            None => &mut self.indications,
        }
    }

    // ------------------------------------------------------------------------
    // Run
    // ------------------------------------------------------------------------

    /// Advance to `now` and process intake, completion and transmission.
    pub fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError> {
        self.advance(now);
        self.intake();
        self.complete_receptions();
        self.transmit()?;
        Ok(self.next_invoke_time())
    }

    /// Earliest pending reception end after now.
    pub fn next_invoke_time(&self) -> Option<SimTime> {
        self.rx_context
            .iter()
            .flatten()
            .map(|p| p.end_time)
            .filter(|t| *t > self.now)
            .min()
    }

    fn intake(&mut self) {
        for packet in std::mem::take(&mut self.inbox) {
            let from_peer = self.peers.contains(&packet.transmitter_id);
            if !from_peer || packet.destination() != self.node_id {
                self.stats.ignored_packets += 1;
                continue;
            }
            match &packet.payload {
                PacketPayload::Control(control) => {
                    self.stats.control_received += 1;
                    let (from, kind) = (packet.transmitter_id, control.kind);
                    self.upward().on_control(from, kind);
                }
                PacketPayload::Data(_) => {
                    let start = TimingContext::at(&self.carrier, packet.start_time).symbol_in_frame();
                    let bucket = &mut self.rx_buffer[start as usize];
                    // Anything left over from an earlier frame can no longer match.
                    bucket.retain(|p| p.end_time() > packet.start_time);
                    bucket.push(packet);
                }
            }
        }
    }

    fn complete_receptions(&mut self) {
        let total = self.carrier.symbols_per_frame();
        let previous = ((self.timing.symbol_in_frame() + total - 1) % total) as usize;
        let now = self.now;

        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rx_context[previous])
            .into_iter()
            .partition(|p| p.end_time <= now);
        self.rx_context[previous] = later;

        for pending in due {
            self.complete(pending);
        }
    }

    fn complete(&mut self, pending: PendingRx) {
        let peer = pending.descriptor.peer;
        let bucket = &mut self.rx_buffer[pending.start_symbol_in_frame as usize];
        let Some(index) = bucket.iter().position(|p| p.transmitter_id == peer) else {
            debug!(node = %self.node_id, %peer, "reception completed with nothing buffered");
            self.stats.missed_receptions += 1;
            return;
        };
        let packet = bucket.remove(index);
        let Some(data) = packet.data() else {
            return;
        };
        if data.tbs != pending.descriptor.tbs && pending.descriptor.tbs != 0 {
            debug!(
                node = %self.node_id,
                expected = pending.descriptor.tbs,
                received = data.tbs,
                "transport block size differs from the booked reception"
            );
        }

        let sinr_db = packet.power_dbm - self.carrier.noise_power_dbm();
        self.latest_sinr.insert(peer, sinr_db);
        let crc_failed = self.errors.crc_failed(&packet, sinr_db);
        let meta = RxMeta {
            peer,
            tbs: data.tbs,
            harq_id: data.harq_id,
            rx_power_dbm: packet.power_dbm,
            sinr_db,
        };

        self.stats.blocks_received += 1;
        let labels = self.labels.to_labels();
        metrics::counter!(metric_defs::PHY_BLOCKS_RECEIVED.name, &labels).increment(1);
        metrics::histogram!(metric_defs::PHY_RX_SINR.name, &labels).record(sinr_db);
        if crc_failed {
            self.stats.crc_failures += 1;
            metrics::counter!(metric_defs::PHY_CRC_FAILURES.name, &labels).increment(1);
        }
        trace!(node = %self.node_id, %peer, harq_id = meta.harq_id, crc_failed, sinr_db, "block received");

        let block = data.block.clone();
        self.upward().on_receive(block, crc_failed, meta);
    }

    fn transmit(&mut self) -> Result<(), SimError> {
        for (descriptor, block) in std::mem::take(&mut self.tx_pending) {
            let outcome = self.harq.resolve(descriptor.peer, descriptor.harq_id, block)?;
            let retransmission = outcome.is_retransmission();
            let block = match outcome {
                HarqOutcome::NewData(b) | HarqOutcome::Retransmission(b) => b,
            };
            let start_time = self.timing.slot_start + self.carrier.symbol_start_offset(descriptor.start_symbol);
            let duration = self.carrier.span_duration(descriptor.start_symbol, descriptor.num_symbols);
            let samples = self.placeholder_samples(block.as_bytes(), duration);
            let payload = PacketPayload::Data(DataPayload {
                destination: descriptor.peer,
                harq_id: descriptor.harq_id,
                tbs: block.len(),
                block,
                retransmission,
            });

            self.stats.blocks_transmitted += 1;
            if retransmission {
                self.stats.retransmissions += 1;
                metrics::counter!(metric_defs::HARQ_RETRANSMISSIONS.name, &self.labels.to_labels())
                    .increment(1);
            }
            trace!(
                node = %self.node_id,
                peer = %descriptor.peer,
                harq_id = descriptor.harq_id,
                retransmission,
                "data transmitted"
            );
            self.outbox.push(self.packet(start_time, duration, samples, payload));
        }

        for message in std::mem::take(&mut self.control_pending) {
            let duration = self.carrier.span_duration(0, 1);
            let samples = self.placeholder_samples(&[], duration);
            self.stats.control_transmitted += 1;
            self.outbox.push(self.packet(self.now, duration, samples, PacketPayload::Control(message)));
        }
        Ok(())
    }

    fn packet(&self, start_time: SimTime, duration: SimTime, samples: Vec<Complex64>, payload: PacketPayload) -> Packet {
        let config = self.carrier.config();
        Packet {
            transmitter_id: self.node_id,
            transmitter_position: self.position,
            center_frequency_hz: config.center_frequency_hz,
            power_dbm: config.tx_power_dbm,
            num_transmit_antennas: config.num_transmit_antennas,
            start_time,
            duration,
            abstraction: self.carrier.abstraction(),
            samples,
            payload,
        }
    }

    /// QPSK-looking samples derived from the block bytes, two bits per sample.
    fn placeholder_samples(&self, bytes: &[u8], duration: SimTime) -> Vec<Complex64> {
        if self.carrier.abstraction() == Abstraction::Abstract {
            return Vec::new();
        }
        let count = (duration.as_secs_f64() * self.carrier.sample_rate_hz()).round() as usize;
        (0..count)
            .map(|k| {
                let bits = match bytes {
                    [] => 0,
                    _ => (bytes[(k / 4) % bytes.len()] >> ((k % 4) * 2)) & 0b11,
                };
                let re = if bits & 0b01 == 0 { SAMPLE_AMPLITUDE } else { -SAMPLE_AMPLITUDE };
                let im = if bits & 0b10 == 0 { SAMPLE_AMPLITUDE } else { -SAMPLE_AMPLITUDE };
                Complex64::new(re, im)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierConfig;
    use crate::sink::PhyIndication;

    const BS: NodeId = NodeId(1);
    const UE: NodeId = NodeId(2);

    fn core(id: NodeId, peer: NodeId, config: CarrierConfig) -> TimingCore {
        let mut core = TimingCore::new(id, "test", Carrier::new(config).unwrap(), 9);
        core.add_peer(peer);
        core
    }

    fn full_slot(peer: NodeId, harq_id: u8) -> TxDescriptor {
        TxDescriptor { peer, harq_id, start_symbol: 0, num_symbols: 14 }
    }

    fn rx_slot(peer: NodeId, harq_id: u8) -> RxDescriptor {
        RxDescriptor { peer, harq_id, tbs: 4, num_symbols: 14 }
    }

    #[test]
    fn test_transmit_emits_one_packet_per_descriptor() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        tx.tx_request(full_slot(UE, 0), Some(vec![1, 2, 3, 4].into())).unwrap();
        tx.tx_request(full_slot(UE, 1), Some(vec![5].into())).unwrap();
        tx.run(SimTime::ZERO).unwrap();
        let sent = tx.pull_transmitted();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].duration, SimTime::from_micros(500));
        assert_eq!(sent[0].destination(), UE);

        // Nothing is sent twice.
        tx.run(SimTime::ZERO).unwrap();
        assert!(tx.pull_transmitted().is_empty());
    }

    #[test]
    fn test_retransmission_reuses_buffered_block() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        tx.tx_request(full_slot(UE, 2), Some(vec![9, 8, 7].into())).unwrap();
        tx.run(SimTime::ZERO).unwrap();
        let first = tx.pull_transmitted().remove(0);

        tx.tx_request(full_slot(UE, 2), None).unwrap();
        tx.run(SimTime::from_micros(500)).unwrap();
        let again = tx.pull_transmitted().remove(0);

        let (a, b) = (first.data().unwrap(), again.data().unwrap());
        assert_eq!(a.block.as_bytes(), b.block.as_bytes());
        assert!(!a.retransmission);
        assert!(b.retransmission);
        assert_eq!(tx.stats().retransmissions, 1);
    }

    #[test]
    fn test_retransmission_of_empty_process_fails() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        tx.tx_request(full_slot(UE, 5), None).unwrap();
        let err = tx.run(SimTime::ZERO).unwrap_err();
        assert!(matches!(err, SimError::EmptyHarqProcess { peer: UE, harq_id: 5 }));
    }

    #[test]
    fn test_tx_request_validation() {
        let mut tx = core(BS, UE, CarrierConfig { num_harq_processes: 4, ..Default::default() });
        assert!(matches!(
            tx.tx_request(full_slot(UE, 4), None),
            Err(SimError::HarqProcessOutOfRange { harq_id: 4, num_processes: 4 })
        ));
        let crossing = TxDescriptor { peer: UE, harq_id: 0, start_symbol: 12, num_symbols: 3 };
        assert!(matches!(tx.tx_request(crossing, None), Err(SimError::Timing(_))));
    }

    #[test]
    fn test_reception_completes_exactly_once() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        let mut rx = core(UE, BS, CarrierConfig::default());

        tx.tx_request(full_slot(UE, 0), Some(vec![1, 2, 3, 4].into())).unwrap();
        tx.run(SimTime::ZERO).unwrap();
        let info = TimingInfo { slot: 0, symbol: 0, timestamp: SimTime::ZERO };
        rx.rx_request(rx_slot(BS, 0), info).unwrap();
        for packet in tx.pull_transmitted() {
            rx.push_received(packet);
        }

        let next = rx.run(SimTime::ZERO).unwrap();
        assert_eq!(next, Some(SimTime::from_micros(500)));
        assert!(rx.take_indications().is_empty());

        let end = SimTime::from_micros(500);
        for _ in 0..3 {
            rx.run(end).unwrap();
        }
        let delivered = rx.take_indications();
        assert_eq!(delivered.len(), 1);
        match &delivered[0] {
            PhyIndication::Data { block, meta, .. } => {
                assert_eq!(block.as_bytes(), &[1, 2, 3, 4]);
                assert_eq!(meta.peer, BS);
                assert_eq!(meta.tbs, 4);
                assert_eq!(meta.harq_id, 0);
            }
            other => panic!("unexpected indication {:?}", other),
        }
        assert_eq!(rx.pending_receptions(), 0);
        assert_eq!(rx.stats().blocks_received, 1);
    }

    #[test]
    fn test_reception_at_frame_end_wraps() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        let mut rx = core(UE, BS, CarrierConfig::default());
        let last_slot = SimTime::from_micros(9_500);

        tx.tx_request(full_slot(UE, 0), Some(vec![7].into())).unwrap();
        tx.run(last_slot).unwrap();
        rx.rx_request(rx_slot(BS, 0), TimingInfo { slot: 19, symbol: 0, timestamp: last_slot }).unwrap();
        for packet in tx.pull_transmitted() {
            rx.push_received(packet);
        }
        rx.run(last_slot).unwrap();
        assert_eq!(rx.run(SimTime::from_millis(10)).unwrap(), None);
        assert_eq!(rx.take_indications().len(), 1);
    }

    #[test]
    fn test_booked_reception_without_packet_is_cleared() {
        let mut rx = core(UE, BS, CarrierConfig::default());
        rx.rx_request(rx_slot(BS, 0), TimingInfo { slot: 0, symbol: 0, timestamp: SimTime::ZERO })
            .unwrap();
        rx.run(SimTime::from_micros(500)).unwrap();
        assert!(rx.take_indications().is_empty());
        assert_eq!(rx.stats().missed_receptions, 1);
        assert_eq!(rx.pending_receptions(), 0);
    }

    #[test]
    fn test_packets_from_strangers_are_ignored() {
        let mut tx = core(NodeId(9), UE, CarrierConfig::default());
        let mut rx = core(UE, BS, CarrierConfig::default());
        tx.tx_request(full_slot(UE, 0), Some(vec![1].into())).unwrap();
        tx.run(SimTime::ZERO).unwrap();
        for packet in tx.pull_transmitted() {
            rx.push_received(packet);
        }
        rx.run(SimTime::ZERO).unwrap();
        assert_eq!(rx.stats().ignored_packets, 1);
    }

    #[test]
    fn test_control_goes_to_sink_queue() {
        let mut tx = core(BS, UE, CarrierConfig::default());
        let mut rx = core(UE, BS, CarrierConfig::default());
        tx.send_control(ControlMessage {
            destination: UE,
            kind: rnsim_common::ControlKind::Nack { harq_id: 3 },
        });
        tx.run(SimTime::ZERO).unwrap();
        let sent = tx.pull_transmitted();
        assert!(sent[0].is_control());
        for packet in sent {
            rx.push_received(packet);
        }
        rx.run(SimTime::ZERO).unwrap();
        assert_eq!(
            rx.take_indications(),
            vec![PhyIndication::Control { from: BS, kind: rnsim_common::ControlKind::Nack { harq_id: 3 } }]
        );
    }

    #[test]
    fn test_full_phy_generates_samples() {
        let config = CarrierConfig { full_phy: true, ..Default::default() };
        let mut tx = core(BS, UE, config);
        tx.tx_request(full_slot(UE, 0), Some(vec![0b1110_0100].into())).unwrap();
        tx.run(SimTime::ZERO).unwrap();
        let packet = tx.pull_transmitted().remove(0);
        assert_eq!(packet.abstraction, Abstraction::Full);
        // 500 us at 30.72 MHz
        assert_eq!(packet.samples.len(), 15_360);
        assert_eq!(packet.samples[0], Complex64::new(0.5, 0.5));
        assert_eq!(packet.samples[1], Complex64::new(-0.5, 0.5));
        assert_eq!(packet.samples[2], Complex64::new(0.5, -0.5));
        assert_eq!(packet.samples[3], Complex64::new(-0.5, -0.5));
    }
}
