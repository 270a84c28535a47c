//! Slot-driven MAC.
//!
//! At every slot boundary the MAC books one reception per peer and, if
//! anything is waiting, one transmission: a pending HARQ retransmission first,
//! otherwise a fresh PDU from the RLC for the next peer in round-robin order.
//! With feedback enabled, CRC outcomes are answered with ACK/NACK control
//! messages and NACKed processes are retransmitted up to a limit.

use crate::rlc::Rlc;
use rnsim_common::{ControlKind, ControlMessage, NodeId, SimError, SimTime};
use rnsim_nr::{PhyIndication, PhyRole, RadioPhy, RxDescriptor, TimingInfo, TxDescriptor, SYMBOLS_PER_SLOT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace};

/// MAC behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacConfig {
    /// Symbols covered by each grant, starting at symbol 0.
    pub symbols_per_grant: u32,
    /// Send ACK/NACK and retransmit NACKed processes.
    pub feedback: bool,
    /// Retransmissions per process before giving up.
    pub max_retransmissions: u8,
    /// Book a CSI-RS occasion every this many slots (terminals only).
    pub csi_rs_period_slots: Option<u32>,
}

impl Default for MacConfig {
    fn default() -> Self {
        MacConfig {
            symbols_per_grant: SYMBOLS_PER_SLOT,
            feedback: false,
            max_retransmissions: 3,
            csi_rs_period_slots: None,
        }
    }
}

/// Counters kept by the MAC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacStats {
    /// Slots processed.
    pub slots: u64,
    /// Fresh transport blocks scheduled.
    pub new_transmissions: u64,
    /// Retransmissions scheduled after a NACK.
    pub retransmissions: u64,
    /// Blocks received with a good CRC.
    pub blocks_ok: u64,
    /// Blocks received with a bad CRC.
    pub blocks_failed: u64,
    /// Processes abandoned after too many retransmissions.
    pub harq_failures: u64,
    /// CQI reports sent or received.
    pub cqi_reports: u64,
}

/// One grant per slot, round-robin over peers.
pub struct SlotMac {
    config: MacConfig,
    node_id: NodeId,
    last_slot: Option<u64>,
    round_robin: usize,
    next_harq: BTreeMap<NodeId, u8>,
    pending_retx: VecDeque<(NodeId, u8)>,
    retx_counts: BTreeMap<(NodeId, u8), u8>,
    latest_cqi: BTreeMap<NodeId, u8>,
    stats: MacStats,
}

impl SlotMac {
    /// MAC for `node_id`.
    pub fn new(node_id: NodeId, config: MacConfig) -> Self {
        SlotMac {
            config,
            node_id,
            last_slot: None,
            round_robin: 0,
            next_harq: BTreeMap::new(),
            pending_retx: VecDeque::new(),
            retx_counts: BTreeMap::new(),
            latest_cqi: BTreeMap::new(),
            stats: MacStats::default(),
        }
    }

    /// Settings.
    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    /// Counters.
    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    /// Last CQI known for `peer` (reported by it, or measured locally).
    pub fn latest_cqi(&self, peer: NodeId) -> Option<u8> {
        self.latest_cqi.get(&peer).copied()
    }

    /// Retransmissions waiting for a grant.
    pub fn pending_retransmissions(&self) -> usize {
        self.pending_retx.len()
    }

    /// Start of the slot after the one containing `now`.
    pub fn next_slot_start(&self, phy: &dyn RadioPhy, now: SimTime) -> SimTime {
        let slot = phy.carrier().slot_duration().as_nanos();
        SimTime::from_nanos((now.as_nanos() / slot + 1) * slot)
    }

    /// Issue this slot's requests. Does nothing if the slot was already handled.
    pub fn on_slot(&mut self, now: SimTime, phy: &mut dyn RadioPhy, rlc: &mut dyn Rlc) -> Result<(), SimError> {
        let carrier = phy.carrier();
        let slot_index = now.as_nanos() / carrier.slot_duration().as_nanos();
        if self.last_slot == Some(slot_index) {
            return Ok(());
        }
        self.last_slot = Some(slot_index);
        self.stats.slots += 1;

        let info = TimingInfo::for_slot(carrier, now, 0);
        let num_symbols = self.config.symbols_per_grant;
        let peers = phy.peers();

        for &peer in &peers {
            let rx = RxDescriptor { peer, harq_id: 0, tbs: 0, num_symbols };
            phy.rx_request(rx, info)?;
        }

        if phy.role() == PhyRole::Terminal {
            if let Some(period) = self.config.csi_rs_period_slots.filter(|p| *p > 0) {
                if slot_index % u64::from(period) == 0 {
                    phy.csi_rs_request(TimingInfo { symbol: SYMBOLS_PER_SLOT - 1, ..info })?;
                }
            }
        }

        if let Some((peer, harq_id)) = self.pending_retx.pop_front() {
            let tx = TxDescriptor { peer, harq_id, start_symbol: 0, num_symbols };
            phy.tx_request(tx, None)?;
            self.stats.retransmissions += 1;
            debug!(node = %self.node_id, %peer, harq_id, "HARQ retransmission scheduled");
            return Ok(());
        }

        if peers.is_empty() {
            return Ok(());
        }
        if let Some(pdu) = rlc.pull_pdu() {
            let peer = peers[self.round_robin % peers.len()];
            self.round_robin = self.round_robin.wrapping_add(1);
            let harq_id = self.allocate_process(peer, phy.core().harq().num_processes());
            let tx = TxDescriptor { peer, harq_id, start_symbol: 0, num_symbols };
            phy.tx_request(tx, Some(pdu.into()))?;
            self.stats.new_transmissions += 1;
            trace!(node = %self.node_id, %peer, harq_id, "new transmission scheduled");
        }
        Ok(())
    }

    fn allocate_process(&mut self, peer: NodeId, num_processes: u8) -> u8 {
        let next = self.next_harq.entry(peer).or_insert(0);
        let harq_id = *next;
        *next = (harq_id + 1) % num_processes.max(1);
        harq_id
    }

    /// React to one PHY indication.
    pub fn on_indication(&mut self, indication: PhyIndication, phy: &mut dyn RadioPhy, rlc: &mut dyn Rlc) {
        match indication {
            PhyIndication::Data { block, crc_failed, meta } => {
                if crc_failed {
                    self.stats.blocks_failed += 1;
                } else {
                    self.stats.blocks_ok += 1;
                    rlc.deliver(block.into_bytes());
                }
                if self.config.feedback {
                    let kind = if crc_failed {
                        ControlKind::Nack { harq_id: meta.harq_id }
                    } else {
                        ControlKind::Ack { harq_id: meta.harq_id }
                    };
                    phy.send_control(ControlMessage { destination: meta.peer, kind });
                }
            }
            PhyIndication::Control { from, kind } => self.on_control(from, kind, phy),
            PhyIndication::ChannelQuality(report) => {
                self.latest_cqi.insert(report.peer, report.cqi);
                self.stats.cqi_reports += 1;
                phy.send_control(ControlMessage {
                    destination: report.peer,
                    kind: ControlKind::CqiReport { cqi: report.cqi },
                });
            }
        }
    }

    fn on_control(&mut self, from: NodeId, kind: ControlKind, phy: &mut dyn RadioPhy) {
        match kind {
            ControlKind::Ack { harq_id } => {
                self.retx_counts.remove(&(from, harq_id));
                phy.core_mut().harq_mut().release(from, harq_id);
            }
            ControlKind::Nack { harq_id } => {
                let count = self.retx_counts.entry((from, harq_id)).or_insert(0);
                if *count < self.config.max_retransmissions && phy.core().harq().get(from, harq_id).is_some() {
                    *count += 1;
                    self.pending_retx.push_back((from, harq_id));
                } else {
                    self.retx_counts.remove(&(from, harq_id));
                    self.stats.harq_failures += 1;
                    debug!(node = %self.node_id, peer = %from, harq_id, "HARQ process abandoned");
                }
            }
            ControlKind::CqiReport { cqi } => {
                self.latest_cqi.insert(from, cqi);
                self.stats.cqi_reports += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlc::TransparentRlc;
    use rnsim_nr::{BaseStationPhy, CarrierConfig, RxMeta};

    fn bs_with(terminals: &[u32]) -> BaseStationPhy {
        let mut bs = BaseStationPhy::new(NodeId(1), CarrierConfig::default(), 0).unwrap();
        for t in terminals {
            bs.attach_terminal(NodeId(*t));
        }
        bs
    }

    #[test]
    fn test_once_per_slot() {
        let mut phy = bs_with(&[2]);
        let mut rlc = TransparentRlc::new();
        rlc.enqueue(vec![1; 4]);
        rlc.enqueue(vec![2; 4]);
        let mut mac = SlotMac::new(NodeId(1), MacConfig::default());

        mac.on_slot(SimTime::ZERO, &mut phy, &mut rlc).unwrap();
        mac.on_slot(SimTime::from_micros(100), &mut phy, &mut rlc).unwrap();
        assert_eq!(mac.stats().slots, 1);
        assert_eq!(mac.stats().new_transmissions, 1);
        assert_eq!(rlc.buffered_bytes(), 4);
        assert_eq!(phy.core().pending_receptions(), 1);
        assert_eq!(mac.next_slot_start(&phy, SimTime::from_micros(100)), SimTime::from_micros(500));
    }

    #[test]
    fn test_round_robin_and_process_rotation() {
        let mut phy = bs_with(&[2, 3]);
        let mut rlc = TransparentRlc::new();
        let mut mac = SlotMac::new(NodeId(1), MacConfig::default());
        let mut sent = Vec::new();
        for n in 0..4u64 {
            rlc.enqueue(vec![n as u8]);
            let now = SimTime::from_micros(500 * n);
            mac.on_slot(now, &mut phy, &mut rlc).unwrap();
            phy.run(now).unwrap();
            for packet in phy.pull_transmitted() {
                let data = packet.data().unwrap();
                sent.push((data.destination, data.harq_id));
            }
        }
        assert_eq!(
            sent,
            vec![(NodeId(2), 0), (NodeId(3), 0), (NodeId(2), 1), (NodeId(3), 1)]
        );
    }

    #[test]
    fn test_nack_triggers_bounded_retransmissions() {
        let mut phy = bs_with(&[2]);
        let mut rlc = TransparentRlc::new();
        let config = MacConfig { feedback: true, max_retransmissions: 2, ..Default::default() };
        let mut mac = SlotMac::new(NodeId(1), config);

        rlc.enqueue(vec![0xEE; 6]);
        mac.on_slot(SimTime::ZERO, &mut phy, &mut rlc).unwrap();
        phy.run(SimTime::ZERO).unwrap();
        phy.pull_transmitted();

        let nack = PhyIndication::Control { from: NodeId(2), kind: ControlKind::Nack { harq_id: 0 } };
        for n in 1..=3u64 {
            mac.on_indication(nack.clone(), &mut phy, &mut rlc);
            let now = SimTime::from_micros(500 * n);
            mac.on_slot(now, &mut phy, &mut rlc).unwrap();
            phy.run(now).unwrap();
            let sent = phy.pull_transmitted();
            if n <= 2 {
                let data = sent[0].data().unwrap();
                assert!(data.retransmission);
                assert_eq!(data.block.as_bytes(), &[0xEE; 6]);
            } else {
                assert!(sent.is_empty());
            }
        }
        assert_eq!(mac.stats().retransmissions, 2);
        assert_eq!(mac.stats().harq_failures, 1);
    }

    #[test]
    fn test_crc_outcome_sends_feedback() {
        let mut phy = bs_with(&[2]);
        let mut rlc = TransparentRlc::new();
        let mut mac = SlotMac::new(NodeId(1), MacConfig { feedback: true, ..Default::default() });
        let meta = RxMeta { peer: NodeId(2), tbs: 3, harq_id: 7, rx_power_dbm: -60.0, sinr_db: 20.0 };

        mac.on_indication(PhyIndication::Data { block: vec![1, 2, 3].into(), crc_failed: true, meta }, &mut phy, &mut rlc);
        mac.on_indication(PhyIndication::Data { block: vec![4, 5, 6].into(), crc_failed: false, meta }, &mut phy, &mut rlc);
        phy.run(SimTime::ZERO).unwrap();

        let kinds: Vec<_> = phy
            .pull_transmitted()
            .into_iter()
            .filter_map(|p| match p.payload {
                rnsim_common::PacketPayload::Control(c) => Some(c.kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![ControlKind::Nack { harq_id: 7 }, ControlKind::Ack { harq_id: 7 }]);
        assert_eq!(rlc.stats().sdus_delivered, 1);
        assert_eq!(mac.stats().blocks_failed, 1);
    }

    #[test]
    fn test_ack_releases_process() {
        let mut phy = bs_with(&[2]);
        let mut rlc = TransparentRlc::new();
        let mut mac = SlotMac::new(NodeId(1), MacConfig { feedback: true, ..Default::default() });
        rlc.enqueue(vec![9]);
        mac.on_slot(SimTime::ZERO, &mut phy, &mut rlc).unwrap();
        phy.run(SimTime::ZERO).unwrap();
        assert!(phy.core().harq().get(NodeId(2), 0).is_some());

        let ack = PhyIndication::Control { from: NodeId(2), kind: ControlKind::Ack { harq_id: 0 } };
        mac.on_indication(ack, &mut phy, &mut rlc);
        assert!(phy.core().harq().get(NodeId(2), 0).is_none());
    }
}
