//! Base station to terminal link driven slot by slot without a scheduler.

use rnsim_common::{NodeId, SimTime, TransportBlock};
use rnsim_nr::{
    BaseStationPhy, CarrierConfig, CsiReportConfig, PhyIndication, RadioPhy, ReceiveSink, RxDescriptor,
    RxMeta, TerminalPhy, TimingInfo, TxDescriptor,
};
use statrs::distribution::Binomial;
use statrs::statistics::Distribution;
use std::cell::RefCell;
use std::rc::Rc;

const BS: NodeId = NodeId(1);
const UE: NodeId = NodeId(2);

/// Sink the test can read back after handing it to the PHY.
#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<PhyIndication>>>);

impl ReceiveSink for SharedSink {
    fn on_receive(&mut self, block: TransportBlock, crc_failed: bool, meta: RxMeta) {
        self.0.borrow_mut().push(PhyIndication::Data { block, crc_failed, meta });
    }
}

fn link(seed: u64) -> (BaseStationPhy, TerminalPhy) {
    let mut bs = BaseStationPhy::new(BS, CarrierConfig::default(), seed).unwrap();
    bs.attach_terminal(UE);
    let csi = CsiReportConfig::default();
    let ue = TerminalPhy::new(UE, BS, CarrierConfig::default(), &csi, seed + 1).unwrap();
    (bs, ue)
}

/// Send one block per slot from the base station and return (sent, indications).
fn run_slots(slots: u64, seed: u64) -> (u64, Vec<PhyIndication>) {
    let (mut bs, mut ue) = link(seed);
    let sink = SharedSink::default();
    ue.register_receive_sink(Box::new(sink.clone()));
    let slot = bs.carrier().slot_duration();

    let mut sent = 0;
    for n in 0..slots {
        let now = SimTime::from_nanos(n * slot.as_nanos());
        let info = TimingInfo::for_slot(bs.carrier(), now, 0);
        let payload = (n as u32).to_le_bytes().to_vec();

        bs.tx_request(
            TxDescriptor { peer: UE, harq_id: (n % 16) as u8, start_symbol: 0, num_symbols: 14 },
            Some(payload.into()),
        )
        .unwrap();
        ue.rx_request(RxDescriptor { peer: BS, harq_id: (n % 16) as u8, tbs: 4, num_symbols: 14 }, info)
            .unwrap();

        bs.run(now).unwrap();
        for packet in bs.pull_transmitted() {
            sent += 1;
            ue.push_received(packet);
        }
        ue.run(now).unwrap();
    }
    // Let the last reception complete.
    ue.run(SimTime::from_nanos(slots * slot.as_nanos())).unwrap();

    let delivered = sink.0.borrow().clone();
    (sent, delivered)
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_every_sent_block_is_delivered_once() {
    let (sent, delivered) = run_slots(200, 11);
    assert_eq!(sent, 200);
    assert_eq!(delivered.len(), 200);

    for (n, indication) in delivered.iter().enumerate() {
        match indication {
            PhyIndication::Data { block, meta, .. } => {
                assert_eq!(block.as_bytes(), &(n as u32).to_le_bytes());
                assert_eq!(meta.peer, BS);
                assert_eq!(meta.harq_id, (n % 16) as u8);
            }
            other => panic!("unexpected indication {:?}", other),
        }
    }
}

#[test]
fn test_crc_failure_rate_is_ten_percent() {
    let slots = 4000;
    let (_, delivered) = run_slots(slots, 5);
    let failures = delivered
        .iter()
        .filter(|i| matches!(i, PhyIndication::Data { crc_failed: true, .. }))
        .count() as f64;

    let expected = Binomial::new(0.1, slots).unwrap();
    let mean = expected.mean().unwrap();
    let sd = expected.std_dev().unwrap();
    assert!((failures - mean).abs() < 4.0 * sd, "failures={} mean={} sd={}", failures, mean, sd);
}

#[test]
fn test_same_seed_same_outcomes() {
    let (_, a) = run_slots(300, 77);
    let (_, b) = run_slots(300, 77);
    assert_eq!(a, b);
}

#[test]
fn test_transmission_starts_at_its_first_symbol() {
    let (mut bs, mut ue) = link(3);
    let sink = SharedSink::default();
    ue.register_receive_sink(Box::new(sink.clone()));
    let slot = bs.carrier().slot_duration();

    // Second half of slot 0 on both sides.
    bs.tx_request(
        TxDescriptor { peer: UE, harq_id: 0, start_symbol: 7, num_symbols: 7 },
        Some(vec![0x5A; 4].into()),
    )
    .unwrap();
    let info = TimingInfo::for_slot(ue.carrier(), SimTime::ZERO, 7);
    ue.rx_request(RxDescriptor { peer: BS, harq_id: 0, tbs: 4, num_symbols: 7 }, info).unwrap();

    bs.run(SimTime::ZERO).unwrap();
    let packet = bs.pull_transmitted().remove(0);
    assert_eq!(packet.start_time, bs.carrier().symbol_start_offset(7));
    assert_eq!(packet.start_time + packet.duration, slot);

    ue.push_received(packet);
    ue.run(SimTime::ZERO).unwrap();
    ue.run(slot).unwrap();

    assert_eq!(ue.stats().missed_receptions, 0);
    let delivered = sink.0.borrow();
    assert_eq!(delivered.len(), 1);
    assert!(matches!(&delivered[0], PhyIndication::Data { block, .. } if block.as_bytes() == [0x5A; 4]));
}

// ============================================================================
// HARQ
// ============================================================================

#[test]
fn test_retransmission_is_byte_identical_over_the_air() {
    let (mut bs, _) = link(1);
    let desc = TxDescriptor { peer: UE, harq_id: 4, start_symbol: 0, num_symbols: 14 };

    bs.tx_request(desc, Some(vec![0xDE, 0xAD, 0xBE, 0xEF].into())).unwrap();
    bs.run(SimTime::ZERO).unwrap();
    let first = bs.pull_transmitted().remove(0);

    bs.tx_request(desc, None).unwrap();
    bs.run(SimTime::from_micros(500)).unwrap();
    let second = bs.pull_transmitted().remove(0);

    assert_eq!(first.data().unwrap().block, second.data().unwrap().block);
    assert!(second.data().unwrap().retransmission);

    bs.tx_request(desc, Some(vec![0x01].into())).unwrap();
    bs.tx_request(desc, None).unwrap();
    bs.run(SimTime::from_millis(1)).unwrap();
    let pair = bs.pull_transmitted();
    assert_eq!(pair[1].data().unwrap().block.as_bytes(), &[0x01]);
}
