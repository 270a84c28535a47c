//! Radio link control.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counters kept by an RLC entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlcStats {
    /// SDUs accepted from the application.
    pub sdus_enqueued: u64,
    /// PDUs handed to the MAC.
    pub pdus_sent: u64,
    /// SDUs delivered upward on the receive side.
    pub sdus_delivered: u64,
    /// Bytes delivered upward.
    pub bytes_delivered: u64,
}

/// Queueing between the application and the MAC.
pub trait Rlc {
    /// Accept an SDU for transmission.
    fn enqueue(&mut self, sdu: Vec<u8>);

    /// Bytes waiting for transmission.
    fn buffered_bytes(&self) -> usize;

    /// Next PDU for the MAC, if any.
    fn pull_pdu(&mut self) -> Option<Vec<u8>>;

    /// Accept a PDU from the MAC receive side.
    fn deliver(&mut self, pdu: Vec<u8>);

    /// Counters.
    fn stats(&self) -> &RlcStats;
}

/// Transparent mode: one SDU per PDU, unbounded FIFO, no segmentation.
#[derive(Debug, Default)]
pub struct TransparentRlc {
    queue: VecDeque<Vec<u8>>,
    buffered: usize,
    stats: RlcStats,
}

impl TransparentRlc {
    /// Empty entity.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Rlc for TransparentRlc {
    fn enqueue(&mut self, sdu: Vec<u8>) {
        self.buffered += sdu.len();
        self.stats.sdus_enqueued += 1;
        self.queue.push_back(sdu);
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    fn pull_pdu(&mut self) -> Option<Vec<u8>> {
        let pdu = self.queue.pop_front()?;
        self.buffered -= pdu.len();
        self.stats.pdus_sent += 1;
        Some(pdu)
    }

    fn deliver(&mut self, pdu: Vec<u8>) {
        self.stats.sdus_delivered += 1;
        self.stats.bytes_delivered += pdu.len() as u64;
    }

    fn stats(&self) -> &RlcStats {
        &self.stats
    }
}
