//! Per-peer HARQ retransmission buffers.

use rnsim_common::{NodeId, SimError, TransportBlock};
use std::collections::BTreeMap;

/// What [`HarqBuffer::resolve`] did for one transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarqOutcome {
    /// A fresh block was stored and is sent.
    NewData(TransportBlock),
    /// The buffered block is sent again.
    Retransmission(TransportBlock),
}

impl HarqOutcome {
    /// The block to put on the air.
    pub fn block(&self) -> &TransportBlock {
        match self {
            HarqOutcome::NewData(b) | HarqOutcome::Retransmission(b) => b,
        }
    }

    /// True for a retransmission.
    pub fn is_retransmission(&self) -> bool {
        matches!(self, HarqOutcome::Retransmission(_))
    }
}

/// Last transmitted transport block per `(peer, process)`.
#[derive(Debug, Clone)]
pub struct HarqBuffer {
    num_processes: u8,
    blocks: BTreeMap<(NodeId, u8), TransportBlock>,
}

impl HarqBuffer {
    /// Buffer with `num_processes` processes per peer.
    pub fn new(num_processes: u8) -> Self {
        HarqBuffer { num_processes, blocks: BTreeMap::new() }
    }

    /// Configured processes per peer.
    pub fn num_processes(&self) -> u8 {
        self.num_processes
    }

    fn check(&self, harq_id: u8) -> Result<(), SimError> {
        if harq_id >= self.num_processes {
            return Err(SimError::HarqProcessOutOfRange { harq_id, num_processes: self.num_processes });
        }
        Ok(())
    }

    /// Store `fresh` if given, otherwise fetch the buffered block for retransmission.
    pub fn resolve(
        &mut self,
        peer: NodeId,
        harq_id: u8,
        fresh: Option<TransportBlock>,
    ) -> Result<HarqOutcome, SimError> {
        self.check(harq_id)?;
        match fresh {
            Some(block) => {
                self.blocks.insert((peer, harq_id), block.clone());
                Ok(HarqOutcome::NewData(block))
            }
            None => self
                .blocks
                .get(&(peer, harq_id))
                .cloned()
                .map(HarqOutcome::Retransmission)
                .ok_or(SimError::EmptyHarqProcess { peer, harq_id }),
        }
    }

    /// Buffered block, if any.
    pub fn get(&self, peer: NodeId, harq_id: u8) -> Option<&TransportBlock> {
        self.blocks.get(&(peer, harq_id))
    }

    /// Drop the buffered block (after an ACK).
    pub fn release(&mut self, peer: NodeId, harq_id: u8) -> Option<TransportBlock> {
        self.blocks.remove(&(peer, harq_id))
    }

    /// Number of occupied processes across all peers.
    pub fn occupied(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmission_reproduces_buffered_block() {
        let mut harq = HarqBuffer::new(16);
        let peer = NodeId(2);
        let first = TransportBlock::new(vec![1, 2, 3, 4]);

        let sent = harq.resolve(peer, 3, Some(first.clone())).unwrap();
        assert_eq!(sent, HarqOutcome::NewData(first.clone()));

        let again = harq.resolve(peer, 3, None).unwrap();
        assert!(again.is_retransmission());
        assert_eq!(again.block().as_bytes(), first.as_bytes());
    }

    #[test]
    fn test_fresh_block_overwrites() {
        let mut harq = HarqBuffer::new(4);
        let peer = NodeId(7);
        harq.resolve(peer, 0, Some(vec![0xAA].into())).unwrap();
        harq.resolve(peer, 0, Some(vec![0xBB, 0xCC].into())).unwrap();
        let again = harq.resolve(peer, 0, None).unwrap();
        assert_eq!(again.block().as_bytes(), &[0xBB, 0xCC]);
        assert_eq!(harq.occupied(), 1);
    }

    #[test]
    fn test_processes_are_keyed_per_peer() {
        let mut harq = HarqBuffer::new(2);
        harq.resolve(NodeId(1), 1, Some(vec![1].into())).unwrap();
        harq.resolve(NodeId(2), 1, Some(vec![2].into())).unwrap();
        assert_eq!(harq.get(NodeId(1), 1).unwrap().as_bytes(), &[1]);
        assert_eq!(harq.get(NodeId(2), 1).unwrap().as_bytes(), &[2]);
    }

    #[test]
    fn test_empty_process_is_an_error() {
        let mut harq = HarqBuffer::new(16);
        let err = harq.resolve(NodeId(5), 9, None).unwrap_err();
        assert!(matches!(err, SimError::EmptyHarqProcess { peer: NodeId(5), harq_id: 9 }));
    }

    #[test]
    fn test_process_out_of_range() {
        let mut harq = HarqBuffer::new(8);
        let err = harq.resolve(NodeId(1), 8, Some(vec![0].into())).unwrap_err();
        assert!(matches!(err, SimError::HarqProcessOutOfRange { harq_id: 8, num_processes: 8 }));
    }

    #[test]
    fn test_release() {
        let mut harq = HarqBuffer::new(16);
        harq.resolve(NodeId(1), 0, Some(vec![9].into())).unwrap();
        assert!(harq.release(NodeId(1), 0).is_some());
        assert!(harq.resolve(NodeId(1), 0, None).is_err());
    }
}
