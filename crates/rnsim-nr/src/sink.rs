//! Where the PHY hands received data and reports.

use rnsim_common::{ControlKind, NodeId, SimTime, TransportBlock};

/// Metadata delivered alongside a received transport block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxMeta {
    /// Transmitting peer.
    pub peer: NodeId,
    /// Transport-block size in bytes.
    pub tbs: usize,
    /// HARQ process.
    pub harq_id: u8,
    /// Received power.
    pub rx_power_dbm: f64,
    /// Signal to interference plus noise ratio.
    pub sinr_db: f64,
}

/// A periodic channel-quality report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelQualityReport {
    /// Peer the measurement is about.
    pub peer: NodeId,
    /// Channel-quality indicator, 0-15.
    pub cqi: u8,
    /// SINR the indicator was derived from, if anything was measured.
    pub sinr_db: Option<f64>,
    /// When the report was produced.
    pub time: SimTime,
}

/// Receives everything the PHY delivers upward.
pub trait ReceiveSink {
    /// A data reception completed.
    fn on_receive(&mut self, block: TransportBlock, crc_failed: bool, meta: RxMeta);

    /// A control message arrived from `from`.
    fn on_control(&mut self, _from: NodeId, _kind: ControlKind) {}

    /// A channel-quality update is due.
    fn on_channel_quality(&mut self, _report: ChannelQualityReport) {}
}

/// A queued PHY delivery, for upper layers that poll instead of registering a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum PhyIndication {
    /// Completed data reception.
    Data {
        /// Received block.
        block: TransportBlock,
        /// CRC outcome.
        crc_failed: bool,
        /// Reception metadata.
        meta: RxMeta,
    },
    /// Control message.
    Control {
        /// Sender.
        from: NodeId,
        /// Contents.
        kind: ControlKind,
    },
    /// Channel-quality update.
    ChannelQuality(ChannelQualityReport),
}

impl ReceiveSink for Vec<PhyIndication> {
    fn on_receive(&mut self, block: TransportBlock, crc_failed: bool, meta: RxMeta) {
        self.push(PhyIndication::Data { block, crc_failed, meta });
    }

    fn on_control(&mut self, from: NodeId, kind: ControlKind) {
        self.push(PhyIndication::Control { from, kind });
    }

    fn on_channel_quality(&mut self, report: ChannelQualityReport) {
        self.push(PhyIndication::ChannelQuality(report));
    }
}
