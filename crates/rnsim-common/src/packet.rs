//! Over-the-air packets.
//!
//! A [`Packet`] is what a node's radio puts on the air. Once queued for
//! transmission it is never mutated: the channel produces a fresh copy for each
//! receiver.

use crate::{NodeId, SimTime, Vec3};
use num_complex::Complex64;
use std::fmt;

/// How much physical-layer detail a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Abstraction {
    /// In-phase/quadrature samples are present and processed.
    Full,
    /// No samples; only packet-level metadata is modelled.
    #[default]
    Abstract,
}

/// Opaque payload unit exchanged between peer radios.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct TransportBlock(Vec<u8>);

impl TransportBlock {
    /// Wrap raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        TransportBlock(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length block.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TransportBlock {
    fn from(bytes: Vec<u8>) -> Self {
        TransportBlock(bytes)
    }
}

impl fmt::Debug for TransportBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportBlock({} bytes)", self.0.len())
    }
}

/// A data transmission: one transport block for one HARQ process.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPayload {
    /// Intended receiver.
    pub destination: NodeId,
    /// HARQ process the block belongs to.
    pub harq_id: u8,
    /// Transport-block size in bytes.
    pub tbs: usize,
    /// The block itself.
    pub block: TransportBlock,
    /// True when this transmission reuses a buffered block.
    pub retransmission: bool,
}

/// Control signalling carried outside the data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Positive acknowledgement for a HARQ process.
    Ack {
        /// Acknowledged process.
        harq_id: u8,
    },
    /// Negative acknowledgement for a HARQ process.
    Nack {
        /// Process to retransmit.
        harq_id: u8,
    },
    /// Channel-quality indicator report.
    CqiReport {
        /// Reported CQI (0-15).
        cqi: u8,
    },
}

/// A control message addressed to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    /// Intended receiver.
    pub destination: NodeId,
    /// Message contents.
    pub kind: ControlKind,
}

/// What a packet carries.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketPayload {
    /// User data (a transport block).
    Data(DataPayload),
    /// Control signalling; never buffered as data by the receiver.
    Control(ControlMessage),
}

impl PacketPayload {
    /// Destination of the payload.
    pub fn destination(&self) -> NodeId {
        match self {
            PacketPayload::Data(d) => d.destination,
            PacketPayload::Control(c) => c.destination,
        }
    }
}

/// A packet on the air.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Node that transmitted the packet.
    pub transmitter_id: NodeId,
    /// Transmitter position at transmission time.
    pub transmitter_position: Vec3,
    /// Carrier centre frequency in Hz.
    pub center_frequency_hz: f64,
    /// Power in dBm (transmit power at the sender, received power after the channel).
    pub power_dbm: f64,
    /// Number of transmit antennas used.
    pub num_transmit_antennas: usize,
    /// Start of the transmission.
    pub start_time: SimTime,
    /// Time on air.
    pub duration: SimTime,
    /// Level of physical-layer detail.
    pub abstraction: Abstraction,
    /// Baseband samples; empty for abstract packets.
    pub samples: Vec<Complex64>,
    /// Contents.
    pub payload: PacketPayload,
}

impl Packet {
    /// End of the transmission.
    pub fn end_time(&self) -> SimTime {
        self.start_time + self.duration
    }

    /// True for data packets.
    pub fn is_data(&self) -> bool {
        matches!(self.payload, PacketPayload::Data(_))
    }

    /// True for control packets.
    pub fn is_control(&self) -> bool {
        matches!(self.payload, PacketPayload::Control(_))
    }

    /// Destination node of the payload.
    pub fn destination(&self) -> NodeId {
        self.payload.destination()
    }

    /// The data payload, if any.
    pub fn data(&self) -> Option<&DataPayload> {
        match &self.payload {
            PacketPayload::Data(d) => Some(d),
            PacketPayload::Control(_) => None,
        }
    }

    /// Sample period: `duration / samples.len()`, in seconds.
    ///
    /// `None` when the packet carries no samples.
    pub fn sample_period_secs(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.duration.as_secs_f64() / self.samples.len() as f64)
        }
    }
}
