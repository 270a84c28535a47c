//! # rnsim-common
//!
//! Types and traits shared by every RNSim crate:
//!
//! - [`SimTime`] - nanosecond simulation clock
//! - [`NodeId`] and the per-session [`IdAllocator`]
//! - [`Vec3`] - positions and velocities
//! - [`Packet`] - what radios put on the air
//! - [`SimNode`] and [`PacketBuffer`] - the node contract used by the scheduler
//! - [`SimError`], [`ConfigError`], [`TimingViolation`] - the error taxonomy
//! - [`SimulatorConfig`] - scheduler settings

mod config;
mod error;
mod geometry;
mod id;
mod node;
mod packet;
mod time;

pub use config::{IrrelevantPacketPolicy, SimulatorConfig, DEFAULT_MAX_SAME_INSTANT_ITERATIONS};
pub use error::{ConfigError, SimError, TimingViolation};
pub use geometry::Vec3;
pub use id::{IdAllocator, NodeId};
pub use node::{PacketBuffer, ReceiverInfo, SimNode, FREQUENCY_MATCH_TOLERANCE_HZ};
pub use packet::{
    Abstraction, ControlKind, ControlMessage, DataPayload, Packet, PacketPayload, TransportBlock,
};
pub use time::{earliest, SimTime};

pub use num_complex::Complex64;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
