//! # rnsim-node
//!
//! Composes the protocol layers of one simulated radio into a [`SimNode`]
//! the scheduler can drive:
//!
//! ```text
//! TrafficSource -> Rlc -> SlotMac -> RadioPhy -> PacketBuffer
//! ```
//!
//! [`SimNode`]: rnsim_common::SimNode

mod mac;
mod radio_node;
mod rlc;
mod traffic;

pub use mac::{MacConfig, MacStats, SlotMac};
pub use radio_node::{RadioNode, RadioNodeStats};
pub use rlc::{Rlc, RlcStats, TransparentRlc};
pub use traffic::{FixedIntervalTraffic, PoissonTraffic, TrafficConfig, TrafficSource};
