//! Scheduler configuration shared by the model and the runner.

use serde::{Deserialize, Serialize};

/// Default bound on consecutive iterations at one instant.
pub const DEFAULT_MAX_SAME_INSTANT_ITERATIONS: u32 = 1000;

/// What the distributor does with a packet the channel declares irrelevant
/// for a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrelevantPacketPolicy {
    /// Hand the packet over unchanged.
    #[default]
    DeliverUnmodified,
    /// Do not deliver it.
    Drop,
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Consecutive iterations allowed at one instant before the run fails.
    pub max_same_instant_iterations: u32,
    /// Handling of packets not relevant to a receiver.
    pub irrelevant_packets: IrrelevantPacketPolicy,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            max_same_instant_iterations: DEFAULT_MAX_SAME_INSTANT_ITERATIONS,
            irrelevant_packets: IrrelevantPacketPolicy::default(),
        }
    }
}
