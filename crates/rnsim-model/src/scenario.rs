//! Scenario file schema.

use rnsim_channel::PulseTrainConfig;
use rnsim_common::SimulatorConfig;
use rnsim_node::{MacConfig, TrafficConfig};
use rnsim_nr::{CarrierConfig, CsiReportConfig, DEFAULT_BLOCK_ERROR_RATE};
use serde::{Deserialize, Serialize};

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Run length and scheduler settings.
    #[serde(default)]
    pub simulation: SimulationSection,
    /// Channel between every pair of nodes.
    #[serde(default)]
    pub channel: ChannelSection,
    /// Carrier shared by every node unless a node overrides it.
    #[serde(default)]
    pub carrier: CarrierConfig,
    /// MAC settings shared by every node unless a node overrides them.
    #[serde(default)]
    pub mac: MacConfig,
    /// The nodes, in id order.
    pub nodes: Vec<NodeSection>,
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// Default run length in milliseconds.
    pub duration_ms: f64,
    /// Scheduler settings.
    #[serde(flatten)]
    pub scheduler: SimulatorConfig,
}

impl Default for SimulationSection {
    fn default() -> Self {
        SimulationSection { duration_ms: 100.0, scheduler: SimulatorConfig::default() }
    }
}

/// Channel description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelSection {
    /// Free-space path loss.
    #[default]
    FreeSpace,
    /// Lossless.
    Identity,
    /// Radar pulse blanking on top of an inner channel.
    PulseBlanking {
        /// Channel applied before blanking.
        #[serde(default)]
        inner: InnerChannel,
        /// The interfering pulse train.
        pulse_train: PulseTrainConfig,
    },
}

/// Channels that can sit inside the pulse-blanking channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InnerChannel {
    /// Free-space path loss.
    #[default]
    FreeSpace,
    /// Lossless.
    Identity,
}

/// Node role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Base station.
    BaseStation,
    /// Terminal attached to a base station.
    Terminal,
}

/// One node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSection {
    /// Unique name.
    pub name: String,
    /// Role.
    pub role: Role,
    /// Position in metres.
    #[serde(default)]
    pub position: [f64; 3],
    /// Velocity in m/s.
    #[serde(default)]
    pub velocity: [f64; 3],
    /// Serving base station (terminals only).
    #[serde(default)]
    pub serving: Option<String>,
    /// Per-node carrier override.
    #[serde(default)]
    pub carrier: Option<CarrierConfig>,
    /// Per-node MAC override.
    #[serde(default)]
    pub mac: Option<MacConfig>,
    /// Channel-quality reporting (terminals only).
    #[serde(default)]
    pub csi: CsiReportConfig,
    /// Application traffic generated by this node.
    #[serde(default)]
    pub traffic: Option<TrafficConfig>,
    /// CRC failure probability.
    #[serde(default = "default_block_error_rate")]
    pub block_error_rate: f64,
    /// Fail blocks whose fraction of saturated samples exceeds this.
    #[serde(default)]
    pub saturation_threshold: Option<f64>,
}

fn default_block_error_rate() -> f64 {
    DEFAULT_BLOCK_ERROR_RATE
}
