//! Metric declarations for RNSim.
//!
//! Every metric the simulator emits is declared once in [`metric_defs`] as a
//! [`Metric`] constant, so instrumentation sites never spell names by hand.
//! Emission goes through the [`metrics`] facade and is free when no recorder
//! is installed.
//!
//! ```rust
//! use rnsim_metrics::{metric_defs, metrics, NodeLabels};
//!
//! let labels = NodeLabels::new("gnb", "base_station");
//! metrics::counter!(metric_defs::PHY_BLOCKS_RECEIVED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic counter.
    Counter,
    /// Value that goes up and down.
    Gauge,
    /// Distribution of samples.
    Histogram,
}

/// A metric name together with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, e.g. `rnsim.phy.crc_failures`.
    pub name: &'static str,
    /// Kind.
    pub kind: MetricKind,
    /// Description shown by exporters.
    pub description: &'static str,
    /// Unit, if any.
    pub unit: Option<Unit>,
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Metric { name, kind, description: "", unit: None }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Attach a description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Attach a unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// Every metric emitted by the simulator.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Loop iterations executed by the scheduler.
    pub const SIM_ITERATIONS: Metric = Metric::counter("rnsim.sim.iterations")
        .with_description("Scheduler loop iterations")
        .with_unit(Unit::Count);

    /// Node invocations.
    pub const SIM_NODE_RUNS: Metric = Metric::counter("rnsim.sim.node_runs")
        .with_description("Node run invocations")
        .with_unit(Unit::Count);

    /// Actions fired (timed and time-advance).
    pub const ACTIONS_FIRED: Metric = Metric::counter("rnsim.actions.fired")
        .with_description("Scheduled actions invoked")
        .with_unit(Unit::Count);

    // ========================================================================
    // Distribution
    // ========================================================================

    /// Packets pulled from transmit queues.
    pub const PACKETS_TRANSMITTED: Metric = Metric::counter("rnsim.packets.transmitted")
        .with_description("Packets put on the air")
        .with_unit(Unit::Count);

    /// Packet copies delivered to receivers.
    pub const PACKETS_DELIVERED: Metric = Metric::counter("rnsim.packets.delivered")
        .with_description("Packet copies delivered to receive queues")
        .with_unit(Unit::Count);

    // ========================================================================
    // PHY
    // ========================================================================

    /// Transport blocks received (pass or fail).
    pub const PHY_BLOCKS_RECEIVED: Metric = Metric::counter("rnsim.phy.blocks_received")
        .with_description("Transport blocks resolved by the receiver")
        .with_unit(Unit::Count);

    /// Transport blocks received with a CRC failure.
    pub const PHY_CRC_FAILURES: Metric = Metric::counter("rnsim.phy.crc_failures")
        .with_description("Transport blocks delivered with a failed CRC")
        .with_unit(Unit::Count);

    /// HARQ retransmissions sent.
    pub const HARQ_RETRANSMISSIONS: Metric = Metric::counter("rnsim.harq.retransmissions")
        .with_description("Transport blocks retransmitted from a HARQ buffer")
        .with_unit(Unit::Count);

    /// SINR of received data.
    pub const PHY_RX_SINR: Metric = Metric::histogram("rnsim.phy.rx_sinr_db")
        .with_description("SINR of received transport blocks in dB");

    /// Latest reported CQI.
    pub const CSI_CQI: Metric = Metric::gauge("rnsim.csi.cqi")
        .with_description("Latest channel-quality indicator reported by a terminal");

    /// Every metric, for [`crate::describe_metrics`].
    pub const ALL: &[&Metric] = &[
        &SIM_ITERATIONS,
        &SIM_NODE_RUNS,
        &ACTIONS_FIRED,
        &PACKETS_TRANSMITTED,
        &PACKETS_DELIVERED,
        &PHY_BLOCKS_RECEIVED,
        &PHY_CRC_FAILURES,
        &HARQ_RETRANSMISSIONS,
        &PHY_RX_SINR,
        &CSI_CQI,
    ];
}

/// Labels attached to node-scoped metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabels {
    /// Node name.
    pub node: String,
    /// Node role, e.g. `base_station` or `terminal`.
    pub role: String,
}

impl NodeLabels {
    /// Create labels for a node.
    pub fn new(node: impl Into<String>, role: impl Into<String>) -> Self {
        NodeLabels { node: node.into(), role: role.into() }
    }

    /// Label pairs for the metrics macros.
    pub fn to_labels(&self) -> [(&'static str, String); 2] {
        [("node", self.node.clone()), ("role", self.role.clone())]
    }
}

/// Register every description with the installed recorder. Call once at startup.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
