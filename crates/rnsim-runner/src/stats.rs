//! Run summary.

use rnsim_common::SimTime;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Counters accumulated by [`crate::Simulator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    /// Clock at the end of the run.
    pub final_time: SimTime,
    /// Scheduler loop iterations.
    pub iterations: u64,
    /// Node invocations.
    pub node_runs: u64,
    /// Action callbacks invoked.
    pub actions_fired: u64,
    /// Packets put on the air.
    pub packets_transmitted: u64,
    /// Packet copies handed to receivers.
    pub packets_delivered: u64,
    /// Copies dropped as irrelevant.
    pub packets_dropped: u64,
    /// Iterations that stayed at the same instant.
    pub same_instant_reentries: u64,
    /// Reports of every node that keeps counters, in id order.
    pub nodes: Vec<serde_json::Value>,
}

impl SimulationStats {
    /// Report of the node called `name`, decoded as `T`.
    pub fn node<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.nodes
            .iter()
            .find(|n| n.get("name").and_then(serde_json::Value::as_str) == Some(name))
            .and_then(|n| serde_json::from_value(n.clone()).ok())
    }
}
