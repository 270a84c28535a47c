//! Terminal PHY: one serving base station plus channel-quality reporting.

use crate::carrier::{Carrier, CarrierConfig};
use crate::timing_core::TimingCore;
use crate::cqi::{ChannelQualityTracker, CsiReportConfig};
use crate::sink::ChannelQualityReport;
use crate::timing::TimingInfo;
use crate::{PhyRole, RadioPhy};
use rnsim_common::{earliest, NodeId, SimError, SimTime};
use rnsim_metrics::{metric_defs, metrics, NodeLabels};
use tracing::debug;

/// PHY of a terminal.
pub struct TerminalPhy {
    core: TimingCore,
    serving: NodeId,
    tracker: ChannelQualityTracker,
}

impl TerminalPhy {
    /// Validate the configuration and create a terminal served by `serving`.
    pub fn new(
        node_id: NodeId,
        serving: NodeId,
        config: CarrierConfig,
        csi: &CsiReportConfig,
        seed: u64,
    ) -> Result<Self, SimError> {
        let carrier = Carrier::new(config)?;
        let tracker = ChannelQualityTracker::new(csi, &carrier)?;
        let mut core = TimingCore::new(node_id, PhyRole::Terminal.as_str(), carrier, seed);
        core.add_peer(serving);
        Ok(TerminalPhy { core, serving, tracker })
    }

    /// The serving base station.
    pub fn serving(&self) -> NodeId {
        self.serving
    }

    /// Channel-quality state.
    pub fn channel_quality(&self) -> &ChannelQualityTracker {
        &self.tracker
    }
}

impl RadioPhy for TerminalPhy {
    fn core(&self) -> &TimingCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TimingCore {
        &mut self.core
    }

    fn role(&self) -> PhyRole {
        PhyRole::Terminal
    }

    fn csi_rs_request(&mut self, timing: TimingInfo) -> Result<(), SimError> {
        self.tracker.book_occasion(self.core.carrier(), timing)
    }

    fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError> {
        let core_next = self.core.run(now)?;

        let latest = self.core.latest_sinr(self.serving);
        let ctx = self.core.timing();
        self.tracker.measure(&ctx, now, latest);
        if let Some((cqi, sinr_db)) = self.tracker.poll_report(now, latest) {
            debug!(node = %self.core.node_id(), cqi, ?sinr_db, "channel quality report");
            let labels = NodeLabels::new(self.core.node_id().to_string(), PhyRole::Terminal.as_str());
            metrics::gauge!(metric_defs::CSI_CQI.name, &labels.to_labels()).set(f64::from(cqi));
            self.core.deliver_channel_quality(ChannelQualityReport {
                peer: self.serving,
                cqi,
                sinr_db,
                time: now,
            });
        }

        Ok(earliest(core_next, Some(self.tracker.next_invoke_time(now))))
    }
}
