//! Channel-quality indicator reporting for terminals.

use crate::carrier::{Carrier, SYMBOLS_PER_SLOT};
use crate::timing::{check_span, TimingContext, TimingInfo};
use rnsim_common::{ConfigError, SimError, SimTime, TimingViolation};
use serde::{Deserialize, Serialize};

/// Lowest SINR (dB) at which each CQI from 1 to 15 is reported.
pub const CQI_SINR_THRESHOLDS_DB: [f64; 15] = [
    -6.7, -4.7, -2.3, 0.2, 2.4, 4.3, 5.9, 8.1, 10.3, 11.7, 14.1, 16.3, 18.7, 21.0, 22.7,
];

/// Highest CQI value.
pub const MAX_CQI: u8 = 15;

/// Map an SINR to a CQI (0 = out of range).
pub fn cqi_from_sinr(sinr_db: f64) -> u8 {
    CQI_SINR_THRESHOLDS_DB.iter().take_while(|t| sinr_db >= **t).count() as u8
}

/// Periodic channel-quality reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsiReportConfig {
    /// CQI reported until something has been measured.
    pub initial_cqi: u8,
    /// Reporting period in slots.
    pub period_slots: u32,
}

impl Default for CsiReportConfig {
    fn default() -> Self {
        CsiReportConfig { initial_cqi: 7, period_slots: 10 }
    }
}

impl CsiReportConfig {
    /// Check the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_cqi > MAX_CQI {
            return Err(ConfigError::InvalidParameter {
                name: "initial_cqi",
                reason: format!("{} exceeds {}", self.initial_cqi, MAX_CQI),
            });
        }
        if self.period_slots == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "period_slots",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks measurements and decides when the next CQI report is due.
///
/// Measurements come from CSI-RS occasions booked per symbol. An occasion is
/// measured once its symbol has passed, using the SINR the PHY last saw. When
/// no occasion has been booked the tracker falls back to that latest SINR at
/// report time.
#[derive(Debug, Clone)]
pub struct ChannelQualityTracker {
    period: SimTime,
    next_report: SimTime,
    cqi: u8,
    measured_sinr: Option<f64>,
    occasions: Vec<Option<SimTime>>,
    reports: u64,
}

impl ChannelQualityTracker {
    /// Tracker for `carrier`. The first report is due one period after time zero.
    pub fn new(config: &CsiReportConfig, carrier: &Carrier) -> Result<Self, ConfigError> {
        config.validate()?;
        let period = SimTime::from_nanos(carrier.slot_duration().as_nanos() * u64::from(config.period_slots));
        Ok(ChannelQualityTracker {
            period,
            next_report: period,
            cqi: config.initial_cqi,
            measured_sinr: None,
            occasions: vec![None; carrier.symbols_per_frame() as usize],
            reports: 0,
        })
    }

    /// CQI that would be reported now.
    pub fn cqi(&self) -> u8 {
        self.cqi
    }

    /// Reporting period.
    pub fn period(&self) -> SimTime {
        self.period
    }

    /// Time of the next report.
    pub fn next_report(&self) -> SimTime {
        self.next_report
    }

    /// Reports produced so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Book a measurement occasion on one symbol.
    pub fn book_occasion(&mut self, carrier: &Carrier, info: TimingInfo) -> Result<(), SimError> {
        if info.slot >= carrier.slots_per_frame() {
            return Err(TimingViolation::SlotOutOfRange {
                slot: info.slot,
                slots_per_frame: carrier.slots_per_frame(),
            }
            .into());
        }
        check_span(info.symbol, 1)?;
        let ctx = TimingContext::at(carrier, info.timestamp);
        if ctx.slot != info.slot {
            return Err(TimingViolation::SlotMismatch {
                claimed: info.slot,
                actual: ctx.slot,
                timestamp: info.timestamp,
            }
            .into());
        }
        let index = (info.slot * SYMBOLS_PER_SLOT + info.symbol) as usize;
        self.occasions[index] = Some(ctx.slot_start + carrier.symbol_ends()[info.symbol as usize]);
        Ok(())
    }

    /// Measure any occasion that ended on the symbol before `ctx`.
    pub fn measure(&mut self, ctx: &TimingContext, now: SimTime, latest_sinr: Option<f64>) {
        let total = self.occasions.len();
        let previous = (ctx.symbol_in_frame() as usize + total - 1) % total;
        if let Some(end) = self.occasions[previous] {
            if end <= now {
                self.occasions[previous] = None;
                if latest_sinr.is_some() {
                    self.measured_sinr = latest_sinr;
                }
            }
        }
    }

    /// If a report is due at `now`, update the CQI and return it with the SINR it came from.
    pub fn poll_report(&mut self, now: SimTime, latest_sinr: Option<f64>) -> Option<(u8, Option<f64>)> {
        if now < self.next_report {
            return None;
        }
        while self.next_report <= now {
            self.next_report += self.period;
        }
        let sinr = self.measured_sinr.take().or(latest_sinr);
        if let Some(sinr) = sinr {
            self.cqi = cqi_from_sinr(sinr);
        }
        self.reports += 1;
        Some((self.cqi, sinr))
    }

    /// Earliest time the tracker needs to run again after `now`.
    pub fn next_invoke_time(&self, now: SimTime) -> SimTime {
        self.occasions
            .iter()
            .flatten()
            .copied()
            .filter(|t| *t > now)
            .fold(self.next_report, SimTime::min)
    }
}
