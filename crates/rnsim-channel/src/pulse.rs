//! Periodic interferer pulse trains.

use rnsim_common::{ConfigError, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Parameters of an external periodic pulse train (e.g. a radar).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseTrainConfig {
    /// Pulse repetition frequency in Hz (the interval is its inverse).
    pub repetition_interval_hz: f64,
    /// Width of each pulse in seconds.
    pub pulse_width_seconds: f64,
    /// Start time of the first pulse in seconds.
    pub start_offset_seconds: f64,
}

impl PulseTrainConfig {
    /// Check the parameters describe a real, non-continuous pulse train.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.repetition_interval_hz.is_finite() || self.repetition_interval_hz <= 0.0 {
            return Err(ConfigError::InvalidPulseTrain(format!(
                "repetition frequency must be positive, got {} Hz",
                self.repetition_interval_hz
            )));
        }
        if !self.pulse_width_seconds.is_finite() || self.pulse_width_seconds <= 0.0 {
            return Err(ConfigError::InvalidPulseTrain(format!(
                "pulse width must be positive, got {} s",
                self.pulse_width_seconds
            )));
        }
        if self.pulse_width_seconds >= 1.0 / self.repetition_interval_hz {
            return Err(ConfigError::InvalidPulseTrain(format!(
                "pulse width {} s is not shorter than the repetition interval {} s",
                self.pulse_width_seconds,
                1.0 / self.repetition_interval_hz
            )));
        }
        if !self.start_offset_seconds.is_finite() || self.start_offset_seconds < 0.0 {
            return Err(ConfigError::InvalidPulseTrain(format!(
                "start offset must be non-negative, got {} s",
                self.start_offset_seconds
            )));
        }
        Ok(())
    }

    /// Repetition interval.
    pub fn repetition_interval(&self) -> SimTime {
        SimTime::from_secs(1.0 / self.repetition_interval_hz)
    }

    /// Pulse width.
    pub fn pulse_width(&self) -> SimTime {
        SimTime::from_secs(self.pulse_width_seconds)
    }

    /// First pulse start.
    pub fn start_offset(&self) -> SimTime {
        SimTime::from_secs(self.start_offset_seconds)
    }
}

/// Lazily generated pulse start times `t_k = offset + k * PRI`.
///
/// Pulses are produced on demand up to the latest horizon asked for. A pulse
/// that ends before the start of a queried window is dropped and never
/// produced again, so queries must arrive with non-decreasing window starts.
#[derive(Debug, Clone)]
pub struct PulseTrain {
    interval: SimTime,
    width: SimTime,
    offset: SimTime,
    next_index: u64,
    live: VecDeque<SimTime>,
}

impl PulseTrain {
    /// Build a train from validated parameters.
    pub fn new(config: &PulseTrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let interval = config.repetition_interval();
        if interval == SimTime::ZERO {
            return Err(ConfigError::InvalidPulseTrain(
                "repetition interval rounds to zero nanoseconds".to_string(),
            ));
        }
        Ok(PulseTrain {
            interval,
            width: config.pulse_width(),
            offset: config.start_offset(),
            next_index: 0,
            live: VecDeque::new(),
        })
    }

    /// Width of every pulse.
    pub fn pulse_width(&self) -> SimTime {
        self.width
    }

    /// Repetition interval.
    pub fn interval(&self) -> SimTime {
        self.interval
    }

    fn pulse_start(&self, k: u64) -> SimTime {
        SimTime(self.offset.0 + k * self.interval.0)
    }

    /// Extend the generated sequence to cover every pulse starting before `horizon`.
    fn generate_until(&mut self, horizon: SimTime) {
        loop {
            let t = self.pulse_start(self.next_index);
            if t >= horizon {
                break;
            }
            self.live.push_back(t);
            self.next_index += 1;
        }
    }

    /// Start times of every pulse overlapping `[start, end)`, ascending.
    pub fn overlapping(&mut self, start: SimTime, end: SimTime) -> Vec<SimTime> {
        self.generate_until(end);
        while let Some(&front) = self.live.front() {
            if front + self.width <= start {
                self.live.pop_front();
            } else {
                break;
            }
        }
        self.live
            .iter()
            .copied()
            .filter(|&t| t < end && t + self.width > start)
            .collect()
    }

    /// Number of pulses generated so far.
    pub fn generated(&self) -> u64 {
        self.next_index
    }
}
