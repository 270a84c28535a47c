//! Carrier configuration and the numerology-derived time grid.

use rnsim_common::{Abstraction, ConfigError, SimTime};
use serde::{Deserialize, Serialize};

/// Symbols per slot (normal cyclic prefix).
pub const SYMBOLS_PER_SLOT: u32 = 14;

/// Frame duration.
pub const FRAME_DURATION: SimTime = SimTime::from_millis(10);

/// Subcarrier spacings supported, in kHz.
pub const SUPPORTED_SCS_KHZ: [u32; 5] = [15, 30, 60, 120, 240];

/// Antenna counts supported for both directions.
pub const SUPPORTED_ANTENNA_COUNTS: [usize; 6] = [1, 2, 4, 8, 16, 32];

/// Largest HARQ process count.
pub const MAX_HARQ_PROCESSES: u8 = 16;

/// Samples per slot at the 30.72 MHz reference rate for 15 kHz spacing.
const REFERENCE_SAMPLES_PER_SUBFRAME: u64 = 30_720;

/// Static radio configuration of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// Subcarrier spacing in kHz.
    pub subcarrier_spacing_khz: u32,
    /// Bandwidth in resource blocks.
    pub num_resource_blocks: u16,
    /// Transmit antennas.
    pub num_transmit_antennas: usize,
    /// Receive antennas.
    pub num_receive_antennas: usize,
    /// HARQ processes per peer.
    pub num_harq_processes: u8,
    /// Carrier centre frequency in Hz.
    pub center_frequency_hz: f64,
    /// Transmit power in dBm.
    pub tx_power_dbm: f64,
    /// Receiver noise figure in dB.
    pub noise_figure_db: f64,
    /// Whether packets carry IQ samples.
    pub full_phy: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        CarrierConfig {
            subcarrier_spacing_khz: 30,
            num_resource_blocks: 52,
            num_transmit_antennas: 1,
            num_receive_antennas: 1,
            num_harq_processes: MAX_HARQ_PROCESSES,
            center_frequency_hz: 3.5e9,
            tx_power_dbm: 23.0,
            noise_figure_db: 6.0,
            full_phy: false,
        }
    }
}

impl CarrierConfig {
    /// Check every parameter against the supported ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_SCS_KHZ.contains(&self.subcarrier_spacing_khz) {
            return Err(ConfigError::UnsupportedSubcarrierSpacing(self.subcarrier_spacing_khz));
        }
        if !(1..=275).contains(&self.num_resource_blocks) {
            return Err(ConfigError::ResourceBlocksOutOfRange(self.num_resource_blocks));
        }
        if !SUPPORTED_ANTENNA_COUNTS.contains(&self.num_transmit_antennas) {
            return Err(ConfigError::UnsupportedAntennaCount {
                direction: "transmit",
                count: self.num_transmit_antennas,
            });
        }
        if !SUPPORTED_ANTENNA_COUNTS.contains(&self.num_receive_antennas) {
            return Err(ConfigError::UnsupportedAntennaCount {
                direction: "receive",
                count: self.num_receive_antennas,
            });
        }
        if !(1..=MAX_HARQ_PROCESSES).contains(&self.num_harq_processes) {
            return Err(ConfigError::HarqProcessesOutOfRange(self.num_harq_processes));
        }
        if !self.center_frequency_hz.is_finite() || self.center_frequency_hz <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "center_frequency_hz",
                reason: format!("must be positive, got {}", self.center_frequency_hz),
            });
        }
        if !self.tx_power_dbm.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "tx_power_dbm",
                reason: "must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// A validated carrier with its precomputed time grid.
#[derive(Debug, Clone)]
pub struct Carrier {
    config: CarrierConfig,
    numerology: u32,
    slot_duration: SimTime,
    slots_per_frame: u32,
    symbol_ends: [SimTime; SYMBOLS_PER_SLOT as usize],
}

impl Carrier {
    /// Validate `config` and derive the slot/symbol grid.
    pub fn new(config: CarrierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let numerology = (config.subcarrier_spacing_khz / 15).trailing_zeros();
        let slot_duration = SimTime::from_nanos(1_000_000 >> numerology);
        Ok(Carrier {
            symbol_ends: symbol_end_times(numerology),
            numerology,
            slot_duration,
            slots_per_frame: 10 << numerology,
            config,
        })
    }

    /// The configuration this carrier was built from.
    pub fn config(&self) -> &CarrierConfig {
        &self.config
    }

    /// Numerology index (0 for 15 kHz, 1 for 30 kHz, ...).
    pub fn numerology(&self) -> u32 {
        self.numerology
    }

    /// Slot duration.
    pub fn slot_duration(&self) -> SimTime {
        self.slot_duration
    }

    /// Slots in a 10 ms frame.
    pub fn slots_per_frame(&self) -> u32 {
        self.slots_per_frame
    }

    /// Symbols in a frame.
    pub fn symbols_per_frame(&self) -> u32 {
        self.slots_per_frame * SYMBOLS_PER_SLOT
    }

    /// End time of every symbol, relative to the slot start.
    pub fn symbol_ends(&self) -> &[SimTime] {
        &self.symbol_ends
    }

    /// Start of `symbol` relative to the slot start.
    pub fn symbol_start_offset(&self, symbol: u32) -> SimTime {
        match symbol {
            0 => SimTime::ZERO,
            s => self.symbol_ends[(s as usize - 1).min(self.symbol_ends.len() - 1)],
        }
    }

    /// Duration of `num_symbols` symbols starting at `start_symbol` within a slot.
    pub fn span_duration(&self, start_symbol: u32, num_symbols: u32) -> SimTime {
        let last = (start_symbol + num_symbols).clamp(1, SYMBOLS_PER_SLOT) as usize - 1;
        self.symbol_ends[last] - self.symbol_start_offset(start_symbol)
    }

    /// Channel bandwidth in Hz (resource blocks x 12 subcarriers).
    pub fn bandwidth_hz(&self) -> f64 {
        f64::from(self.config.num_resource_blocks) * 12.0 * f64::from(self.config.subcarrier_spacing_khz) * 1e3
    }

    /// Thermal noise power over the channel bandwidth, including the noise figure.
    pub fn noise_power_dbm(&self) -> f64 {
        -174.0 + 10.0 * self.bandwidth_hz().log10() + self.config.noise_figure_db
    }

    /// FFT size: smallest power of two covering the occupied subcarriers at 85% use, at least 128.
    pub fn fft_size(&self) -> usize {
        let occupied = f64::from(self.config.num_resource_blocks) * 12.0 / 0.85;
        (occupied.ceil() as usize).next_power_of_two().max(128)
    }

    /// Baseband sample rate in Hz.
    pub fn sample_rate_hz(&self) -> f64 {
        self.fft_size() as f64 * f64::from(self.config.subcarrier_spacing_khz) * 1e3
    }

    /// Whether packets carry samples.
    pub fn abstraction(&self) -> Abstraction {
        if self.config.full_phy {
            Abstraction::Full
        } else {
            Abstraction::Abstract
        }
    }
}

/// Cyclic-prefix-aware symbol end times within one slot.
///
/// Lengths are counted in samples of the 30.72 MHz reference clock. Every
/// half subframe starts with a symbol carrying 16 extra samples; for spacings
/// above 30 kHz that extra length is spread so that each slot keeps its
/// nominal duration and the last end time equals the slot duration.
fn symbol_end_times(numerology: u32) -> [SimTime; SYMBOLS_PER_SLOT as usize] {
    let useful = 2048u64 >> numerology;
    let cyclic_prefix = 144u64 >> numerology;
    let slot_samples = REFERENCE_SAMPLES_PER_SUBFRAME >> numerology;
    let base = useful + cyclic_prefix;
    let extra = slot_samples - base * u64::from(SYMBOLS_PER_SLOT);

    let mut lengths = [base; SYMBOLS_PER_SLOT as usize];
    if numerology == 0 {
        lengths[0] += extra / 2;
        lengths[7] += extra / 2;
    } else {
        lengths[0] += extra;
    }

    let mut ends = [SimTime::ZERO; SYMBOLS_PER_SLOT as usize];
    let mut cumulative = 0u64;
    for (end, len) in ends.iter_mut().zip(lengths) {
        cumulative += len;
        // samples at 30.72 MHz -> ns, rounded
        *end = SimTime::from_nanos((cumulative * 3125 + 48) / 96);
    }
    ends
}
