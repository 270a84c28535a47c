//! Error types shared by every simulator crate.

use crate::{NodeId, SimTime};
use thiserror::Error;

/// Invalid static configuration. Raised at construction time and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Subcarrier spacing is not a supported numerology.
    #[error("Unsupported subcarrier spacing {0} kHz (expected 15, 30, 60, 120 or 240)")]
    UnsupportedSubcarrierSpacing(u32),

    /// Resource-block count outside [1, 275].
    #[error("Resource block count {0} out of range (1-275)")]
    ResourceBlocksOutOfRange(u16),

    /// Antenna count not in the supported set.
    #[error("Unsupported {direction} antenna count {count} (expected 1, 2, 4, 8, 16 or 32)")]
    UnsupportedAntennaCount {
        /// "transmit" or "receive".
        direction: &'static str,
        /// Requested count.
        count: usize,
    },

    /// Transmit and receive antenna counts disagree where they must match.
    #[error("Antenna count mismatch: {transmit} transmit vs {receive} receive")]
    AntennaMismatch {
        /// Transmit antennas.
        transmit: usize,
        /// Receive antennas.
        receive: usize,
    },

    /// HARQ process count outside [1, 16].
    #[error("HARQ process count {0} out of range (1-16)")]
    HarqProcessesOutOfRange(u8),

    /// Invalid pulse-train parameters.
    #[error("Invalid pulse train: {0}")]
    InvalidPulseTrain(String),

    /// Any other invalid parameter.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// An upper layer referenced a slot or symbol that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingViolation {
    /// Symbol index outside the slot or frame.
    #[error("Symbol {symbol} out of range (limit {limit})")]
    SymbolOutOfRange {
        /// Offending symbol index.
        symbol: u32,
        /// Exclusive upper bound.
        limit: u32,
    },

    /// Slot index outside the frame.
    #[error("Slot {slot} out of range ({slots_per_frame} slots per frame)")]
    SlotOutOfRange {
        /// Offending slot.
        slot: u32,
        /// Slots per frame.
        slots_per_frame: u32,
    },

    /// A descriptor runs past the end of its slot.
    #[error("Allocation of {num_symbols} symbols from symbol {start_symbol} crosses the slot boundary")]
    CrossesSlotBoundary {
        /// First symbol.
        start_symbol: u32,
        /// Symbol count.
        num_symbols: u32,
    },

    /// The slot in the timing information does not match its timestamp.
    #[error("Timing info slot {claimed} does not match slot {actual} at {timestamp}")]
    SlotMismatch {
        /// Slot stated by the caller.
        claimed: u32,
        /// Slot derived from the timestamp.
        actual: u32,
        /// Timestamp supplied.
        timestamp: SimTime,
    },
}

/// Errors that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Upper-layer timing bug.
    #[error("Timing violation: {0}")]
    Timing(#[from] TimingViolation),

    /// A retransmission was requested for a HARQ process that holds nothing.
    #[error("HARQ process {harq_id} for peer {peer} has no buffered transport block")]
    EmptyHarqProcess {
        /// Peer the process belongs to.
        peer: NodeId,
        /// Process id.
        harq_id: u8,
    },

    /// HARQ process id outside the configured range.
    #[error("HARQ process {harq_id} out of range ({num_processes} configured)")]
    HarqProcessOutOfRange {
        /// Process id.
        harq_id: u8,
        /// Configured process count.
        num_processes: u8,
    },

    /// Two nodes share an id.
    #[error("Duplicate node id {0}")]
    DuplicateNode(NodeId),

    /// Packets kept being transmitted at the same instant.
    #[error("No convergence at {time}: {iterations} same-instant iterations")]
    NoConvergence {
        /// Simulation time at which the loop stalled.
        time: SimTime,
        /// Iterations performed at that time.
        iterations: u32,
    },

    /// An action callback failed.
    #[error("Action {action_id} failed: {reason}")]
    Action {
        /// Failing action.
        action_id: u64,
        /// Failure description.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err: SimError = ConfigError::UnsupportedSubcarrierSpacing(45).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unsupported subcarrier spacing 45 kHz (expected 15, 30, 60, 120 or 240)"
        );

        let err: SimError = TimingViolation::SymbolOutOfRange { symbol: 14, limit: 14 }.into();
        assert!(matches!(err, SimError::Timing(_)));
    }
}
