//! Mapping absolute time onto frame/slot/symbol, and the descriptors upper
//! layers use to book transmissions and receptions.

use crate::carrier::{Carrier, FRAME_DURATION, SYMBOLS_PER_SLOT};
use rnsim_common::{NodeId, SimTime, TimingViolation};

/// Where `now` falls in the frame structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingContext {
    /// Absolute frame number, `floor(t / 10 ms)`.
    pub frame: u64,
    /// Slot within the frame.
    pub slot: u32,
    /// Symbol within the slot.
    pub symbol: u32,
    /// Absolute start time of the slot.
    pub slot_start: SimTime,
}

impl TimingContext {
    /// Locate `now` on `carrier`'s grid.
    pub fn at(carrier: &Carrier, now: SimTime) -> Self {
        let slot_ns = carrier.slot_duration().as_nanos();
        let slot_index = now.as_nanos() / slot_ns;
        let slot_start = SimTime::from_nanos(slot_index * slot_ns);
        let elapsed = now - slot_start;
        let symbol = carrier
            .symbol_ends()
            .iter()
            .position(|end| *end > elapsed)
            .unwrap_or(SYMBOLS_PER_SLOT as usize - 1) as u32;
        TimingContext {
            frame: now.as_nanos() / FRAME_DURATION.as_nanos(),
            slot: (slot_index % u64::from(carrier.slots_per_frame())) as u32,
            symbol,
            slot_start,
        }
    }

    /// Symbol index within the frame.
    pub fn symbol_in_frame(&self) -> u32 {
        self.slot * SYMBOLS_PER_SLOT + self.symbol
    }

    /// True when `now` is exactly the first instant of the slot.
    pub fn is_slot_start(&self, now: SimTime) -> bool {
        now == self.slot_start
    }
}

/// Slot and symbol an upper layer refers to, plus the time it made the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingInfo {
    /// Slot within the frame.
    pub slot: u32,
    /// First symbol within the slot.
    pub symbol: u32,
    /// Any instant inside the referenced slot.
    pub timestamp: SimTime,
}

impl TimingInfo {
    /// Timing info for the slot containing `now`, starting at `symbol`.
    pub fn for_slot(carrier: &Carrier, now: SimTime, symbol: u32) -> Self {
        let ctx = TimingContext::at(carrier, now);
        TimingInfo { slot: ctx.slot, symbol, timestamp: now }
    }
}

/// A transmission booked by the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxDescriptor {
    /// Receiving peer.
    pub peer: NodeId,
    /// HARQ process.
    pub harq_id: u8,
    /// First symbol within the slot.
    pub start_symbol: u32,
    /// Number of symbols occupied.
    pub num_symbols: u32,
}

/// A reception booked by the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxDescriptor {
    /// Transmitting peer.
    pub peer: NodeId,
    /// HARQ process.
    pub harq_id: u8,
    /// Expected transport-block size in bytes.
    pub tbs: usize,
    /// Number of symbols occupied.
    pub num_symbols: u32,
}

/// Check a symbol span against the slot.
pub(crate) fn check_span(start_symbol: u32, num_symbols: u32) -> Result<(), TimingViolation> {
    if start_symbol >= SYMBOLS_PER_SLOT {
        return Err(TimingViolation::SymbolOutOfRange { symbol: start_symbol, limit: SYMBOLS_PER_SLOT });
    }
    if num_symbols == 0 || start_symbol + num_symbols > SYMBOLS_PER_SLOT {
        return Err(TimingViolation::CrossesSlotBoundary { start_symbol, num_symbols });
    }
    Ok(())
}

/// A reception resolved when its end symbol has passed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRx {
    pub descriptor: RxDescriptor,
    pub start_symbol_in_frame: u32,
    pub start_time: SimTime,
    pub end_time: SimTime,
}

impl PendingRx {
    /// Validate `info` against `carrier` and work out the absolute window.
    ///
    /// Returns the pending entry and the symbol-within-frame it ends on.
    pub fn resolve(
        carrier: &Carrier,
        descriptor: RxDescriptor,
        info: TimingInfo,
    ) -> Result<(Self, u32), TimingViolation> {
        if info.slot >= carrier.slots_per_frame() {
            return Err(TimingViolation::SlotOutOfRange {
                slot: info.slot,
                slots_per_frame: carrier.slots_per_frame(),
            });
        }
        check_span(info.symbol, descriptor.num_symbols)?;

        let ctx = TimingContext::at(carrier, info.timestamp);
        if ctx.slot != info.slot {
            return Err(TimingViolation::SlotMismatch {
                claimed: info.slot,
                actual: ctx.slot,
                timestamp: info.timestamp,
            });
        }

        let base = info.slot * SYMBOLS_PER_SLOT;
        let last_symbol = info.symbol + descriptor.num_symbols - 1;
        let pending = PendingRx {
            descriptor,
            start_symbol_in_frame: base + info.symbol,
            start_time: ctx.slot_start + carrier.symbol_start_offset(info.symbol),
            end_time: ctx.slot_start + carrier.symbol_ends()[last_symbol as usize],
        };
        Ok((pending, base + last_symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierConfig;

    fn carrier(scs: u32) -> Carrier {
        Carrier::new(CarrierConfig { subcarrier_spacing_khz: scs, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_context_at_frame_start() {
        let ctx = TimingContext::at(&carrier(30), SimTime::ZERO);
        assert_eq!((ctx.frame, ctx.slot, ctx.symbol), (0, 0, 0));
        assert!(ctx.is_slot_start(SimTime::ZERO));
    }

    #[test]
    fn test_symbol_boundary_belongs_to_next_symbol() {
        let c = carrier(30);
        let end0 = c.symbol_ends()[0];
        assert_eq!(TimingContext::at(&c, end0 - SimTime::from_nanos(1)).symbol, 0);
        assert_eq!(TimingContext::at(&c, end0).symbol, 1);
    }

    #[test]
    fn test_slot_and_frame_wrap() {
        let c = carrier(30);
        // 10.75 ms: frame 1, slot 1 (0.75 ms into the frame), symbol 7 or so.
        let ctx = TimingContext::at(&c, SimTime::from_micros(10_750));
        assert_eq!(ctx.frame, 1);
        assert_eq!(ctx.slot, 1);
        assert_eq!(ctx.slot_start, SimTime::from_micros(10_500));
        assert_eq!(ctx.symbol_in_frame(), 14 + ctx.symbol);

        let last = TimingContext::at(&c, SimTime::from_millis(10) - SimTime::from_nanos(1));
        assert_eq!((last.frame, last.slot, last.symbol), (0, 19, 13));
    }

    #[test]
    fn test_symbol_per_numerology() {
        for (scs, slots) in [(15, 10), (30, 20), (60, 40), (120, 80), (240, 160)] {
            let c = carrier(scs);
            assert_eq!(c.slots_per_frame(), slots);
            let mid = c.symbol_start_offset(5) + SimTime::from_nanos(1);
            assert_eq!(TimingContext::at(&c, mid).symbol, 5, "scs={}", scs);
        }
    }

    #[test]
    fn test_span_checks() {
        assert!(check_span(0, 14).is_ok());
        assert_eq!(
            check_span(14, 1),
            Err(TimingViolation::SymbolOutOfRange { symbol: 14, limit: 14 })
        );
        assert_eq!(
            check_span(10, 5),
            Err(TimingViolation::CrossesSlotBoundary { start_symbol: 10, num_symbols: 5 })
        );
        assert!(check_span(3, 0).is_err());
    }

    #[test]
    fn test_pending_rx_window() {
        let c = carrier(30);
        let desc = RxDescriptor { peer: NodeId(1), harq_id: 0, tbs: 100, num_symbols: 14 };
        let info = TimingInfo { slot: 2, symbol: 0, timestamp: SimTime::from_micros(1_000) };
        let (pending, end_symbol) = PendingRx::resolve(&c, desc, info).unwrap();
        assert_eq!(pending.start_time, SimTime::from_micros(1_000));
        assert_eq!(pending.end_time, SimTime::from_micros(1_500));
        assert_eq!(pending.start_symbol_in_frame, 28);
        assert_eq!(end_symbol, 41);
    }

    #[test]
    fn test_pending_rx_rejects_bad_timing() {
        let c = carrier(30);
        let desc = RxDescriptor { peer: NodeId(1), harq_id: 0, tbs: 100, num_symbols: 2 };

        let out_of_frame = TimingInfo { slot: 20, symbol: 0, timestamp: SimTime::ZERO };
        assert!(matches!(
            PendingRx::resolve(&c, desc, out_of_frame),
            Err(TimingViolation::SlotOutOfRange { slot: 20, slots_per_frame: 20 })
        ));

        let mismatch = TimingInfo { slot: 3, symbol: 0, timestamp: SimTime::ZERO };
        assert!(matches!(
            PendingRx::resolve(&c, desc, mismatch),
            Err(TimingViolation::SlotMismatch { claimed: 3, actual: 0, .. })
        ));

        let past_end = TimingInfo { slot: 0, symbol: 13, timestamp: SimTime::ZERO };
        assert!(matches!(
            PendingRx::resolve(&c, desc, past_end),
            Err(TimingViolation::CrossesSlotBoundary { .. })
        ));
    }
}
