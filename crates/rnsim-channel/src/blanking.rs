//! Pulse blanking: a high-power external interferer saturating the receiver.

use crate::{ChannelModel, FreeSpaceChannel, PulseTrain, PulseTrainConfig};
use rnsim_common::{Abstraction, Complex64, ConfigError, Packet, ReceiverInfo, SimTime};
use std::ops::Range;
use tracing::trace;

/// Value written over every blanked sample.
pub const BLANKING_VALUE: Complex64 = Complex64::new(1.0, 0.0);

/// Samples overwritten by one pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlankedRange {
    /// Start time of the pulse responsible.
    pub pulse_start: SimTime,
    /// Sample indices overwritten.
    pub samples: Range<usize>,
}

fn to_samples(offset: SimTime, sample_period_ns: f64) -> usize {
    (offset.as_nanos() as f64 / sample_period_ns).round() as usize
}

/// Overwrite the samples of a packet window `[start, start + duration)` that
/// coincide with `pulses`, each `width` long.
///
/// Two cases per pulse, and any mix of them across pulses:
/// - the pulse head lies inside the window: blank from the head's sample index
///   for the pulse width, clamped to the buffer;
/// - only the tail lies inside: blank from sample 0 for the overlap.
///
/// Returns the ranges written, in pulse order.
pub fn blank_samples(
    samples: &mut [Complex64],
    start: SimTime,
    duration: SimTime,
    pulses: &[SimTime],
    width: SimTime,
) -> Vec<BlankedRange> {
    let n = samples.len();
    if n == 0 || duration == SimTime::ZERO {
        return Vec::new();
    }
    let end = start + duration;
    let sample_period_ns = duration.as_nanos() as f64 / n as f64;
    let width_samples = to_samples(width, sample_period_ns);

    let mut blanked = Vec::new();
    for &pulse in pulses {
        let pulse_end = pulse + width;
        if pulse >= end || pulse_end <= start {
            continue;
        }
        let range = if pulse >= start {
            let first = to_samples(pulse - start, sample_period_ns);
            first.min(n)..(first + width_samples).min(n)
        } else {
            let overlap = pulse_end.min(end) - start;
            0..to_samples(overlap, sample_period_ns).min(n)
        };
        if range.is_empty() {
            continue;
        }
        samples[range.clone()].fill(BLANKING_VALUE);
        blanked.push(BlankedRange { pulse_start: pulse, samples: range });
    }
    blanked
}

/// Blanks samples hit by a periodic pulse train, after an inner channel.
///
/// The pulse-train parameters are fixed at construction.
#[derive(Debug, Clone)]
pub struct PulseBlankingChannel<C = FreeSpaceChannel> {
    inner: C,
    train: PulseTrain,
}

impl<C: ChannelModel> PulseBlankingChannel<C> {
    /// Wrap `inner` with the pulse train described by `config`.
    pub fn new(inner: C, config: &PulseTrainConfig) -> Result<Self, ConfigError> {
        Ok(PulseBlankingChannel {
            inner,
            train: PulseTrain::new(config)?,
        })
    }

    /// The wrapped channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The pulse train.
    pub fn train(&self) -> &PulseTrain {
        &self.train
    }
}

impl<C: ChannelModel> ChannelModel for PulseBlankingChannel<C> {
    fn name(&self) -> &str {
        "pulse-blanking"
    }

    fn is_relevant(&self, receiver: &ReceiverInfo, packet: &Packet) -> bool {
        self.inner.is_relevant(receiver, packet)
    }

    fn impair(&mut self, receiver: &ReceiverInfo, packet: &Packet) -> Packet {
        let mut out = self.inner.impair(receiver, packet);
        if out.abstraction != Abstraction::Full || out.samples.is_empty() {
            return out;
        }
        let pulses = self.train.overlapping(out.start_time, out.end_time());
        let width = self.train.pulse_width();
        let blanked = blank_samples(&mut out.samples, out.start_time, out.duration, &pulses, width);
        if !blanked.is_empty() {
            trace!(
                "pulse blanking {} -> {}: {} pulse(s), ranges {:?}",
                packet.transmitter_id,
                receiver.id,
                blanked.len(),
                blanked.iter().map(|b| b.samples.clone()).collect::<Vec<_>>()
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{receiver_at, sampled_packet};
    use crate::IdentityChannel;
    use rnsim_common::Vec3;

    fn radar(start_offset_seconds: f64, repetition_interval_hz: f64) -> PulseTrainConfig {
        PulseTrainConfig {
            repetition_interval_hz,
            pulse_width_seconds: 40e-6,
            start_offset_seconds,
        }
    }

    fn blanked_indices(samples: &[Complex64]) -> Vec<usize> {
        samples
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == BLANKING_VALUE)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_pulse_head_inside_packet() {
        let mut channel = PulseBlankingChannel::new(IdentityChannel, &radar(200e-6, 1000.0)).unwrap();
        let packet = sampled_packet(SimTime::ZERO, SimTime::from_millis(1), 1000);
        let out = channel.impair(&receiver_at(Vec3::ZERO), &packet);

        assert_eq!(blanked_indices(&out.samples), (200..240).collect::<Vec<_>>());
        assert!(out.samples[200..240].iter().all(|s| s.norm() == 1.0));
        assert_eq!(out.samples[199], packet.samples[199]);
        assert_eq!(out.samples[240], packet.samples[240]);
    }

    #[test]
    fn test_pulse_tail_only_inside_packet() {
        // The pulse starts 20us before the packet and lasts 40us.
        let mut channel = PulseBlankingChannel::new(IdentityChannel, &radar(0.0, 100.0)).unwrap();
        let packet = sampled_packet(SimTime::from_micros(20), SimTime::from_millis(1), 1000);
        let out = channel.impair(&receiver_at(Vec3::ZERO), &packet);

        assert_eq!(blanked_indices(&out.samples), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_overlapping_pulse_is_blanked() {
        // Tail of the pulse at 0, heads of the pulses at 250, 500 and 750us.
        let mut samples = vec![Complex64::new(0.0, 0.0); 1000];
        let pulses = [0, 250, 500, 750, 1000].map(SimTime::from_micros);
        let ranges = blank_samples(
            &mut samples,
            SimTime::from_micros(10),
            SimTime::from_millis(1),
            &pulses,
            SimTime::from_micros(40),
        );
        let ranges: Vec<_> = ranges.into_iter().map(|r| r.samples).collect();
        assert_eq!(ranges, vec![0..30, 240..280, 490..530, 740..780, 990..1000]);
        assert_eq!(blanked_indices(&samples).len(), 30 + 40 + 40 + 40 + 10);
    }

    #[test]
    fn test_head_is_clamped_to_packet_end() {
        let mut samples = vec![Complex64::new(0.0, 0.0); 100];
        let ranges = blank_samples(
            &mut samples,
            SimTime::ZERO,
            SimTime::from_micros(100),
            &[SimTime::from_micros(90)],
            SimTime::from_micros(40),
        );
        assert_eq!(ranges[0].samples, 90..100);
    }

    #[test]
    fn test_blanking_is_deterministic() {
        let config = radar(200e-6, 1000.0);
        let packet = sampled_packet(SimTime::ZERO, SimTime::from_millis(3), 3000);
        let receiver = receiver_at(Vec3::new(10.0, 0.0, 0.0));

        let mut a = PulseBlankingChannel::new(FreeSpaceChannel::new(), &config).unwrap();
        let mut b = PulseBlankingChannel::new(FreeSpaceChannel::new(), &config).unwrap();
        let first = a.impair(&receiver, &packet);
        let again = a.impair(&receiver, &packet);
        let other = b.impair(&receiver, &packet);

        assert_eq!(first.samples, again.samples);
        assert_eq!(first.samples, other.samples);
        assert_eq!(blanked_indices(&first.samples).len(), 3 * 40);
    }

    #[test]
    fn test_abstract_packets_are_not_blanked() {
        let mut channel = PulseBlankingChannel::new(IdentityChannel, &radar(200e-6, 1000.0)).unwrap();
        let mut packet = sampled_packet(SimTime::ZERO, SimTime::from_millis(1), 0);
        packet.abstraction = Abstraction::Abstract;
        let out = channel.impair(&receiver_at(Vec3::ZERO), &packet);
        assert_eq!(out, packet);
    }

    #[test]
    fn test_invalid_train_is_rejected() {
        let config = PulseTrainConfig {
            repetition_interval_hz: -5.0,
            pulse_width_seconds: 1e-6,
            start_offset_seconds: 0.0,
        };
        assert!(PulseBlankingChannel::new(IdentityChannel, &config).is_err());
    }
}
