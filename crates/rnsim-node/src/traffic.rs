//! Traffic sources feeding the RLC.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use rnsim_common::{ConfigError, SimTime};
use serde::{Deserialize, Serialize};

/// Produces application packets over time.
pub trait TrafficSource {
    /// Packets generated at or before `now` that have not been returned yet.
    fn run(&mut self, now: SimTime) -> Vec<Vec<u8>>;

    /// Time of the next packet, or `None` when the source is exhausted.
    fn next_time(&self) -> Option<SimTime>;

    /// Packets generated so far.
    fn generated(&self) -> u64;
}

/// Packet body: a little-endian sequence number padded to `size` bytes.
fn make_packet(sequence: u64, size: usize) -> Vec<u8> {
    let mut packet = sequence.to_le_bytes().to_vec();
    packet.resize(size.max(8), 0xA5);
    packet
}

/// One packet every `interval`.
#[derive(Debug, Clone)]
pub struct FixedIntervalTraffic {
    interval: SimTime,
    packet_size: usize,
    next: SimTime,
    generated: u64,
}

impl FixedIntervalTraffic {
    /// First packet at `start`, then every `interval`.
    pub fn new(interval: SimTime, packet_size: usize, start: SimTime) -> Result<Self, ConfigError> {
        if interval == SimTime::ZERO {
            return Err(ConfigError::InvalidParameter {
                name: "interval",
                reason: "must be positive".to_string(),
            });
        }
        Ok(FixedIntervalTraffic { interval, packet_size, next: start, generated: 0 })
    }
}

impl TrafficSource for FixedIntervalTraffic {
    fn run(&mut self, now: SimTime) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while self.next <= now {
            out.push(make_packet(self.generated, self.packet_size));
            self.generated += 1;
            self.next += self.interval;
        }
        out
    }

    fn next_time(&self) -> Option<SimTime> {
        Some(self.next)
    }

    fn generated(&self) -> u64 {
        self.generated
    }
}

/// Packets with exponentially distributed inter-arrival times.
#[derive(Debug, Clone)]
pub struct PoissonTraffic {
    gaps: Exp<f64>,
    rng: ChaCha8Rng,
    packet_size: usize,
    next: SimTime,
    generated: u64,
}

impl PoissonTraffic {
    /// `rate_pps` packets per second on average, seeded.
    pub fn new(rate_pps: f64, packet_size: usize, seed: u64) -> Result<Self, ConfigError> {
        let gaps = Exp::new(rate_pps).map_err(|e| ConfigError::InvalidParameter {
            name: "rate_pps",
            reason: e.to_string(),
        })?;
        if !rate_pps.is_finite() || rate_pps <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "rate_pps",
                reason: format!("must be positive, got {}", rate_pps),
            });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let next = SimTime::from_secs(gaps.sample(&mut rng));
        Ok(PoissonTraffic { gaps, rng, packet_size, next, generated: 0 })
    }
}

impl TrafficSource for PoissonTraffic {
    fn run(&mut self, now: SimTime) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while self.next <= now {
            out.push(make_packet(self.generated, self.packet_size));
            self.generated += 1;
            let gap = SimTime::from_secs(self.gaps.sample(&mut self.rng));
            self.next += gap;
        }
        out
    }

    fn next_time(&self) -> Option<SimTime> {
        Some(self.next)
    }

    fn generated(&self) -> u64 {
        self.generated
    }
}

/// Traffic description as found in scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrafficConfig {
    /// Constant bit rate.
    FixedInterval {
        /// Gap between packets in milliseconds.
        interval_ms: f64,
        /// Packet size in bytes.
        packet_size: usize,
        /// First packet time in milliseconds.
        #[serde(default)]
        start_ms: f64,
    },
    /// Poisson arrivals.
    Poisson {
        /// Mean packets per second.
        rate_pps: f64,
        /// Packet size in bytes.
        packet_size: usize,
    },
}

impl TrafficConfig {
    /// Build the source. `seed` is only used by random sources.
    pub fn build(&self, seed: u64) -> Result<Box<dyn TrafficSource>, ConfigError> {
        Ok(match self {
            TrafficConfig::FixedInterval { interval_ms, packet_size, start_ms } => Box::new(
                FixedIntervalTraffic::new(
                    SimTime::from_secs(interval_ms / 1e3),
                    *packet_size,
                    SimTime::from_secs(start_ms / 1e3),
                )?,
            ),
            TrafficConfig::Poisson { rate_pps, packet_size } => {
                Box::new(PoissonTraffic::new(*rate_pps, *packet_size, seed)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_catches_up() {
        let mut t = FixedIntervalTraffic::new(SimTime::from_millis(1), 32, SimTime::ZERO).unwrap();
        assert_eq!(t.run(SimTime::ZERO).len(), 1);
        assert_eq!(t.next_time(), Some(SimTime::from_millis(1)));
        let burst = t.run(SimTime::from_micros(3_500));
        assert_eq!(burst.len(), 3);
        assert_eq!(burst[0].len(), 32);
        assert_eq!(&burst[2][..8], &3u64.to_le_bytes());
        assert_eq!(t.generated(), 4);
    }

    #[test]
    fn test_fixed_interval_rejects_zero() {
        assert!(FixedIntervalTraffic::new(SimTime::ZERO, 10, SimTime::ZERO).is_err());
    }

    #[test]
    fn test_small_packets_keep_sequence() {
        assert_eq!(make_packet(5, 2), 5u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_poisson_mean_rate() {
        let mut t = PoissonTraffic::new(1000.0, 16, 3).unwrap();
        let count = t.run(SimTime::from_secs(10.0)).len() as f64;
        // 10_000 expected, sd 100
        assert!((count - 10_000.0).abs() < 500.0, "count={}", count);
    }

    #[test]
    fn test_poisson_is_seeded() {
        let mut a = PoissonTraffic::new(200.0, 16, 9).unwrap();
        let mut b = PoissonTraffic::new(200.0, 16, 9).unwrap();
        a.run(SimTime::from_millis(100));
        b.run(SimTime::from_millis(100));
        assert_eq!(a.next_time(), b.next_time());
        assert_eq!(a.generated(), b.generated());
    }

    #[test]
    fn test_poisson_rejects_bad_rate() {
        assert!(PoissonTraffic::new(0.0, 16, 1).is_err());
        assert!(PoissonTraffic::new(-1.0, 16, 1).is_err());
    }

    #[test]
    fn test_config_from_yaml_shape() {
        let config = TrafficConfig::FixedInterval { interval_ms: 0.5, packet_size: 100, start_ms: 0.0 };
        let mut source = config.build(0).unwrap();
        assert_eq!(source.run(SimTime::from_millis(1)).len(), 3);
    }
}
