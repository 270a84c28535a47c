//! Block-error (CRC outcome) models.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rnsim_common::Packet;

/// Block-error rate applied when nothing else is configured.
pub const DEFAULT_BLOCK_ERROR_RATE: f64 = 0.1;

/// Decides whether a received transport block fails its CRC.
pub trait BlockErrorModel {
    /// Draw the CRC outcome for `packet`. `true` means the block failed.
    fn crc_failed(&mut self, packet: &Packet, sinr_db: f64) -> bool;
}

impl<M: BlockErrorModel + ?Sized> BlockErrorModel for Box<M> {
    fn crc_failed(&mut self, packet: &Packet, sinr_db: f64) -> bool {
        (**self).crc_failed(packet, sinr_db)
    }
}

/// Independent failures with a fixed probability.
#[derive(Debug, Clone)]
pub struct UniformBlockErrors {
    rate: f64,
    rng: ChaCha8Rng,
}

impl UniformBlockErrors {
    /// Failures with probability `rate` (clamped to [0, 1]), seeded.
    pub fn new(rate: f64, seed: u64) -> Self {
        UniformBlockErrors {
            rate: if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) },
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Failure probability.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl BlockErrorModel for UniformBlockErrors {
    fn crc_failed(&mut self, _packet: &Packet, _sinr_db: f64) -> bool {
        self.rng.gen::<f64>() < self.rate
    }
}

/// Fails blocks whose samples are dominated by saturated (blanked) values,
/// otherwise defers to an inner model.
///
/// A sample counts as saturated when its magnitude is at least 1.
pub struct SaturationAwareErrors<M> {
    inner: M,
    max_saturated_fraction: f64,
}

impl<M: BlockErrorModel> SaturationAwareErrors<M> {
    /// Wrap `inner`; blocks with more than `max_saturated_fraction` saturated samples fail.
    pub fn new(inner: M, max_saturated_fraction: f64) -> Self {
        SaturationAwareErrors { inner, max_saturated_fraction }
    }

    /// Fraction of samples with magnitude >= 1.
    pub fn saturated_fraction(packet: &Packet) -> f64 {
        if packet.samples.is_empty() {
            return 0.0;
        }
        let saturated = packet.samples.iter().filter(|s| s.norm() >= 1.0).count();
        saturated as f64 / packet.samples.len() as f64
    }
}

impl<M: BlockErrorModel> BlockErrorModel for SaturationAwareErrors<M> {
    fn crc_failed(&mut self, packet: &Packet, sinr_db: f64) -> bool {
        // Draw from the inner model regardless so the random stream does not
        // depend on the interference pattern.
        let inner_failed = self.inner.crc_failed(packet, sinr_db);
        Self::saturated_fraction(packet) > self.max_saturated_fraction || inner_failed
    }
}
