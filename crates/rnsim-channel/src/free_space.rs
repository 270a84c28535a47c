//! Free-space propagation.

use crate::ChannelModel;
use rnsim_common::{Abstraction, Packet, ReceiverInfo, SPEED_OF_LIGHT};
use std::f64::consts::PI;
use tracing::trace;

/// Free-space path loss in dB for a link of `distance_m` at `frequency_hz`.
///
/// Returns 0 dB inside the reference distance where `4πd/λ < 1`, so
/// co-located nodes never see gain.
pub fn free_space_path_loss_db(distance_m: f64, frequency_hz: f64) -> f64 {
    if distance_m <= 0.0 || frequency_hz <= 0.0 {
        return 0.0;
    }
    let wavelength = SPEED_OF_LIGHT / frequency_hz;
    let ratio = 4.0 * PI * distance_m / wavelength;
    if ratio <= 1.0 {
        0.0
    } else {
        20.0 * ratio.log10()
    }
}

/// Applies free-space path loss to power and, for sampled packets, amplitude.
#[derive(Debug, Clone, Default)]
pub struct FreeSpaceChannel;

impl FreeSpaceChannel {
    /// Create the channel.
    pub fn new() -> Self {
        FreeSpaceChannel
    }
}

impl ChannelModel for FreeSpaceChannel {
    fn name(&self) -> &str {
        "free-space"
    }

    fn impair(&mut self, receiver: &ReceiverInfo, packet: &Packet) -> Packet {
        let distance = packet.transmitter_position.distance_to(&receiver.position);
        let loss_db = free_space_path_loss_db(distance, packet.center_frequency_hz);
        let mut out = packet.clone();
        out.power_dbm -= loss_db;
        if out.abstraction == Abstraction::Full && !out.samples.is_empty() {
            let gain = 10f64.powf(-loss_db / 20.0);
            for s in &mut out.samples {
                *s *= gain;
            }
        }
        trace!(
            "free-space {} -> {}: d={:.1}m, loss={:.2}dB, rx={:.2}dBm",
            packet.transmitter_id,
            receiver.id,
            distance,
            loss_db,
            out.power_dbm
        );
        out
    }
}

/// Delivers packets exactly as transmitted.
#[derive(Debug, Clone, Default)]
pub struct IdentityChannel;

impl ChannelModel for IdentityChannel {
    fn name(&self) -> &str {
        "identity"
    }

    fn impair(&mut self, _receiver: &ReceiverInfo, packet: &Packet) -> Packet {
        packet.clone()
    }
}
