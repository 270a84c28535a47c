//! # rnsim-channel
//!
//! Channel models decide which receivers a transmission reaches and what it
//! looks like when it gets there.
//!
//! - [`ChannelModel`] - the capability every channel implements
//! - [`FreeSpaceChannel`] - free-space path loss (the default)
//! - [`IdentityChannel`] - lossless pass-through, handy for tests
//! - [`PulseBlankingChannel`] - overwrites samples hit by an external radar
//!   pulse train on top of any inner channel
//!
//! ```rust
//! use rnsim_channel::{ChannelModel, FreeSpaceChannel, PulseBlankingChannel, PulseTrainConfig};
//!
//! let radar = PulseTrainConfig {
//!     repetition_interval_hz: 1000.0,
//!     pulse_width_seconds: 40e-6,
//!     start_offset_seconds: 200e-6,
//! };
//! let channel = PulseBlankingChannel::new(FreeSpaceChannel::new(), &radar)?;
//! assert_eq!(channel.name(), "pulse-blanking");
//! # Ok::<(), rnsim_common::ConfigError>(())
//! ```

mod blanking;
mod free_space;
mod pulse;

pub use blanking::{blank_samples, BlankedRange, PulseBlankingChannel, BLANKING_VALUE};
pub use free_space::{free_space_path_loss_db, FreeSpaceChannel, IdentityChannel};
pub use pulse::{PulseTrain, PulseTrainConfig};

use rnsim_common::{Packet, ReceiverInfo};

/// A channel between one transmitter and one receiver.
pub trait ChannelModel {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether `packet` should go through this channel for `receiver` at all.
    ///
    /// The default accepts packets on any carrier the receiver listens on.
    fn is_relevant(&self, receiver: &ReceiverInfo, packet: &Packet) -> bool {
        receiver.listens_on(packet.center_frequency_hz)
    }

    /// Produce the packet as seen by `receiver`. The input is left untouched.
    fn impair(&mut self, receiver: &ReceiverInfo, packet: &Packet) -> Packet;
}

impl<C: ChannelModel + ?Sized> ChannelModel for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_relevant(&self, receiver: &ReceiverInfo, packet: &Packet) -> bool {
        (**self).is_relevant(receiver, packet)
    }

    fn impair(&mut self, receiver: &ReceiverInfo, packet: &Packet) -> Packet {
        (**self).impair(receiver, packet)
    }
}
