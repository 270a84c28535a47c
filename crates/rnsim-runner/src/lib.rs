//! # rnsim-runner
//!
//! Drives a simulation: owns the nodes and the channel, fires scheduled
//! actions and moves packets between nodes.
//!
//! ```rust
//! use rnsim_channel::IdentityChannel;
//! use rnsim_common::{SimTime, SimulatorConfig};
//! use rnsim_runner::{Periodicity, Simulator};
//!
//! let mut sim = Simulator::new(SimulatorConfig::default(), Box::new(IdentityChannel));
//! sim.schedule(
//!     Box::new(|ctx, data| {
//!         if let Some(count) = data.downcast_mut::<u32>() {
//!             *count += 1;
//!         }
//!         tracing::debug!(time = %ctx.now(), "tick");
//!         Ok(())
//!     }),
//!     Box::new(0u32),
//!     SimTime::from_millis(1),
//!     Periodicity::Every(SimTime::from_millis(1)),
//! );
//! let stats = sim.run(SimTime::from_millis(5))?;
//! assert_eq!(stats.actions_fired, 4);
//! # Ok::<(), rnsim_common::SimError>(())
//! ```

mod action;
pub mod distribution;
mod simulator;
mod stats;

pub use action::{ActionCallback, ActionContext, ActionId, ActionQueue, FireOutcome, Periodicity};
pub use distribution::{distribute, is_relevant, DistributionOutcome};
pub use simulator::Simulator;
pub use stats::SimulationStats;

#[cfg(test)]
pub(crate) mod test_support {
    use rnsim_common::{
        Abstraction, ControlKind, ControlMessage, NodeId, Packet, PacketPayload, ReceiverInfo, SimError,
        SimNode, SimTime, Vec3,
    };
    use std::any::Any;

    pub fn probe_packet(from: u32, to: u32, frequency_hz: f64) -> Packet {
        Packet {
            transmitter_id: NodeId(from),
            transmitter_position: Vec3::ZERO,
            center_frequency_hz: frequency_hz,
            power_dbm: 23.0,
            num_transmit_antennas: 1,
            start_time: SimTime::ZERO,
            duration: SimTime::from_micros(36),
            abstraction: Abstraction::Abstract,
            samples: Vec::new(),
            payload: PacketPayload::Control(ControlMessage {
                destination: NodeId(to),
                kind: ControlKind::Ack { harq_id: 0 },
            }),
        }
    }

    /// Records what the scheduler does to it.
    pub struct ProbeNode {
        id: NodeId,
        outgoing: Vec<Packet>,
        wakeups: Vec<SimTime>,
        pub runs: Vec<SimTime>,
        pub received: Vec<Packet>,
    }

    impl ProbeNode {
        pub fn new(id: NodeId) -> Self {
            ProbeNode { id, outgoing: Vec::new(), wakeups: Vec::new(), runs: Vec::new(), received: Vec::new() }
        }

        pub fn with_wakeups(mut self, millis: &[u64]) -> Self {
            self.wakeups = millis.iter().map(|ms| SimTime::from_millis(*ms)).collect();
            self
        }

        pub fn queue(&mut self, packet: Packet) {
            self.outgoing.push(packet);
        }
    }

    impl SimNode for ProbeNode {
        fn id(&self) -> NodeId {
            self.id
        }

        fn name(&self) -> &str {
            "probe"
        }

        fn position(&self) -> Vec3 {
            Vec3::ZERO
        }

        fn velocity(&self) -> Vec3 {
            Vec3::ZERO
        }

        fn receiver_info(&self) -> ReceiverInfo {
            ReceiverInfo {
                id: self.id,
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                num_receive_antennas: 1,
                receive_frequencies_hz: vec![3.5e9],
            }
        }

        fn run(&mut self, now: SimTime) -> Result<Option<SimTime>, SimError> {
            self.runs.push(now);
            Ok(self.wakeups.iter().copied().find(|t| *t > now))
        }

        fn pull_transmitted(&mut self) -> Vec<Packet> {
            std::mem::take(&mut self.outgoing)
        }

        fn push_received(&mut self, packet: Packet) {
            self.received.push(packet);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }
}
