//! Turning a [`Scenario`] into runnable components.

use crate::scenario::{ChannelSection, InnerChannel, NodeSection, Role, Scenario};
use crate::ModelError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rnsim_channel::{ChannelModel, FreeSpaceChannel, IdentityChannel, PulseBlankingChannel};
use rnsim_common::{IdAllocator, NodeId, SimNode, SimTime, SimulatorConfig, Vec3};
use rnsim_node::{RadioNode, SlotMac, TransparentRlc};
use rnsim_nr::{
    BaseStationPhy, BlockErrorModel, RadioPhy, SaturationAwareErrors, TerminalPhy, UniformBlockErrors,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Everything the scheduler needs to run a scenario.
pub struct Simulation {
    /// Nodes in ascending id order.
    pub nodes: Vec<Box<dyn SimNode>>,
    /// Channel shared by every link.
    pub channel: Box<dyn ChannelModel>,
    /// Scheduler settings.
    pub config: SimulatorConfig,
    /// Default run length.
    pub duration: SimTime,
    /// Id allocator of this session, past every id handed out so far.
    pub ids: IdAllocator,
}

/// Per-node seeds drawn from the run seed, so adding randomness to one node
/// does not shift the others.
#[derive(Debug, Clone, Copy)]
struct NodeSeeds {
    errors: u64,
    traffic: u64,
}

/// Build the simulation. Nodes get ids 1..=N in scenario order.
pub fn build_simulation(scenario: &Scenario, seed: u64) -> Result<Simulation, ModelError> {
    crate::validate(scenario)?;

    let mut ids = IdAllocator::new();
    let node_ids: BTreeMap<&str, NodeId> = scenario
        .nodes
        .iter()
        .map(|n| (n.name.as_str(), ids.allocate()))
        .collect();

    let mut seed_rng = ChaCha8Rng::seed_from_u64(seed);
    let seeds: Vec<NodeSeeds> = scenario
        .nodes
        .iter()
        .map(|_| NodeSeeds { errors: seed_rng.gen(), traffic: seed_rng.gen() })
        .collect();

    let mut nodes: Vec<Box<dyn SimNode>> = Vec::with_capacity(scenario.nodes.len());
    for (section, seeds) in scenario.nodes.iter().zip(seeds) {
        let id = node_ids[section.name.as_str()];
        let phy = build_phy(scenario, section, id, &node_ids, seeds)?;
        let mac = SlotMac::new(id, section.mac.clone().unwrap_or_else(|| scenario.mac.clone()));
        let traffic = section
            .traffic
            .as_ref()
            .map(|t| t.build(seeds.traffic))
            .transpose()?;

        debug!(node = %id, name = %section.name, role = ?section.role, "node built");
        let node = RadioNode::new(
            section.name.clone(),
            Vec3::from(section.position),
            phy,
            mac,
            Box::new(TransparentRlc::new()),
            traffic,
        )
        .with_velocity(Vec3::from(section.velocity));
        nodes.push(Box::new(node));
    }

    let channel = build_channel(&scenario.channel)?;
    info!(
        nodes = nodes.len(),
        channel = channel.name(),
        duration_ms = scenario.simulation.duration_ms,
        "simulation built"
    );

    Ok(Simulation {
        nodes,
        channel,
        config: scenario.simulation.scheduler.clone(),
        duration: SimTime::from_secs(scenario.simulation.duration_ms / 1e3),
        ids,
    })
}

fn build_phy(
    scenario: &Scenario,
    section: &NodeSection,
    id: NodeId,
    node_ids: &BTreeMap<&str, NodeId>,
    seeds: NodeSeeds,
) -> Result<Box<dyn RadioPhy>, ModelError> {
    let carrier = section.carrier.clone().unwrap_or_else(|| scenario.carrier.clone());
    let mut phy: Box<dyn RadioPhy> = match section.role {
        Role::BaseStation => {
            let mut bs = BaseStationPhy::new(id, carrier, seeds.errors)?;
            for terminal in scenario
                .nodes
                .iter()
                .filter(|n| n.serving.as_deref() == Some(section.name.as_str()))
            {
                bs.attach_terminal(node_ids[terminal.name.as_str()]);
            }
            Box::new(bs)
        }
        Role::Terminal => {
            let serving = section
                .serving
                .as_deref()
                .and_then(|name| node_ids.get(name))
                .copied()
                .ok_or_else(|| ModelError::Validation(format!("terminal '{}' has no serving node", section.name)))?;
            Box::new(TerminalPhy::new(id, serving, carrier, &section.csi, seeds.errors)?)
        }
    };

    let uniform = UniformBlockErrors::new(section.block_error_rate, seeds.errors);
    let errors: Box<dyn BlockErrorModel> = match section.saturation_threshold {
        Some(threshold) => Box::new(SaturationAwareErrors::new(uniform, threshold)),
        None => Box::new(uniform),
    };
    phy.core_mut().set_block_error_model(errors);
    Ok(phy)
}

fn build_channel(section: &ChannelSection) -> Result<Box<dyn ChannelModel>, ModelError> {
    Ok(match section {
        ChannelSection::FreeSpace => Box::new(FreeSpaceChannel::new()),
        ChannelSection::Identity => Box::new(IdentityChannel),
        ChannelSection::PulseBlanking { inner: InnerChannel::FreeSpace, pulse_train } => {
            Box::new(PulseBlankingChannel::new(FreeSpaceChannel::new(), pulse_train)?)
        }
        ChannelSection::PulseBlanking { inner: InnerChannel::Identity, pulse_train } => {
            Box::new(PulseBlankingChannel::new(IdentityChannel, pulse_train)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_model_from_str;

    const CELL: &str = r#"
simulation:
  duration_ms: 10
  irrelevant_packets: drop
nodes:
  - name: gnb
    role: base_station
    traffic: {type: fixed_interval, interval_ms: 0.5, packet_size: 64}
  - name: ue1
    role: terminal
    serving: gnb
    position: [100.0, 0.0, 1.5]
  - name: ue2
    role: terminal
    serving: gnb
    position: [0.0, 200.0, 1.5]
    csi: {initial_cqi: 3, period_slots: 4}
"#;

    fn radio(node: &dyn SimNode) -> &RadioNode {
        node.as_any().downcast_ref::<RadioNode>().unwrap()
    }

    #[test]
    fn test_ids_follow_scenario_order() {
        let sim = build_simulation(&load_model_from_str(CELL).unwrap(), 1).unwrap();
        let ids: Vec<_> = sim.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(sim.ids.allocated(), 3);
        assert_eq!(sim.duration, SimTime::from_millis(10));
        assert_eq!(sim.config.irrelevant_packets, rnsim_common::IrrelevantPacketPolicy::Drop);
    }

    #[test]
    fn test_base_station_serves_its_terminals() {
        let sim = build_simulation(&load_model_from_str(CELL).unwrap(), 1).unwrap();
        assert_eq!(radio(sim.nodes[0].as_ref()).phy().peers(), vec![NodeId(2), NodeId(3)]);
        assert_eq!(radio(sim.nodes[1].as_ref()).phy().peers(), vec![NodeId(1)]);
        assert_eq!(sim.nodes[2].position(), Vec3::new(0.0, 200.0, 1.5));
        assert_eq!(sim.channel.name(), "free-space");
    }

    #[test]
    fn test_invalid_carrier_surfaces_as_config_error() {
        let yaml = "carrier: {subcarrier_spacing_khz: 45}\nnodes:\n  - {name: gnb, role: base_station}\n";
        let model = load_model_from_str(yaml).unwrap();
        assert!(matches!(build_simulation(&model, 0), Err(ModelError::Sim(_))));
    }

    #[test]
    fn test_invalid_pulse_train_rejected() {
        let yaml = r#"
channel:
  type: pulse_blanking
  pulse_train: {repetition_interval_hz: 0.0, pulse_width_seconds: 1.0e-5, start_offset_seconds: 0.0}
nodes:
  - {name: gnb, role: base_station}
"#;
        let model = load_model_from_str(yaml).unwrap();
        assert!(matches!(build_simulation(&model, 0), Err(ModelError::Config(_))));
    }
}
