//! The time-driven simulation loop.

use crate::action::{ActionCallback, ActionId, ActionQueue, FireOutcome, Periodicity};
use crate::distribution::distribute;
use crate::stats::SimulationStats;
use rnsim_channel::ChannelModel;
use rnsim_common::{IdAllocator, NodeId, SimError, SimNode, SimTime, SimulatorConfig};
use rnsim_metrics::{metric_defs, metrics};
use rnsim_model::Simulation;
use std::any::Any;
use tracing::{debug, info, trace, warn};

/// Owns the nodes, the channel and the pending actions, and advances time.
///
/// One loop iteration ("tick") always runs, in this order: due nodes, packet
/// distribution, time-advance actions, due timed actions.
pub struct Simulator {
    config: SimulatorConfig,
    channel: Box<dyn ChannelModel>,
    /// Sorted by id.
    nodes: Vec<Box<dyn SimNode>>,
    /// Next invoke time per node, same order as `nodes`.
    next_times: Vec<Option<SimTime>>,
    ids: IdAllocator,
    actions: ActionQueue,
    current_time: SimTime,
    last_run_time: Option<SimTime>,
    started: bool,
    /// The clock sits at a previous `until` rather than at an event time.
    stopped_at_limit: bool,
    stats: SimulationStats,
}

impl Simulator {
    /// Empty simulator at time zero.
    pub fn new(config: SimulatorConfig, channel: Box<dyn ChannelModel>) -> Self {
        Simulator {
            config,
            channel,
            nodes: Vec::new(),
            next_times: Vec::new(),
            ids: IdAllocator::new(),
            actions: ActionQueue::new(),
            current_time: SimTime::ZERO,
            last_run_time: None,
            started: false,
            stopped_at_limit: false,
            stats: SimulationStats::default(),
        }
    }

    /// Take over a simulation built from a scenario.
    pub fn from_simulation(simulation: Simulation) -> Result<Self, SimError> {
        let Simulation { nodes, channel, config, ids, .. } = simulation;
        let mut sim = Simulator::new(config, channel);
        sim.ids = ids;
        for node in nodes {
            sim.add_node(node)?;
        }
        Ok(sim)
    }

    /// Hand out the next node id of this session.
    pub fn allocate_node_id(&mut self) -> NodeId {
        self.ids.allocate()
    }

    /// Add a node. Nodes added after the first run are due immediately.
    pub fn add_node(&mut self, node: Box<dyn SimNode>) -> Result<(), SimError> {
        let id = node.id();
        let pos = match self.nodes.binary_search_by_key(&id, |n| n.id()) {
            Ok(_) => return Err(SimError::DuplicateNode(id)),
            Err(pos) => pos,
        };
        debug!(node = %id, name = node.name(), "node added");
        self.nodes.insert(pos, node);
        self.next_times.insert(pos, self.started.then_some(self.current_time));
        Ok(())
    }

    /// Schedule an action at an absolute time. Past times fire at the current time.
    pub fn schedule(
        &mut self,
        callback: ActionCallback,
        user_data: Box<dyn Any>,
        at: SimTime,
        periodicity: Periodicity,
    ) -> ActionId {
        self.actions.schedule(callback, user_data, at.max(self.current_time), periodicity)
    }

    /// Schedule an action `delay` after the current time.
    pub fn schedule_after(
        &mut self,
        callback: ActionCallback,
        user_data: Box<dyn Any>,
        delay: SimTime,
        periodicity: Periodicity,
    ) -> ActionId {
        let at = self.current_time.saturating_add(delay);
        self.actions.schedule(callback, user_data, at, periodicity)
    }

    /// Cancel a pending action. Unknown ids are ignored.
    pub fn cancel(&mut self, id: ActionId) {
        self.actions.cancel(id);
    }

    /// Current simulation time.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Scheduler settings.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// The channel.
    pub fn channel(&self) -> &dyn ChannelModel {
        self.channel.as_ref()
    }

    /// Every node, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &dyn SimNode> + '_ {
        self.nodes.iter().map(|n| n.as_ref() as &dyn SimNode)
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&dyn SimNode> {
        self.index_of(id).map(|i| self.nodes[i].as_ref())
    }

    /// Look up a node for modification.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut dyn SimNode> {
        let idx = self.index_of(id)?;
        Some(self.nodes[idx].as_mut())
    }

    /// Next time a node asked to run, if any.
    pub fn next_invoke_time(&self, id: NodeId) -> Option<SimTime> {
        self.index_of(id).and_then(|i| self.next_times[i])
    }

    /// Invoke times of pending timed actions, earliest first.
    pub fn pending_action_times(&self) -> Vec<SimTime> {
        self.actions.pending_times()
    }

    /// Number of pending actions, timed and time-advance.
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.binary_search_by_key(&id, |n| n.id()).ok()
    }

    /// Run until the clock reaches `until`.
    ///
    /// Can be called again with a later `until` to continue the same session.
    pub fn run(&mut self, until: SimTime) -> Result<SimulationStats, SimError> {
        if self.stopped_at_limit {
            // Resume at the next real event; the previous limit is not a tick.
            match self.next_time_from(self.current_time) {
                Some(t) if t < until => {
                    self.current_time = t;
                    self.stopped_at_limit = false;
                }
                _ => self.current_time = self.current_time.max(until),
            }
        }
        info!(from = %self.current_time, until = %until, nodes = self.nodes.len(), "run");
        let mut same_instant = 0u32;

        while self.current_time < until {
            let now = self.current_time;
            self.stats.iterations += 1;
            metrics::counter!(metric_defs::SIM_ITERATIONS.name).increment(1);

            // Due nodes. A wake time already behind the clock (requested at
            // an instant the clock has left) is honoured on this tick.
            let first = !self.started;
            self.started = true;
            for idx in 0..self.nodes.len() {
                let due = first || self.next_times[idx].is_some_and(|t| t <= now);
                if due {
                    self.next_times[idx] = self.nodes[idx].run(now)?;
                    self.stats.node_runs += 1;
                    metrics::counter!(metric_defs::SIM_NODE_RUNS.name).increment(1);
                }
            }

            // Distribution.
            let outcome = distribute(&mut self.nodes, self.channel.as_mut(), self.config.irrelevant_packets);
            self.stats.packets_transmitted += outcome.transmitted;
            self.stats.packets_delivered += outcome.delivered;
            self.stats.packets_dropped += outcome.dropped;
            for &rx in &outcome.receivers {
                self.next_times[rx] = Some(now);
            }

            // Time-advance actions, only once the clock has moved.
            let mut woken = Vec::new();
            if self.last_run_time.is_some_and(|last| now > last) {
                let fired = self.actions.fire_on_advance(now, &mut self.nodes)?;
                self.record_fired(&fired);
                woken.extend(fired.woken);
            }

            // Timed actions due now.
            let fired = self.actions.fire_due(now, &mut self.nodes)?;
            self.record_fired(&fired);
            woken.extend(fired.woken);
            for id in &woken {
                match self.index_of(*id) {
                    Some(idx) => self.next_times[idx] = Some(now),
                    None => warn!(node = %id, "wake for unknown node"),
                }
            }

            // Next time.
            let next = if outcome.any_transmitted() || !woken.is_empty() {
                same_instant += 1;
                self.stats.same_instant_reentries += 1;
                if same_instant > self.config.max_same_instant_iterations {
                    warn!(time = %now, iterations = same_instant, "no convergence");
                    return Err(SimError::NoConvergence { time: now, iterations: same_instant });
                }
                trace!(time = %now, iteration = same_instant, "same-instant re-entry");
                now
            } else {
                same_instant = 0;
                match self.next_time_after(now) {
                    Some(t) if t < until => t,
                    _ => {
                        self.stopped_at_limit = true;
                        until
                    }
                }
            };

            self.last_run_time = Some(now);
            self.current_time = next.max(now);
        }

        self.stats.final_time = self.current_time;
        self.stats.nodes = self.nodes.iter().filter_map(|n| n.report()).collect();
        info!(
            time = %self.current_time,
            iterations = self.stats.iterations,
            transmitted = self.stats.packets_transmitted,
            delivered = self.stats.packets_delivered,
            "run finished"
        );
        Ok(self.stats.clone())
    }

    /// Earliest node or action time strictly after `now`.
    fn next_time_after(&self, now: SimTime) -> Option<SimTime> {
        self.next_times
            .iter()
            .flatten()
            .copied()
            .filter(|t| *t > now)
            .chain(self.actions.next_after(now))
            .min()
    }

    /// Earliest node or action time at or after `from`.
    fn next_time_from(&self, from: SimTime) -> Option<SimTime> {
        self.next_times
            .iter()
            .flatten()
            .copied()
            .filter(|t| *t >= from)
            .chain(self.actions.next_from(from))
            .min()
    }

    fn record_fired(&mut self, fired: &FireOutcome) {
        if fired.fired > 0 {
            self.stats.actions_fired += fired.fired;
            metrics::counter!(metric_defs::ACTIONS_FIRED.name).increment(fired.fired);
        }
    }
}
