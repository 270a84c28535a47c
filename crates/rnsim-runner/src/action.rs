//! Scheduled actions.
//!
//! Timed actions live in a vector kept sorted by invoke time; equal times keep
//! insertion order. Actions that run on every time advance are kept apart,
//! in insertion order.

use rnsim_common::{NodeId, SimError, SimNode, SimTime};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a scheduled action. Strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action:{}", self.0)
    }
}

/// How often an action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Periodicity {
    /// Once, at its invoke time.
    Once,
    /// Whenever the clock has advanced since the previous loop iteration.
    OnTimeAdvance,
    /// At its invoke time and every period after it.
    Every(SimTime),
}

/// Callback run when an action fires. Receives the scheduling context and
/// the user data registered with the action.
pub type ActionCallback = Box<dyn FnMut(&mut ActionContext<'_>, &mut dyn Any) -> Result<(), SimError>>;

struct Action {
    id: ActionId,
    callback: ActionCallback,
    user_data: Box<dyn Any>,
    invoke_time: SimTime,
    periodicity: Periodicity,
}

/// What a callback can do while it runs.
pub struct ActionContext<'a> {
    now: SimTime,
    running: ActionId,
    cancelled_running: bool,
    queue: &'a mut ActionQueue,
    nodes: &'a mut [Box<dyn SimNode>],
    woken: &'a mut Vec<NodeId>,
}

impl ActionContext<'_> {
    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Id of the action being run.
    pub fn action_id(&self) -> ActionId {
        self.running
    }

    /// Schedule another action. Times in the past fire at the current time.
    pub fn schedule(
        &mut self,
        callback: ActionCallback,
        user_data: Box<dyn Any>,
        at: SimTime,
        periodicity: Periodicity,
    ) -> ActionId {
        self.queue.schedule(callback, user_data, at.max(self.now), periodicity)
    }

    /// Schedule another action `delay` from now.
    pub fn schedule_after(
        &mut self,
        callback: ActionCallback,
        user_data: Box<dyn Any>,
        delay: SimTime,
        periodicity: Periodicity,
    ) -> ActionId {
        let at = self.now.saturating_add(delay);
        self.queue.schedule(callback, user_data, at, periodicity)
    }

    /// Cancel an action. Cancelling the running action stops it from being rescheduled.
    pub fn cancel(&mut self, id: ActionId) {
        if id == self.running {
            self.cancelled_running = true;
        } else {
            self.queue.cancel(id);
        }
    }

    /// Mutable access to a node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut dyn SimNode> {
        self.nodes.iter_mut().find(|n| n.id() == id).map(|n| n.as_mut() as &mut dyn SimNode)
    }

    /// Every node, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &dyn SimNode> + '_ {
        self.nodes.iter().map(|n| n.as_ref() as &dyn SimNode)
    }

    /// Run `id` again at the current instant (after this tick's actions).
    pub fn wake(&mut self, id: NodeId) {
        self.woken.push(id);
    }
}

/// Pending actions.
#[derive(Default)]
pub struct ActionQueue {
    next_id: u64,
    timed: Vec<Action>,
    on_advance: Vec<Action>,
    // Cancellations aimed at time-advance actions detached while they run.
    detached_cancels: BTreeSet<ActionId>,
}

/// Result of firing actions.
#[derive(Debug, Default)]
pub struct FireOutcome {
    /// Callbacks invoked.
    pub fired: u64,
    /// Nodes a callback asked to run again now.
    pub woken: Vec<NodeId>,
}

impl ActionQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action; returns its id.
    ///
    /// `Every(0)` is treated as [`Periodicity::OnTimeAdvance`].
    pub fn schedule(
        &mut self,
        callback: ActionCallback,
        user_data: Box<dyn Any>,
        at: SimTime,
        periodicity: Periodicity,
    ) -> ActionId {
        self.next_id += 1;
        let id = ActionId(self.next_id);
        let periodicity = match periodicity {
            Periodicity::Every(p) if p == SimTime::ZERO => Periodicity::OnTimeAdvance,
            other => other,
        };
        let action = Action { id, callback, user_data, invoke_time: at, periodicity };
        match periodicity {
            Periodicity::OnTimeAdvance => self.on_advance.push(action),
            _ => self.insert(action),
        }
        id
    }

    fn insert(&mut self, action: Action) {
        let at = self.timed.partition_point(|a| a.invoke_time <= action.invoke_time);
        self.timed.insert(at, action);
    }

    /// Remove an action. Unknown ids are ignored.
    pub fn cancel(&mut self, id: ActionId) {
        if let Some(pos) = self.timed.iter().position(|a| a.id == id) {
            self.timed.remove(pos);
        } else if let Some(pos) = self.on_advance.iter().position(|a| a.id == id) {
            self.on_advance.remove(pos);
        } else if id.0 <= self.next_id {
            self.detached_cancels.insert(id);
        }
    }

    /// Invoke times of the pending timed actions, in queue order.
    pub fn pending_times(&self) -> Vec<SimTime> {
        self.timed.iter().map(|a| a.invoke_time).collect()
    }

    /// Number of pending actions of every kind.
    pub fn len(&self) -> usize {
        self.timed.len() + self.on_advance.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest timed action strictly after `now`.
    pub fn next_after(&self, now: SimTime) -> Option<SimTime> {
        self.timed.iter().map(|a| a.invoke_time).find(|t| *t > now)
    }

    /// Earliest timed action at or after `from`.
    pub fn next_from(&self, from: SimTime) -> Option<SimTime> {
        self.timed.iter().map(|a| a.invoke_time).find(|t| *t >= from)
    }

    /// Fire every time-advance action once.
    pub fn fire_on_advance(
        &mut self,
        now: SimTime,
        nodes: &mut [Box<dyn SimNode>],
    ) -> Result<FireOutcome, SimError> {
        let mut outcome = FireOutcome::default();
        let running = std::mem::take(&mut self.on_advance);
        let mut kept = Vec::with_capacity(running.len());
        let mut pending = running.into_iter();

        while let Some(mut action) = pending.next() {
            if self.detached_cancels.remove(&action.id) {
                continue;
            }
            let result = self.invoke(&mut action, now, nodes, &mut outcome.woken);
            outcome.fired += 1;
            match result {
                Ok(true) => kept.push(action),
                Ok(false) => {}
                Err(e) => {
                    // Put everything back before failing.
                    kept.push(action);
                    kept.extend(pending);
                    kept.append(&mut self.on_advance);
                    self.on_advance = kept;
                    self.detached_cancels.clear();
                    return Err(e);
                }
            }
        }

        // Actions added by callbacks go after the ones that were already there.
        kept.retain(|a| !self.detached_cancels.contains(&a.id));
        kept.append(&mut self.on_advance);
        self.on_advance = kept;
        self.detached_cancels.clear();
        Ok(outcome)
    }

    /// Fire every timed action due at or before `now`, in order.
    pub fn fire_due(&mut self, now: SimTime, nodes: &mut [Box<dyn SimNode>]) -> Result<FireOutcome, SimError> {
        let mut outcome = FireOutcome::default();
        while self.timed.first().is_some_and(|a| a.invoke_time <= now) {
            let mut action = self.timed.remove(0);
            let keep = self.invoke(&mut action, now, nodes, &mut outcome.woken)?;
            outcome.fired += 1;
            if let (true, Periodicity::Every(period)) = (keep, action.periodicity) {
                action.invoke_time = action.invoke_time.saturating_add(period);
                self.insert(action);
            }
        }
        self.detached_cancels.clear();
        Ok(outcome)
    }

    /// Run one callback. Returns false if it cancelled itself.
    fn invoke(
        &mut self,
        action: &mut Action,
        now: SimTime,
        nodes: &mut [Box<dyn SimNode>],
        woken: &mut Vec<NodeId>,
    ) -> Result<bool, SimError> {
        let mut ctx = ActionContext {
            now,
            running: action.id,
            cancelled_running: false,
            queue: self,
            nodes,
            woken,
        };
        (action.callback)(&mut ctx, action.user_data.as_mut())?;
        Ok(!ctx.cancelled_running)
    }
}
