//! # Threshold Command Tracker
//!
//! Watches node updates on behalf of RUNNING wrap commands. Each command gets
//! a [`ThresholdCommandStorage`] holding one [`ThresholdGoal`] per goal entry
//! and an optional time-limit timer. A storage is satisfied when a
//! complete-clear goal is met, or when every goal is met, or when its timer
//! fires. Satisfied storages are detached before they are reported, so a
//! storage reports at most once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::models::{Goal, NodeId, NodeValue, WrapCommand};
use crate::place::PlaceGraph;

/// Identifies one scheduled timer; the generation tells stale fires apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub wrap_cmd_uuid: Uuid,
    pub generation: u64,
}

/// Source of scheduled work. Expiry is delivered back to the engine as a
/// timer event carrying the token.
pub trait TimerScheduler: Send + Sync + std::fmt::Debug {
    fn schedule(&self, token: TimerToken, after: Duration);
    fn cancel(&self, token: TimerToken);
}

/// Scheduler that only records requests; tests fire tokens by hand
#[derive(Debug, Default)]
pub struct ManualTimerScheduler {
    scheduled: Mutex<Vec<(TimerToken, Duration)>>,
}

impl ManualTimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers scheduled and not cancelled
    pub fn pending(&self) -> Vec<(TimerToken, Duration)> {
        self.scheduled.lock().clone()
    }

    pub fn pending_for(&self, wrap_cmd_uuid: Uuid) -> Option<TimerToken> {
        self.scheduled
            .lock()
            .iter()
            .find(|(token, _)| token.wrap_cmd_uuid == wrap_cmd_uuid)
            .map(|(token, _)| *token)
    }
}

impl TimerScheduler for ManualTimerScheduler {
    fn schedule(&self, token: TimerToken, after: Duration) {
        self.scheduled.lock().push((token, after));
    }

    fn cancel(&self, token: TimerToken) {
        self.scheduled.lock().retain(|(t, _)| *t != token);
    }
}

/// One goal entry with sticky satisfaction
#[derive(Debug, Clone)]
pub struct ThresholdGoal {
    pub goal: Goal,
    pub satisfied: bool,
}

impl ThresholdGoal {
    pub fn new(goal: Goal) -> Self {
        Self {
            goal,
            satisfied: false,
        }
    }

    /// Re-evaluate against a value; true only on the unsatisfied -> satisfied edge
    pub fn observe(&mut self, value: Option<&NodeValue>) -> bool {
        if self.satisfied {
            return false;
        }
        self.satisfied = self.goal.is_met_by(value);
        self.satisfied
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdCommandStorage {
    pub wrap_cmd_uuid: Uuid,
    pub wrap_cmd_id: String,
    pub goals: Vec<ThresholdGoal>,
    pub timer: Option<TimerToken>,
}

impl ThresholdCommandStorage {
    pub fn is_satisfied(&self) -> bool {
        if self
            .goals
            .iter()
            .any(|g| g.goal.is_complete_clear && g.satisfied)
        {
            return true;
        }
        !self.goals.is_empty() && self.goals.iter().all(|g| g.satisfied)
    }

    fn observe(&mut self, node_id: &str, value: Option<&NodeValue>) -> bool {
        for goal in self.goals.iter_mut().filter(|g| g.goal.node_id == node_id) {
            if goal.observe(value) {
                trace!(
                    wrap_cmd_uuid = %self.wrap_cmd_uuid,
                    node_id = %node_id,
                    complete_clear = goal.goal.is_complete_clear,
                    "Threshold goal satisfied"
                );
            }
        }
        self.is_satisfied()
    }

    fn watched_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.goals.iter().map(|g| &g.goal.node_id)
    }
}

/// Why a storage finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOutcome {
    GoalSatisfied,
    TimeLimitReached,
}

#[derive(Debug)]
pub struct ThresholdTracker {
    storages: HashMap<Uuid, ThresholdCommandStorage>,
    /// node -> storages watching it
    subscriptions: HashMap<NodeId, Vec<Uuid>>,
    scheduler: Arc<dyn TimerScheduler>,
    next_generation: u64,
}

impl ThresholdTracker {
    pub fn new(scheduler: Arc<dyn TimerScheduler>) -> Self {
        Self {
            storages: HashMap::new(),
            subscriptions: HashMap::new(),
            scheduler,
            next_generation: 0,
        }
    }

    /// Start tracking a RUNNING command. Current node values are checked right
    /// away; a storage already satisfied is not kept and the outcome is returned.
    pub fn attach(&mut self, command: &WrapCommand, graph: &PlaceGraph) -> Option<ThresholdOutcome> {
        let goal_info = command.goal.as_ref()?;
        let wrap_cmd_uuid = command.wrap_cmd_uuid;
        if self.storages.contains_key(&wrap_cmd_uuid) {
            return None;
        }

        let mut storage = ThresholdCommandStorage {
            wrap_cmd_uuid,
            wrap_cmd_id: command.wrap_cmd_id.clone(),
            goals: goal_info
                .goals
                .iter()
                .cloned()
                .map(ThresholdGoal::new)
                .collect(),
            timer: None,
        };

        let already_met = storage.goals.iter().any(|g| {
            let value = graph.node(&g.goal.node_id).and_then(|n| n.value.as_ref());
            g.goal.is_met_by(value)
        });
        if already_met {
            let nodes: Vec<NodeId> = storage.watched_nodes().cloned().collect();
            for node_id in nodes {
                let value = graph.node(&node_id).and_then(|n| n.value.as_ref());
                storage.observe(&node_id, value);
            }
            if storage.is_satisfied() {
                info!(
                    wrap_cmd_id = %command.wrap_cmd_id,
                    wrap_cmd_uuid = %wrap_cmd_uuid,
                    "Goal already met when tracking started"
                );
                return Some(ThresholdOutcome::GoalSatisfied);
            }
        }

        if let Some(limit) = goal_info.limit_time_sec {
            self.next_generation += 1;
            let token = TimerToken {
                wrap_cmd_uuid,
                generation: self.next_generation,
            };
            self.scheduler.schedule(token, Duration::from_secs(limit));
            storage.timer = Some(token);
        }

        for node_id in storage.watched_nodes() {
            let subscribers = self.subscriptions.entry(node_id.clone()).or_default();
            if !subscribers.contains(&wrap_cmd_uuid) {
                subscribers.push(wrap_cmd_uuid);
            }
        }

        debug!(
            wrap_cmd_id = %command.wrap_cmd_id,
            wrap_cmd_uuid = %wrap_cmd_uuid,
            goals = storage.goals.len(),
            time_limit = ?goal_info.limit_time_sec,
            "Threshold tracking attached"
        );
        self.storages.insert(wrap_cmd_uuid, storage);
        None
    }

    /// Forward a node update; returns the commands whose storage became satisfied
    pub fn on_node_update(&mut self, node_id: &str, value: Option<&NodeValue>) -> Vec<Uuid> {
        let Some(subscribers) = self.subscriptions.get(node_id) else {
            return Vec::new();
        };

        let satisfied: Vec<Uuid> = subscribers
            .clone()
            .into_iter()
            .filter(|uuid| {
                self.storages
                    .get_mut(uuid)
                    .is_some_and(|storage| storage.observe(node_id, value))
            })
            .collect();

        for uuid in &satisfied {
            self.detach(*uuid);
        }
        satisfied
    }

    /// A timer fired; stale tokens return `None`
    pub fn on_timer_expired(&mut self, token: TimerToken) -> Option<Uuid> {
        let current = self.storages.get(&token.wrap_cmd_uuid)?.timer;
        if current != Some(token) {
            debug!(wrap_cmd_uuid = %token.wrap_cmd_uuid, generation = token.generation, "Stale timer ignored");
            return None;
        }
        info!(wrap_cmd_uuid = %token.wrap_cmd_uuid, "Goal time limit reached");
        self.detach(token.wrap_cmd_uuid);
        Some(token.wrap_cmd_uuid)
    }

    /// Tear down tracking for a command and cancel its timer
    pub fn detach(&mut self, wrap_cmd_uuid: Uuid) -> bool {
        let Some(storage) = self.storages.remove(&wrap_cmd_uuid) else {
            return false;
        };
        if let Some(token) = storage.timer {
            self.scheduler.cancel(token);
        }
        for node_id in storage.watched_nodes() {
            if let Some(subscribers) = self.subscriptions.get_mut(node_id) {
                subscribers.retain(|uuid| *uuid != wrap_cmd_uuid);
                if subscribers.is_empty() {
                    self.subscriptions.remove(node_id);
                }
            }
        }
        trace!(wrap_cmd_uuid = %wrap_cmd_uuid, "Threshold tracking detached");
        true
    }

    pub fn is_tracking(&self, wrap_cmd_uuid: Uuid) -> bool {
        self.storages.contains_key(&wrap_cmd_uuid)
    }

    pub fn storage(&self, wrap_cmd_uuid: Uuid) -> Option<&ThresholdCommandStorage> {
        self.storages.get(&wrap_cmd_uuid)
    }

    pub fn len(&self) -> usize {
        self.storages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }
}
