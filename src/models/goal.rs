//! Physical goal descriptors attached to CONTROL commands.

use serde::{Deserialize, Serialize};

use crate::models::place::{NodeId, NodeValue};

/// How a node value is compared against a goal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalRange {
    /// Satisfied when value <= goal
    Lower,
    /// Satisfied when value == goal (case-insensitive for text)
    Equal,
    /// Satisfied when value >= goal
    Upper,
}

/// One physical condition on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub node_id: NodeId,
    pub goal_value: NodeValue,
    pub goal_range: GoalRange,
    /// Reaching this goal alone completes the whole goal set
    #[serde(default)]
    pub is_complete_clear: bool,
}

impl Goal {
    pub fn new(node_id: impl Into<NodeId>, goal_value: impl Into<NodeValue>, goal_range: GoalRange) -> Self {
        Self {
            node_id: node_id.into(),
            goal_value: goal_value.into(),
            goal_range,
            is_complete_clear: false,
        }
    }

    pub fn complete_clear(mut self) -> Self {
        self.is_complete_clear = true;
        self
    }

    /// Evaluate the goal against a live node value
    pub fn is_met_by(&self, value: Option<&NodeValue>) -> bool {
        let Some(value) = value else {
            return false;
        };

        match (value.as_number(), self.goal_value.as_number()) {
            (Some(current), Some(goal)) => match self.goal_range {
                GoalRange::Lower => current <= goal,
                GoalRange::Equal => (current - goal).abs() < f64::EPSILON,
                GoalRange::Upper => current >= goal,
            },
            _ => {
                self.goal_range == GoalRange::Equal
                    && value
                        .as_text()
                        .trim()
                        .eq_ignore_ascii_case(self.goal_value.as_text().trim())
            }
        }
    }
}

/// Goal list plus an optional time limit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalInfo {
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Seconds after which the goal counts as reached regardless of node values
    #[serde(default)]
    pub limit_time_sec: Option<u64>,
}

impl GoalInfo {
    pub fn new(goals: Vec<Goal>) -> Self {
        Self {
            goals,
            limit_time_sec: None,
        }
    }

    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.limit_time_sec = Some(seconds);
        self
    }

    /// A goal is live when there is something to wait for
    pub fn is_live(&self) -> bool {
        !self.goals.is_empty() || self.limit_time_sec.is_some()
    }
}
