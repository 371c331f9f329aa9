//! # Overlap Tracker
//!
//! Counts how many live wrap commands depend on each actuator state. A tuple
//! is `(node, control value, set value)`; each tuple keeps the list of wrap
//! command uuids (WCUs) that need it and at most one reserved element, the
//! physical command currently in flight for it.
//!
//! Releasing a WCU only drops the dependency. Nothing here talks to devices.

use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::constants::ControlValue;
use crate::error::{EngineError, EngineResult};
use crate::models::{NodeId, SetPoint};

/// Control value and set value of one actuator state
pub type OverlapKey = (ControlValue, Option<SetPoint>);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapStatus {
    /// Live wrap commands depending on this state, no duplicates
    pub wcus: Vec<Uuid>,
    /// Element command presently dispatched for this state
    pub reserved_element: Option<Uuid>,
}

impl OverlapStatus {
    fn is_vacant(&self) -> bool {
        self.wcus.is_empty() && self.reserved_element.is_none()
    }
}

#[derive(Debug, Default)]
pub struct OverlapTracker {
    nodes: HashMap<NodeId, HashMap<OverlapKey, OverlapStatus>>,
}

impl OverlapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a registration that duplicates this WCU or contradicts a state
    /// another command holds or has in flight on the same actuator
    pub fn check_conflicts<'a>(
        &self,
        wrap_cmd_uuid: Uuid,
        tuples: impl IntoIterator<Item = (&'a NodeId, ControlValue, Option<SetPoint>)>,
    ) -> EngineResult<()> {
        for (node_id, control_value, set_value) in tuples {
            if self
                .status(node_id, control_value, set_value)
                .is_some_and(|status| status.wcus.contains(&wrap_cmd_uuid))
            {
                return Err(EngineError::DuplicateWcu {
                    wrap_cmd_uuid,
                    node_id: node_id.clone(),
                });
            }

            let key = (control_value, set_value);
            let held = self
                .existing_overlaps(node_id, None)
                .into_iter()
                .find(|(other, status)| {
                    *other != key
                        && (status.reserved_element.is_some()
                            || status.wcus.iter().any(|wcu| *wcu != wrap_cmd_uuid))
                });
            if let Some(((held_cv, held_sv), _)) = held {
                return Err(EngineError::OverlapConflict {
                    node_id: node_id.clone(),
                    requested: describe(control_value, set_value),
                    held: describe(held_cv, held_sv),
                });
            }
        }
        Ok(())
    }

    /// Whether another state of the actuator has an element in flight
    pub fn is_contested(
        &self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
    ) -> bool {
        self.existing_overlaps(node_id, None)
            .iter()
            .any(|(key, status)| {
                *key != (control_value, set_value) && status.reserved_element.is_some()
            })
    }

    /// Add the WCU to every tuple; a WCU already present is not added twice
    pub fn register<'a>(
        &mut self,
        wrap_cmd_uuid: Uuid,
        tuples: impl IntoIterator<Item = (&'a NodeId, ControlValue, Option<SetPoint>)>,
    ) {
        for (node_id, control_value, set_value) in tuples {
            let status = self
                .nodes
                .entry(node_id.clone())
                .or_default()
                .entry((control_value, set_value))
                .or_default();
            if !status.wcus.contains(&wrap_cmd_uuid) {
                status.wcus.push(wrap_cmd_uuid);
                trace!(node_id = %node_id, wrap_cmd_uuid = %wrap_cmd_uuid, control_value = %control_value, "WCU registered");
            }
        }
    }

    /// Drop the WCU from the given tuples
    pub fn release<'a>(
        &mut self,
        wrap_cmd_uuid: Uuid,
        tuples: impl IntoIterator<Item = (&'a NodeId, ControlValue, Option<SetPoint>)>,
    ) {
        for (node_id, control_value, set_value) in tuples {
            if let Some(states) = self.nodes.get_mut(node_id) {
                if let Some(status) = states.get_mut(&(control_value, set_value)) {
                    status.wcus.retain(|wcu| *wcu != wrap_cmd_uuid);
                }
            }
            self.prune(node_id);
        }
    }

    /// Drop the WCU from every tuple it appears in
    pub fn release_all(&mut self, wrap_cmd_uuid: Uuid) -> usize {
        let mut released = 0;
        for states in self.nodes.values_mut() {
            for status in states.values_mut() {
                let before = status.wcus.len();
                status.wcus.retain(|wcu| *wcu != wrap_cmd_uuid);
                released += before - status.wcus.len();
            }
            states.retain(|_, status| !status.is_vacant());
        }
        self.nodes.retain(|_, states| !states.is_empty());
        if released > 0 {
            debug!(wrap_cmd_uuid = %wrap_cmd_uuid, released, "WCU released");
        }
        released
    }

    /// Record the element dispatched for a tuple, replacing any previous one
    pub fn reserve_element(
        &mut self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
        element_id: Uuid,
    ) -> Option<Uuid> {
        self.nodes
            .entry(node_id.to_string())
            .or_default()
            .entry((control_value, set_value))
            .or_default()
            .reserved_element
            .replace(element_id)
    }

    /// Clear the reservation if it is still held by `element_id`
    pub fn release_element(
        &mut self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
        element_id: Uuid,
    ) -> bool {
        let released = self
            .nodes
            .get_mut(node_id)
            .and_then(|states| states.get_mut(&(control_value, set_value)))
            .is_some_and(|status| {
                if status.reserved_element == Some(element_id) {
                    status.reserved_element = None;
                    true
                } else {
                    false
                }
            });
        self.prune(node_id);
        released
    }

    pub fn reserved_element(
        &self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
    ) -> Option<Uuid> {
        self.status(node_id, control_value, set_value)
            .and_then(|status| status.reserved_element)
    }

    pub fn status(
        &self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
    ) -> Option<&OverlapStatus> {
        self.nodes
            .get(node_id)
            .and_then(|states| states.get(&(control_value, set_value)))
    }

    /// WCUs depending on a tuple
    pub fn wcus(
        &self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
    ) -> &[Uuid] {
        self.status(node_id, control_value, set_value)
            .map(|status| status.wcus.as_slice())
            .unwrap_or(&[])
    }

    /// Live states of a node, optionally skipping one control value
    pub fn existing_overlaps(
        &self,
        node_id: &str,
        excluding: Option<ControlValue>,
    ) -> Vec<(OverlapKey, &OverlapStatus)> {
        self.nodes
            .get(node_id)
            .map(|states| {
                states
                    .iter()
                    .filter(|((cv, _), status)| Some(*cv) != excluding && !status.is_vacant())
                    .map(|(key, status)| (*key, status))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether no WCU other than `wrap_cmd_uuid` depends on the tuple
    pub fn would_empty_after_removal(
        &self,
        node_id: &str,
        control_value: ControlValue,
        set_value: Option<SetPoint>,
        wrap_cmd_uuid: Uuid,
    ) -> bool {
        self.wcus(node_id, control_value, set_value)
            .iter()
            .all(|wcu| *wcu == wrap_cmd_uuid)
    }

    /// Forget every WCU, keeping in-flight reservations
    pub fn clear_wcus(&mut self) {
        for states in self.nodes.values_mut() {
            for status in states.values_mut() {
                status.wcus.clear();
            }
            states.retain(|_, status| !status.is_vacant());
        }
        self.nodes.retain(|_, states| !states.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of (WCU, tuple) dependencies currently held
    pub fn dependency_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|states| states.values())
            .map(|status| status.wcus.len())
            .sum()
    }

    fn prune(&mut self, node_id: &str) {
        if let Some(states) = self.nodes.get_mut(node_id) {
            states.retain(|_, status| !status.is_vacant());
            if states.is_empty() {
                self.nodes.remove(node_id);
            }
        }
    }
}

fn describe(control_value: ControlValue, set_value: Option<SetPoint>) -> String {
    match set_value {
        Some(sv) => format!("{control_value}({sv})"),
        None => control_value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        id.to_string()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let a = Uuid::new_v4();
        tracker.register(a, [(&v1, ControlValue::True, None)]);
        tracker.register(a, [(&v1, ControlValue::True, None)]);
        assert_eq!(tracker.wcus("V_1", ControlValue::True, None), [a]);
    }

    #[test]
    fn test_duplicate_wcu_detected() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let a = Uuid::new_v4();
        tracker.register(a, [(&v1, ControlValue::True, None)]);
        let err = tracker
            .check_conflicts(a, [(&v1, ControlValue::True, None)])
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateWcu { .. }));
    }

    #[test]
    fn test_conflicting_control_value_rejected() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.register(a, [(&v1, ControlValue::True, None)]);

        let err = tracker
            .check_conflicts(b, [(&v1, ControlValue::False, None)])
            .unwrap_err();
        assert!(matches!(err, EngineError::OverlapConflict { .. }));
        assert!(err.to_string().contains("V_1"));
        assert_eq!(tracker.wcus("V_1", ControlValue::True, None), [a]);

        // sharing the same state is not a conflict
        assert!(tracker
            .check_conflicts(b, [(&v1, ControlValue::True, None)])
            .is_ok());
    }

    #[test]
    fn test_different_set_values_conflict() {
        let mut tracker = OverlapTracker::new();
        let p1 = node("P_1");
        tracker.register(Uuid::new_v4(), [(&p1, ControlValue::Set, Some(SetPoint(40.0)))]);
        assert!(tracker
            .check_conflicts(
                Uuid::new_v4(),
                [(&p1, ControlValue::Set, Some(SetPoint(55.0)))]
            )
            .is_err());
    }

    #[test]
    fn test_in_flight_opposite_state_conflicts() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let closing = Uuid::new_v4();
        // a turn-off element reserves FALSE without any WCU behind it
        tracker.reserve_element("V_1", ControlValue::False, None, closing);
        assert!(tracker.is_contested("V_1", ControlValue::True, None));
        assert!(!tracker.is_contested("V_1", ControlValue::False, None));

        let err = tracker
            .check_conflicts(Uuid::new_v4(), [(&v1, ControlValue::True, None)])
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::OverlapConflict { ref held, .. } if held == "false"
        ));
        assert!(tracker
            .check_conflicts(Uuid::new_v4(), [(&v1, ControlValue::False, None)])
            .is_ok());

        tracker.release_element("V_1", ControlValue::False, None, closing);
        assert!(tracker
            .check_conflicts(Uuid::new_v4(), [(&v1, ControlValue::True, None)])
            .is_ok());
    }

    #[test]
    fn test_release_all_empties_tracker() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let p1 = node("P_1");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.register(a, [(&v1, ControlValue::True, None), (&p1, ControlValue::True, None)]);
        tracker.register(b, [(&v1, ControlValue::True, None)]);

        assert_eq!(tracker.release_all(a), 2);
        assert_eq!(tracker.wcus("V_1", ControlValue::True, None), [b]);
        assert!(tracker.wcus("P_1", ControlValue::True, None).is_empty());

        tracker.release(b, [(&v1, ControlValue::True, None)]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_reservation_overwrite_and_release() {
        let mut tracker = OverlapTracker::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(tracker.reserve_element("V_1", ControlValue::True, None, first), None);
        assert_eq!(
            tracker.reserve_element("V_1", ControlValue::True, None, second),
            Some(first)
        );
        // a stale element cannot clear the newer reservation
        assert!(!tracker.release_element("V_1", ControlValue::True, None, first));
        assert_eq!(tracker.reserved_element("V_1", ControlValue::True, None), Some(second));
        assert!(tracker.release_element("V_1", ControlValue::True, None, second));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_existing_overlaps_excluding() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        tracker.register(Uuid::new_v4(), [(&v1, ControlValue::True, None)]);
        tracker.reserve_element("V_1", ControlValue::False, None, Uuid::new_v4());

        assert_eq!(tracker.existing_overlaps("V_1", None).len(), 2);
        let others = tracker.existing_overlaps("V_1", Some(ControlValue::True));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].0, (ControlValue::False, None));
    }

    #[test]
    fn test_would_empty_after_removal() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.register(a, [(&v1, ControlValue::True, None)]);
        assert!(tracker.would_empty_after_removal("V_1", ControlValue::True, None, a));
        tracker.register(b, [(&v1, ControlValue::True, None)]);
        assert!(!tracker.would_empty_after_removal("V_1", ControlValue::True, None, a));
    }

    #[test]
    fn test_clear_wcus_keeps_reservations() {
        let mut tracker = OverlapTracker::new();
        let v1 = node("V_1");
        let element = Uuid::new_v4();
        tracker.register(Uuid::new_v4(), [(&v1, ControlValue::True, None)]);
        tracker.reserve_element("V_1", ControlValue::True, None, element);
        tracker.clear_wcus();
        assert_eq!(tracker.dependency_count(), 0);
        assert_eq!(tracker.reserved_element("V_1", ControlValue::True, None), Some(element));
    }
}
