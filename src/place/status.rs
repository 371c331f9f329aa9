//! Node status evaluation.
//!
//! Pure function of a node's live value and configured thresholds. Checks run
//! in order and the first match wins; absent thresholds never match.

use crate::constants::NodeStatus;
use crate::models::{NodeValue, PlaceNode, Thresholds};

pub fn evaluate(node: &PlaceNode) -> NodeStatus {
    evaluate_value(node.value.as_ref(), node.device_error.is_some(), &node.thresholds)
}

pub fn evaluate_value(
    value: Option<&NodeValue>,
    device_error: bool,
    thresholds: &Thresholds,
) -> NodeStatus {
    let Some(value) = value else {
        return NodeStatus::Unknown;
    };
    if device_error {
        return NodeStatus::Error;
    }
    let Some(current) = value.as_number() else {
        // non-numeric text cannot cross a numeric bound
        return NodeStatus::Normal;
    };

    let over = |bound: Option<f64>| bound.is_some_and(|b| current >= b);
    let under = |bound: Option<f64>| bound.is_some_and(|b| current <= b);

    if over(thresholds.max) {
        NodeStatus::MaxOver
    } else if over(thresholds.upper_limit) {
        NodeStatus::UpperLimitOver
    } else if under(thresholds.min) {
        NodeStatus::MinUnder
    } else if under(thresholds.lower_limit) {
        NodeStatus::LowerLimitUnder
    } else {
        NodeStatus::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Thresholds {
        Thresholds {
            max: Some(10.0),
            upper_limit: Some(8.0),
            set: Some(5.0),
            lower_limit: Some(2.0),
            min: Some(1.0),
        }
    }

    fn status(value: f64, thresholds: &Thresholds) -> NodeStatus {
        evaluate_value(Some(&NodeValue::Number(value)), false, thresholds)
    }

    #[test]
    fn test_full_threshold_chain() {
        let t = full();
        assert_eq!(status(10.0, &t), NodeStatus::MaxOver);
        assert_eq!(status(12.0, &t), NodeStatus::MaxOver);
        assert_eq!(status(8.0, &t), NodeStatus::UpperLimitOver);
        assert_eq!(status(5.0, &t), NodeStatus::Normal);
        assert_eq!(status(2.0, &t), NodeStatus::LowerLimitUnder);
        assert_eq!(status(1.0, &t), NodeStatus::MinUnder);
        assert_eq!(status(-3.0, &t), NodeStatus::MinUnder);
    }

    #[test]
    fn test_absent_thresholds_are_skipped() {
        let only_upper = Thresholds {
            upper_limit: Some(8.0),
            ..Default::default()
        };
        assert_eq!(status(100.0, &only_upper), NodeStatus::UpperLimitOver);
        assert_eq!(status(-100.0, &only_upper), NodeStatus::Normal);
        assert_eq!(status(-100.0, &Thresholds::default()), NodeStatus::Normal);
    }

    #[test]
    fn test_missing_value_is_unknown_before_error() {
        assert_eq!(evaluate_value(None, true, &full()), NodeStatus::Unknown);
        assert_eq!(
            evaluate_value(Some(&NodeValue::Number(5.0)), true, &full()),
            NodeStatus::Error
        );
    }

    #[test]
    fn test_numeric_text_is_compared() {
        assert_eq!(
            evaluate_value(Some(&NodeValue::from("9")), false, &full()),
            NodeStatus::UpperLimitOver
        );
        assert_eq!(
            evaluate_value(Some(&NodeValue::from("OPEN")), false, &full()),
            NodeStatus::Normal
        );
    }
}
