use proptest::prelude::*;

use brinectl_core::constants::ControlValue;

pub const ACTUATORS: &[&str] = &["V_R1_IN", "V_R1_OUT", "PU_R1", "PU_SEA", "G_P1", "G_P2"];

/// One of the fixture's actuator ids
pub fn actuator_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(ACTUATORS).prop_map(str::to_string)
}

/// Binary control values only; MEASURE and SET never take part in overlap
pub fn binary_control_strategy() -> impl Strategy<Value = ControlValue> {
    prop_oneof![Just(ControlValue::True), Just(ControlValue::False)]
}

/// (command slot, actuator, control value) registrations across a few commands
pub fn registration_strategy() -> impl Strategy<Value = Vec<(usize, String, ControlValue)>> {
    prop::collection::vec(
        (0usize..4, actuator_strategy(), binary_control_strategy()),
        1..24,
    )
}

/// Any ordering of `len` element positions
pub fn ack_order_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}
