//! # Place Graph
//!
//! Physical topology (places, nodes, loggers, routes, presets) and the node
//! status evaluator that classifies live values against thresholds.

pub mod graph;
pub mod status;

pub use graph::{PlaceGraph, StatusChange};
pub use status::evaluate;
