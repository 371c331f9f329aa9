//! # Data Model
//!
//! Places and their nodes, goal descriptors, and the command hierarchy.

pub mod command;
pub mod goal;
pub mod place;

pub use command::{
    CommandFormat, CommandRequest, CommandTarget, CommandType, ContainerCommand, ContainerSpec,
    ElementCommand, ElementCompletion, SetPoint, WrapCommand, WrapCommandSpec,
};
pub use goal::{Goal, GoalInfo, GoalRange};
pub use place::{NodeId, NodeValue, PlaceId, PlaceNode, PlaceStorage, Thresholds};
