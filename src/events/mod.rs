//! # Lifecycle Events
//!
//! Typed event feed published by the engine. Consumers subscribe to a
//! broadcast channel; publishing never blocks and never fails when nobody
//! is listening.

pub mod publisher;
pub mod types;

pub use publisher::{EventPublisher, PublishedEvent};
pub use types::EngineEvent;
