//! # Outbound Reading Persistence
//!
//! Refined sensor and actuator readings are buffered and written in batches.
//! The engine never awaits a write: full batches are handed to the sink on a
//! spawned task and failures are logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::constants::NodeStatus;
use crate::error::EngineResult;
use crate::models::{NodeId, NodeValue, PlaceId};

/// One refined reading ready for storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReading {
    pub node_id: NodeId,
    pub place_id: PlaceId,
    pub value: Option<NodeValue>,
    pub status: NodeStatus,
    pub write_date: DateTime<Utc>,
}

#[async_trait]
pub trait ReadingSink: Send + Sync + std::fmt::Debug {
    async fn write_batch(&self, readings: Vec<NodeReading>) -> EngineResult<()>;
}

/// Sink that only logs batch sizes
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReadingSink;

#[async_trait]
impl ReadingSink for TracingReadingSink {
    async fn write_batch(&self, readings: Vec<NodeReading>) -> EngineResult<()> {
        debug!(count = readings.len(), "Reading batch written");
        Ok(())
    }
}

/// Sink that keeps every batch in memory
#[derive(Debug, Default)]
pub struct InMemoryReadingSink {
    batches: Mutex<Vec<Vec<NodeReading>>>,
}

impl InMemoryReadingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<NodeReading>> {
        self.batches.lock().clone()
    }

    pub fn reading_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl ReadingSink for InMemoryReadingSink {
    async fn write_batch(&self, readings: Vec<NodeReading>) -> EngineResult<()> {
        self.batches.lock().push(readings);
        Ok(())
    }
}

/// Accumulates readings until `batch_size` is reached
#[derive(Debug)]
pub struct ReadingBuffer {
    sink: Arc<dyn ReadingSink>,
    batch_size: usize,
    pending: Vec<NodeReading>,
}

impl ReadingBuffer {
    pub fn new(sink: Arc<dyn ReadingSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffer a reading; returns the batch that should be written, if full
    pub fn push(&mut self, reading: NodeReading) -> Option<Vec<NodeReading>> {
        self.pending.push(reading);
        if self.pending.len() >= self.batch_size {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Take whatever is buffered
    pub fn take(&mut self) -> Option<Vec<NodeReading>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Buffer a reading and hand a full batch to the sink in the background
    pub fn record(&mut self, reading: NodeReading) {
        if let Some(batch) = self.push(reading) {
            self.spawn_write(batch);
        }
    }

    /// Hand everything buffered to the sink in the background
    pub fn flush(&mut self) {
        if let Some(batch) = self.take() {
            self.spawn_write(batch);
        }
    }

    fn spawn_write(&self, batch: Vec<NodeReading>) {
        let sink = Arc::clone(&self.sink);
        let count = batch.len();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sink.write_batch(batch).await {
                        error!(error = %e, count, "Failed to write reading batch");
                    }
                });
            }
            Err(_) => {
                error!(count, "No async runtime available, reading batch dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(node_id: &str, value: f64) -> NodeReading {
        NodeReading {
            node_id: node_id.to_string(),
            place_id: "R1".to_string(),
            value: Some(NodeValue::Number(value)),
            status: NodeStatus::Normal,
            write_date: Utc::now(),
        }
    }

    #[test]
    fn test_push_returns_full_batch() {
        let mut buffer = ReadingBuffer::new(Arc::new(TracingReadingSink), 2);
        assert!(buffer.push(reading("WL_1", 1.0)).is_none());
        let batch = buffer.push(reading("WL_1", 2.0)).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.take().is_none());
    }

    #[tokio::test]
    async fn test_record_writes_in_background() {
        let sink = Arc::new(InMemoryReadingSink::new());
        let mut buffer = ReadingBuffer::new(sink.clone(), 2);
        buffer.record(reading("WL_1", 1.0));
        buffer.record(reading("WL_1", 2.0));
        buffer.record(reading("WL_1", 3.0));
        buffer.flush();

        for _ in 0..10 {
            if sink.reading_count() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.reading_count(), 3);
        assert_eq!(sink.batches().len(), 2);
    }
}
