use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::device::DeviceLink;
use crate::error::EngineResult;
use crate::events::EventPublisher;
use crate::persistence::{ReadingSink, TracingReadingSink};

/// Shared engine dependencies
///
/// Passed explicitly to every component constructor, so several independent
/// engines can live in one process:
/// - Engine configuration
/// - Lifecycle event publisher
/// - Device link (outbound element commands)
/// - Reading sink (outbound batched readings)
#[derive(Clone)]
pub struct EngineContext {
    /// Engine instance ID
    pub engine_id: Uuid,

    pub config: Arc<EngineConfig>,

    pub event_publisher: Arc<EventPublisher>,

    pub device_link: Arc<dyn DeviceLink>,

    pub reading_sink: Arc<dyn ReadingSink>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine_id", &self.engine_id)
            .field("control_mode", &self.config.engine.control_mode)
            .field("event_subscribers", &self.event_publisher.subscriber_count())
            .field("device_link", &self.device_link)
            .field("reading_sink", &self.reading_sink)
            .finish()
    }
}

impl EngineContext {
    /// Build a context from a validated configuration
    pub fn new(
        config: EngineConfig,
        device_link: Arc<dyn DeviceLink>,
        reading_sink: Arc<dyn ReadingSink>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let event_publisher = Arc::new(EventPublisher::new(config.engine.event_channel_capacity));
        let engine_id = Uuid::new_v4();

        info!(
            engine_id = %engine_id,
            control_mode = %config.engine.control_mode,
            "Engine context initialized"
        );

        Ok(Self {
            engine_id,
            config: Arc::new(config),
            event_publisher,
            device_link,
            reading_sink,
        })
    }

    /// Default configuration with a logging-only reading sink
    pub fn with_device_link(device_link: Arc<dyn DeviceLink>) -> EngineResult<Self> {
        Self::new(
            EngineConfig::default(),
            device_link,
            Arc::new(TracingReadingSink),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDeviceLink;

    #[test]
    fn test_independent_contexts() {
        let a = EngineContext::with_device_link(Arc::new(RecordingDeviceLink::new())).unwrap();
        let b = EngineContext::with_device_link(Arc::new(RecordingDeviceLink::new())).unwrap();
        assert_ne!(a.engine_id, b.engine_id);
        assert!(!Arc::ptr_eq(&a.event_publisher, &b.event_publisher));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.engine.command_buffer_size = 0;
        let result = EngineContext::new(
            config,
            Arc::new(RecordingDeviceLink::new()),
            Arc::new(TracingReadingSink),
        );
        assert!(result.is_err());
    }
}
