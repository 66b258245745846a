use async_trait::async_trait;

use crate::{Event, EventPublisher, ServiceResult, ServiceSpec};

/// Handed to every lifecycle hook
pub struct ServiceContext {
    pub service_id: String,
    publisher: EventPublisher,
}

impl ServiceContext {
    pub fn new(service_id: impl Into<String>, publisher: EventPublisher) -> Self {
        Self {
            service_id: service_id.into(),
            publisher,
        }
    }

    /// Publish an event with this service as its source
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> ServiceResult<()> {
        self.publisher.publish(Event::new(event_type, &self.service_id, data))
    }

    /// Publisher for work that outlives the current hook
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }
}

/// A long-running component with lifecycle hooks
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn spec(&self) -> ServiceSpec;

    /// An error here marks the service `Failed`; `on_stop` is then skipped
    async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    async fn on_stop(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    async fn on_event(&mut self, _ctx: &ServiceContext, _event: Event) -> ServiceResult<()> {
        Ok(())
    }

    /// Errors are logged and the schedule carries on
    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }
}
