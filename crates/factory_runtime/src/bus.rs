//! Event bus
//!
//! A process-wide broadcast channel. Services announce what happened
//! (`device/bound`, `actuation/finished`, ...) and anyone holding a receiver
//! sees it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    /// Id of the publishing service
    pub source: String,
    pub data: serde_json::Value,
    /// Unix milliseconds
    pub timestamp: u64,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data,
            timestamp,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key)?.as_str()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key)?.as_f64()
    }
}

/// Cloneable sending side of the bus
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<Event>,
}

impl EventPublisher {
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Fails only when there is no receiver at all
    pub fn publish(&self, event: Event) -> ServiceResult<()> {
        self.tx.send(event).map(drop).map_err(|_| ServiceError::ChannelClosed)
    }

    pub fn emit(
        &self,
        event_type: impl Into<String>,
        source: impl Into<String>,
        data: serde_json::Value,
    ) -> ServiceResult<()> {
        self.publish(Event::new(event_type, source, data))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
