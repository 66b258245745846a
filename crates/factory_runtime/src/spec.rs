use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How the manager should drive a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unique id, e.g. `simulator/physics`
    pub id: String,
    pub name: String,
    /// Period of `on_tick`; `None` means the service never ticks
    pub tick_interval: Option<Duration>,
    /// Event-type globs routed to `on_event`, e.g. `actuation/*`
    pub subscriptions: Vec<String>,
    /// Upper bound for `on_stop`
    pub shutdown_timeout: Duration,
    pub description: String,
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tick_interval: None,
            subscriptions: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            description: String::new(),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn subscribe(mut self, pattern: impl Into<String>) -> Self {
        self.subscriptions.push(pattern.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether an event type falls under one of the subscriptions
    pub fn wants(&self, event_type: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|pattern| wildmatch::WildMatch::new(pattern).matches(event_type))
    }
}
