//! Service Manager
//!
//! Owns the event bus and one tokio task per service. Each task is a
//! [`Runner`] that moves its service through
//! `Starting -> Running -> Stopping -> Stopped` (or `Failed`).

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::handle::{Control, StateCell};
use crate::{
    Event, EventPublisher, Service, ServiceContext, ServiceError, ServiceHandle, ServiceResult,
    ServiceSpec, ServiceState,
};

const BUS_CAPACITY: usize = 1024;
const CONTROL_CAPACITY: usize = 64;
/// Slack on top of a service's own shutdown timeout before its task is given up on
const JOIN_SLACK: Duration = Duration::from_secs(1);

struct Registration {
    handle: ServiceHandle,
    task: JoinHandle<ServiceResult<()>>,
    stop_within: Duration,
}

pub struct ServiceManager {
    services: DashMap<String, Registration>,
    halt: broadcast::Sender<()>,
    bus: broadcast::Sender<Event>,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            halt: broadcast::channel(1).0,
            bus: broadcast::channel(BUS_CAPACITY).0,
        }
    }

    pub fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.bus.clone())
    }

    /// Receiver for every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Start a service on its own task
    ///
    /// Returns as soon as the task is spawned; `on_start` runs on that task.
    pub async fn spawn<S: Service>(&self, service: S) -> ServiceResult<ServiceHandle> {
        let spec = service.spec();
        let id = spec.id.clone();
        if self.services.contains_key(&id) {
            return Err(ServiceError::AlreadyRunning(id));
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let state = StateCell::new();
        let handle = ServiceHandle::new(id.clone(), control_tx, state.clone());
        let stop_within = spec.shutdown_timeout;

        let runner = Runner {
            ctx: ServiceContext::new(id.clone(), self.event_publisher()),
            service,
            spec,
            state,
            control_rx,
            halt_rx: self.halt.subscribe(),
            bus_rx: self.bus.subscribe(),
        };
        let task = tokio::spawn(runner.run());

        self.services.insert(
            id,
            Registration {
                handle: handle.clone(),
                task,
                stop_within,
            },
        );
        Ok(handle)
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceHandle> {
        self.services.get(service_id).map(|r| r.handle.clone())
    }

    pub fn publish_event(&self, event: Event) {
        // no subscribers is not an error here
        let _ = self.bus.send(event);
    }

    /// Stop one service and wait for its `on_stop`
    pub async fn stop(&self, service_id: &str) -> ServiceResult<()> {
        let (id, registration) = self
            .services
            .remove(service_id)
            .ok_or_else(|| ServiceError::NotRunning(service_id.to_string()))?;
        // a task that already exited has dropped its receiver
        let _ = registration.handle.shutdown().await;
        join(&id, registration).await
    }

    /// Stop every service; all are awaited and the first error is reported
    pub async fn shutdown_all(&self) -> ServiceResult<()> {
        tracing::info!(count = self.services.len(), "Stopping services");
        let _ = self.halt.send(());

        let ids: Vec<String> = self.services.iter().map(|r| r.key().clone()).collect();
        let mut outcome = Ok(());
        for id in ids {
            if let Some((id, registration)) = self.services.remove(&id) {
                let result = join(&id, registration).await;
                if outcome.is_ok() {
                    outcome = result;
                }
            }
        }
        outcome
    }

    pub fn list(&self) -> Vec<(String, ServiceState)> {
        self.services
            .iter()
            .map(|r| (r.key().clone(), r.handle.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

async fn join(service_id: &str, registration: Registration) -> ServiceResult<()> {
    let Registration { task, stop_within, .. } = registration;
    match tokio::time::timeout(stop_within + JOIN_SLACK, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!(service_id, error = %e, "Service task panicked");
            Err(ServiceError::Internal(e.to_string()))
        }
        Err(_) => {
            tracing::warn!(service_id, "Service task did not finish in time");
            Err(ServiceError::ShutdownTimeout)
        }
    }
}

/// Drives one service from `on_start` to `on_stop`
struct Runner<S> {
    service: S,
    ctx: ServiceContext,
    spec: ServiceSpec,
    state: StateCell,
    control_rx: mpsc::Receiver<Control>,
    halt_rx: broadcast::Receiver<()>,
    bus_rx: broadcast::Receiver<Event>,
}

impl<S: Service> Runner<S> {
    async fn run(mut self) -> ServiceResult<()> {
        if let Err(e) = self.service.on_start(&self.ctx).await {
            tracing::error!(
                service_id = %self.ctx.service_id,
                error = %e,
                "Service failed to start"
            );
            self.state.set(ServiceState::Failed);
            return Err(e);
        }
        self.state.set(ServiceState::Running);
        tracing::info!(
            service_id = %self.ctx.service_id,
            name = %self.spec.name,
            "Service running"
        );

        self.serve().await;
        self.finish().await
    }

    /// Dispatch until told to stop
    async fn serve(&mut self) {
        let mut schedule = self.spec.tick_interval.map(ticker);

        loop {
            tokio::select! {
                _ = self.halt_rx.recv() => return,

                control = self.control_rx.recv() => match control {
                    Some(Control::Deliver(event)) => self.deliver(event).await,
                    Some(Control::Tick) => self.tick().await,
                    Some(Control::Stop) | None => return,
                },

                received = self.bus_rx.recv() => match received {
                    Ok(event) if self.spec.wants(&event.event_type) => self.deliver(event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            service_id = %self.ctx.service_id,
                            missed,
                            "Event bus overrun"
                        );
                    }
                    Err(RecvError::Closed) => return,
                },

                _ = next_tick(schedule.as_mut()) => self.tick().await,
            }
        }
    }

    async fn deliver(&mut self, event: Event) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.service.on_event(&self.ctx, event).await {
            tracing::warn!(
                service_id = %self.ctx.service_id,
                %event_type,
                error = %e,
                "Event handler failed"
            );
        }
    }

    async fn tick(&mut self) {
        if let Err(e) = self.service.on_tick(&self.ctx).await {
            tracing::warn!(service_id = %self.ctx.service_id, error = %e, "Tick failed");
        }
    }

    async fn finish(mut self) -> ServiceResult<()> {
        self.state.set(ServiceState::Stopping);
        let stop = self.service.on_stop(&self.ctx);
        let stopped = tokio::time::timeout(self.spec.shutdown_timeout, stop)
            .await
            .unwrap_or(Err(ServiceError::ShutdownTimeout));

        match &stopped {
            Ok(()) => {
                self.state.set(ServiceState::Stopped);
                tracing::info!(service_id = %self.ctx.service_id, "Service stopped");
            }
            Err(e) => {
                self.state.set(ServiceState::Failed);
                tracing::error!(
                    service_id = %self.ctx.service_id,
                    error = %e,
                    "Service stop failed"
                );
            }
        }
        stopped
    }
}

/// First tick is immediate; an overrunning tick delays the schedule instead of bursting
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
