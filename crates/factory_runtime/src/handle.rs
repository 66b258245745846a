use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

use crate::{Event, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Failed = 4,
}

impl ServiceState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ServiceState::Starting,
            1 => ServiceState::Running,
            2 => ServiceState::Stopping,
            3 => ServiceState::Stopped,
            _ => ServiceState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        })
    }
}

/// Lock-free state shared between a service task and its handles
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ServiceState::Starting as u8)))
    }

    pub(crate) fn get(&self) -> ServiceState {
        ServiceState::from_raw(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Out-of-band requests to one service task
pub(crate) enum Control {
    /// Deliver an event regardless of subscriptions
    Deliver(Event),
    /// Run `on_tick` now
    Tick,
    Stop,
}

#[derive(Clone)]
pub struct ServiceHandle {
    pub service_id: String,
    control: mpsc::Sender<Control>,
    state: StateCell,
}

impl ServiceHandle {
    pub(crate) fn new(
        service_id: String,
        control: mpsc::Sender<Control>,
        state: StateCell,
    ) -> Self {
        Self {
            service_id,
            control,
            state,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub async fn send_event(&self, event: Event) -> ServiceResult<()> {
        self.send(Control::Deliver(event)).await
    }

    pub async fn force_tick(&self) -> ServiceResult<()> {
        self.send(Control::Tick).await
    }

    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.send(Control::Stop).await
    }

    async fn send(&self, control: Control) -> ServiceResult<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| ServiceError::NotRunning(self.service_id.clone()))
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ServiceState::Starting);

        let shared = cell.clone();
        shared.set(ServiceState::Stopped);
        assert_eq!(cell.get(), ServiceState::Stopped);
        assert!(cell.get().is_terminal());
        assert!(!ServiceState::Stopping.is_terminal());
        assert_eq!(ServiceState::from_raw(200), ServiceState::Failed);
        assert_eq!(ServiceState::Running.to_string(), "running");
    }

    #[tokio::test]
    async fn test_handle_to_finished_task() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = ServiceHandle::new("simulator/physics".into(), tx, StateCell::new());

        let result = handle.force_tick().await;
        assert!(matches!(result, Err(ServiceError::NotRunning(id)) if id == "simulator/physics"));
        assert!(!handle.is_running());
    }
}
