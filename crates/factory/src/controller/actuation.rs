//! Actuation executor
//!
//! Actuations run as detached tasks so a restore wait never stalls the
//! monitoring tick. The [`ActuationTracker`] keeps them in a bounded
//! [`JoinSet`] that is reaped every tick and drained on shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use factory_runtime::EventPublisher;

use super::{ControlError, events};
use crate::model::{Action, BusyGuard, Policy};
use crate::protocol::{Address, SwitchState, Transport};

/// One fired policy, ready to execute
#[derive(Debug, Clone)]
pub struct Actuation {
    pub device: String,
    pub island: String,
    pub value: f64,
    pub target: Address,
    pub policy: Policy,
}

/// Run an actuation to completion
///
/// `Reset` is a single POST. `Set` switches the target ON, holds for the
/// restore duration and switches it OFF; OFF is skipped if ON failed.
pub async fn execute(
    transport: &dyn Transport,
    actuation: &Actuation,
) -> Result<(), ControlError> {
    let target = &actuation.target;
    let failed = |source| ControlError::Actuation {
        target: target.to_string(),
        source,
    };

    match actuation.policy.action {
        Action::Reset => {
            transport.post(target).await.map_err(failed)?;
        }
        Action::Set => {
            transport
                .put_status(target, SwitchState::On)
                .await
                .map_err(failed)?;
            debug!(
                address = %target,
                hold_ms = actuation.policy.restore_duration.as_millis() as u64,
                "Actuator ON"
            );

            tokio::time::sleep(actuation.policy.restore_duration).await;

            transport
                .put_status(target, SwitchState::Off)
                .await
                .map_err(failed)?;
        }
    }

    Ok(())
}

pub struct ActuationTracker {
    transport: Arc<dyn Transport>,
    tasks: JoinSet<()>,
    capacity: usize,
    publisher: Option<(EventPublisher, String)>,
}

impl ActuationTracker {
    pub fn new(transport: Arc<dyn Transport>, capacity: usize) -> Self {
        Self {
            transport,
            tasks: JoinSet::new(),
            capacity,
            publisher: None,
        }
    }

    /// Publish lifecycle events under `source`
    pub fn set_publisher(&mut self, publisher: EventPublisher, source: impl Into<String>) {
        self.publisher = Some((publisher, source.into()));
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Collect finished tasks; returns how many were collected
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Actuation task panicked");
            }
            reaped += 1;
        }
        reaped
    }

    /// Spawn an actuation holding `guard` until it ends
    ///
    /// Returns false, and releases the guard, when the tracker is full.
    pub fn launch(&mut self, actuation: Actuation, guard: BusyGuard) -> bool {
        self.reap();
        if self.tasks.len() >= self.capacity {
            warn!(
                device = %actuation.device,
                in_flight = self.tasks.len(),
                "Too many actuations in flight, skipping"
            );
            return false;
        }

        let transport = Arc::clone(&self.transport);
        let publisher = self.publisher.clone();

        self.tasks.spawn(async move {
            let _guard = guard;
            let data = json!({
                "device": actuation.device,
                "island": actuation.island,
                "value": actuation.value,
                "target": actuation.target.to_string(),
                "action": actuation.policy.action,
            });

            info!(
                device = %actuation.device,
                island = %actuation.island,
                value = actuation.value,
                threshold = actuation.policy.threshold,
                address = %actuation.target,
                action = ?actuation.policy.action,
                "Policy fired"
            );
            emit(&publisher, events::ACTUATION_STARTED, data.clone());

            match execute(transport.as_ref(), &actuation).await {
                Ok(()) => {
                    info!(
                        device = %actuation.device,
                        address = %actuation.target,
                        "Actuation finished"
                    );
                    emit(&publisher, events::ACTUATION_FINISHED, data);
                }
                Err(e) => {
                    warn!(device = %actuation.device, error = %e, "Actuation failed");
                    let mut data = data;
                    data["error"] = json!(e.to_string());
                    emit(&publisher, events::ACTUATION_FAILED, data);
                }
            }
        });
        true
    }

    /// Wait for outstanding actuations, aborting whatever is left after `timeout`
    pub async fn drain(&mut self, timeout: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        info!(in_flight = self.tasks.len(), "Waiting for actuations to finish");

        let tasks = &mut self.tasks;
        let finished = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            warn!(remaining = self.tasks.len(), "Aborting unfinished actuations");
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }
}

fn emit(publisher: &Option<(EventPublisher, String)>, event_type: &str, data: serde_json::Value) {
    if let Some((publisher, source)) = publisher {
        // no subscribers is fine
        let _ = publisher.emit(event_type, source.as_str(), data);
    }
}
