//! Controller service
//!
//! Discovery runs once in `on_start`; every tick is one monitoring pass.
//! Outstanding actuations are awaited in `on_stop`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use factory_runtime::{Service, ServiceContext, ServiceResult, ServiceSpec};

use super::{ActuationTracker, discover, events, poll_once};
use crate::config::ControllerConfig;
use crate::model::Location;
use crate::protocol::{Address, Transport};

pub const CONTROLLER_SERVICE_ID: &str = "controller";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
/// Leaves on_stop room to finish inside the shutdown timeout
const DRAIN_TIMEOUT: Duration = Duration::from_secs(25);

pub struct ControllerService {
    transport: Arc<dyn Transport>,
    target: Address,
    poll_interval: Duration,
    locations: Vec<Location>,
    tracker: ActuationTracker,
}

impl ControllerService {
    pub fn new(
        transport: Arc<dyn Transport>,
        target: Address,
        locations: Vec<Location>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            tracker: ActuationTracker::new(Arc::clone(&transport), config.max_in_flight),
            transport,
            target,
            poll_interval: config.poll_interval(),
            locations,
        }
    }
}

#[async_trait]
impl Service for ControllerService {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(CONTROLLER_SERVICE_ID, "Floor Controller")
            .with_tick_interval(self.poll_interval)
            .with_shutdown_timeout(SHUTDOWN_TIMEOUT)
            .with_description("Monitors devices and drives actuators from policies")
    }

    async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        self.tracker.set_publisher(ctx.publisher(), ctx.service_id.clone());

        let discovered =
            discover(self.transport.as_ref(), &self.target, &mut self.locations).await;
        let report = match discovered {
            Ok(report) => report,
            Err(e) => {
                // keep running; no device is bound so ticks are no-ops
                tracing::error!(target_address = %self.target, error = %e, "Discovery failed");
                return Ok(());
            }
        };

        for (island, device, address) in report.bound {
            let _ = ctx.emit(
                events::DEVICE_BOUND,
                json!({"island": island, "device": device, "address": address.to_string()}),
            );
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        self.tracker.drain(DRAIN_TIMEOUT).await;
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        self.tracker.reap();
        let summary =
            poll_once(self.transport.as_ref(), &mut self.locations, &mut self.tracker).await;
        tracing::debug!(
            read = summary.read,
            failed = summary.failed,
            launched = summary.launched,
            in_flight = self.tracker.in_flight(),
            "Monitoring pass complete"
        );
        Ok(())
    }
}
