//! Physics service: advances every simulated sensor on a fixed tick

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use factory_runtime::{Service, ServiceContext, ServiceResult, ServiceSpec};

use super::ResourceRegistry;

pub const PHYSICS_SERVICE_ID: &str = "simulator/physics";

pub struct PhysicsService {
    registry: Arc<ResourceRegistry>,
    interval: Duration,
    last_tick: Option<Instant>,
}

impl PhysicsService {
    pub fn new(registry: Arc<ResourceRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            last_tick: None,
        }
    }
}

#[async_trait]
impl Service for PhysicsService {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(PHYSICS_SERVICE_ID, "Physics Engine")
            .with_tick_interval(self.interval)
            .with_description("Advances simulated sensors from actuator state")
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        tracing::info!(
            resources = self.registry.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Physics engine started"
        );
        self.last_tick = Some(Instant::now());
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        tracing::info!("Physics engine stopped");
        Ok(())
    }

    async fn on_tick(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        let now = Instant::now();
        // Real elapsed time, so a delayed tick catches up in one step
        let elapsed = self
            .last_tick
            .map(|last| now.duration_since(last))
            .unwrap_or(self.interval);
        self.last_tick = Some(now);

        self.registry.advance_all(elapsed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IslandConfig;
    use crate::protocol::{Method, SwitchState};
    use crate::simulator::physics::WEIGHT_INITIAL;
    use factory_runtime::ServiceManager;
    use serde_json::json;

    const BELT: &str = "/tornitura/isola-1/conveyor/weight-1";
    const MOTOR: &str = "/tornitura/isola-1/conveyor/motor-1";

    fn registry() -> Arc<ResourceRegistry> {
        Arc::new(ResourceRegistry::from_islands(&[
            IslandConfig::new("tornitura", "isola-1").with_counts(0, 0, 1),
        ]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_advance_sensors() {
        let registry = registry();
        let manager = ServiceManager::new();
        manager
            .spawn(PhysicsService::new(Arc::clone(&registry), Duration::from_millis(100)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let loaded = registry.sensor_value(BELT).unwrap();
        assert!(loaded > WEIGHT_INITIAL, "belt still at {loaded}");
        assert!(loaded <= WEIGHT_INITIAL + 4.0 * 1.1);

        registry.handle(Method::Put, MOTOR, Some(&json!({"status": "ON"})));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(registry.sensor_value(BELT), Some(0.0));
        // physics reads actuators but never writes them
        assert_eq!(registry.actuator_state(MOTOR), Some(SwitchState::On));

        manager.shutdown_all().await.unwrap();
    }
}
