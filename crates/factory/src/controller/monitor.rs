//! Monitoring pass
//!
//! Reads every bound device in order, records the reading and its rate, and
//! hands idle devices whose policy fired to the actuation tracker.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Actuation, ActuationTracker, ControlError, resolve_target, select_policy};
use crate::model::Location;
use crate::protocol::{ProtocolError, Transport, extract_reading};

/// Counters for one monitoring pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub read: usize,
    pub failed: usize,
    pub launched: usize,
}

pub async fn poll_once(
    transport: &dyn Transport,
    locations: &mut [Location],
    tracker: &mut ActuationTracker,
) -> TickSummary {
    let mut summary = TickSummary::default();

    for location in locations.iter_mut() {
        for i in 0..location.devices.len() {
            let device = &mut location.devices[i];
            let Some(address) = device.address.clone() else {
                continue;
            };

            let reading = match transport.get(&address).await {
                Ok(response) => response
                    .payload
                    .as_ref()
                    .ok_or_else(|| ProtocolError::UnexpectedPayload("empty".into()))
                    .and_then(extract_reading),
                Err(e) => Err(e),
            };
            let value = match reading {
                Ok(value) => value,
                Err(source) => {
                    let e = ControlError::Read {
                        device: device.name.clone(),
                        source,
                    };
                    warn!(island = %location.island_name, error = %e, "Read failed");
                    summary.failed += 1;
                    continue;
                }
            };

            let rate = device.update_value(value, Utc::now());
            summary.read += 1;
            info!(
                island = %location.island_name,
                device = %device.name,
                value,
                unit = device.unit,
                rate,
                "Reading"
            );

            if device.is_busy() {
                debug!(device = %device.name, "Actuation in progress, not evaluating");
                continue;
            }

            let device = &location.devices[i];
            let Some(policy) = select_policy(device) else {
                continue;
            };
            let target = match resolve_target(device, location, &policy) {
                Ok(target) => target,
                Err(e) => {
                    debug!(error = %e, "Policy has no target");
                    continue;
                }
            };
            let Some(guard) = device.busy.acquire() else {
                continue;
            };

            let actuation = Actuation {
                device: device.name.clone(),
                island: location.island_name.clone(),
                value: device.value,
                target,
                policy,
            };
            if tracker.launch(actuation, guard) {
                summary.launched += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::IslandConfig;
    use crate::controller::discover;
    use crate::model::ResourceKind;
    use crate::protocol::{Address, ProtocolResult, Request, Response, SwitchState};
    use crate::simulator::physics::BIN_BASELINE;
    use crate::simulator::{LocalTransport, ResourceRegistry};
    use crate::topology::{build_location, build_topology};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const BIN_1: &str = "/tornitura/isola-1/waste/bin-1";
    const BIN_2: &str = "/tornitura/isola-1/waste/bin-2";
    const TURBIDITY_1: &str = "/tornitura/isola-1/coolant/turbidity-1";
    const PUMP_1: &str = "/tornitura/isola-1/coolant/pump-1";

    /// Local transport that remembers every path it was asked for
    struct Spy {
        inner: LocalTransport,
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Spy {
        async fn request(&self, request: Request) -> ProtocolResult<Response> {
            self.paths.lock().push(request.address.path().to_string());
            self.inner.request(request).await
        }
    }

    async fn floor() -> (Arc<Spy>, Arc<ResourceRegistry>, Vec<Location>) {
        island_with(2, 0, 0).await
    }

    /// One discovered island with the given bin, coolant and conveyor counts
    async fn island_with(
        bin: usize,
        coolant: usize,
        conveyor: usize,
    ) -> (Arc<Spy>, Arc<ResourceRegistry>, Vec<Location>) {
        let islands =
            [IslandConfig::new("tornitura", "isola-1").with_counts(bin, coolant, conveyor)];
        let registry = Arc::new(ResourceRegistry::from_islands(&islands));
        let spy = Arc::new(Spy {
            inner: LocalTransport::new(Arc::clone(&registry)),
            paths: Mutex::new(Vec::new()),
        });
        let mut locations = build_topology(&islands);
        discover(spy.as_ref(), &spy.inner.base_address(), &mut locations)
            .await
            .unwrap();
        spy.paths.lock().clear();
        (spy, registry, locations)
    }

    #[tokio::test]
    async fn test_reads_in_order_and_records_values() {
        let (spy, registry, mut locations) = floor().await;
        registry.set_sensor_value(BIN_2, 42.0);
        let mut tracker = ActuationTracker::new(spy.clone(), 8);

        let summary = poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary, TickSummary { read: 2, failed: 0, launched: 0 });
        assert_eq!(*spy.paths.lock(), [BIN_1, BIN_2]);
        assert_eq!(locations[0].devices[1].value, 42.0);
        assert_eq!(locations[0].devices[1].last_value, Some(0.0));
        assert!(locations[0].devices[1].last_update.is_some());
    }

    #[tokio::test]
    async fn test_unbound_device_is_never_read() {
        let (spy, _, mut locations) = floor().await;
        locations[0].devices[0].address = None;
        let mut tracker = ActuationTracker::new(spy.clone(), 8);

        let summary = poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary.read, 1);
        assert_eq!(*spy.paths.lock(), [BIN_2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_and_skips_busy_devices() {
        let (spy, registry, mut locations) = floor().await;
        registry.set_sensor_value(BIN_1, 85.0);
        let mut tracker = ActuationTracker::new(spy.clone(), 8);

        let summary = poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary.launched, 1);
        assert!(locations[0].devices[0].is_busy());

        // still above threshold, but busy
        tokio::time::sleep(Duration::from_secs(1)).await;
        let summary = poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary.launched, 0);
        assert_eq!(
            registry.actuator_state("/tornitura/isola-1/waste/compactor-1"),
            Some(SwitchState::On)
        );

        tracker.drain(Duration::from_secs(10)).await;
        assert!(!locations[0].devices[0].is_busy());
        assert_eq!(
            registry.actuator_state("/tornitura/isola-1/waste/compactor-1"),
            Some(SwitchState::Off)
        );
    }

    #[tokio::test]
    async fn test_critical_resets_instead_of_compacting() {
        let (spy, registry, mut locations) = floor().await;
        registry.set_sensor_value(BIN_1, 97.0);
        let mut tracker = ActuationTracker::new(spy.clone(), 8);

        poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        tracker.drain(Duration::from_secs(1)).await;

        assert_eq!(registry.sensor_value(BIN_1), Some(BIN_BASELINE));
        assert_eq!(
            registry.actuator_state("/tornitura/isola-1/waste/compactor-1"),
            Some(SwitchState::Off)
        );
        let paths = spy.paths.lock();
        assert!(!paths.iter().any(|p| p.contains("compactor")));
    }

    #[tokio::test]
    async fn test_read_failure_skips_device() {
        let islands = [IslandConfig::new("tornitura", "isola-1").with_counts(1, 0, 0)];
        let registry = Arc::new(ResourceRegistry::from_islands(&islands));
        let transport = Arc::new(LocalTransport::new(registry));
        let mut locations =
            vec![build_location("tornitura", "isola-1", &[(ResourceKind::BinLevel, 1)])];
        locations[0].devices[0].address =
            Some(Address::parse("local://simulator/tornitura/isola-1/waste/bin-7").unwrap());
        let mut tracker = ActuationTracker::new(transport.clone(), 8);

        let summary = poll_once(transport.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary, TickSummary { read: 0, failed: 1, launched: 0 });
        assert_eq!(locations[0].devices[0].last_update, None);
    }

    #[tokio::test]
    async fn test_missing_actuator_leaves_device_idle() {
        let (spy, registry, mut locations) = island_with(0, 1, 0).await;
        // the filter pump was never discovered
        locations[0].actuator_map.clear();
        registry.set_sensor_value(TURBIDITY_1, 20.0);
        let mut tracker = ActuationTracker::new(spy.clone(), 8);

        let summary = poll_once(spy.as_ref(), &mut locations, &mut tracker).await;
        assert_eq!(summary, TickSummary { read: 1, failed: 0, launched: 0 });
        assert!(!locations[0].devices[0].is_busy());
        assert_eq!(tracker.in_flight(), 0);
        // the read was the only request
        assert_eq!(*spy.paths.lock(), [TURBIDITY_1]);
        assert_eq!(registry.actuator_state(PUMP_1), Some(SwitchState::Off));
    }
}
