//! End-to-end: controller against a simulated floor

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use factory::Error;
use factory::config::FactoryConfig;
use factory::controller::{ControllerService, events};
use factory::factory_runtime::{Event, ServiceManager};
use factory::floor;
use factory::protocol::{Address, SwitchState};
use factory::simulator::physics::BIN_BASELINE;
use factory::simulator::{LocalTransport, ResourceRegistry};
use factory::topology::build_topology;

/// Wait for the first event of `event_type` matching `pred`
async fn wait_for(
    rx: &mut broadcast::Receiver<Event>,
    event_type: &str,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if event.event_type == event_type && pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("event did not arrive")
}

fn standalone() -> (Arc<ResourceRegistry>, ControllerService, ServiceManager) {
    let config = FactoryConfig::default();
    let registry = Arc::new(ResourceRegistry::from_islands(&config.islands));
    let local = LocalTransport::new(Arc::clone(&registry));
    let base = local.base_address();
    let controller = ControllerService::new(
        Arc::new(local),
        base,
        build_topology(&config.islands),
        &config.controller,
    );
    (registry, controller, ServiceManager::new())
}

#[tokio::test(start_paused = true)]
async fn compactor_cycles_when_bin_passes_threshold() {
    let (registry, controller, manager) = standalone();
    registry.set_sensor_value("/tornitura/isola-1/waste/bin-2", 85.0);
    let mut rx = manager.subscribe();

    manager.spawn(controller).await.unwrap();

    let mut bound = 0;
    while bound < 12 {
        wait_for(&mut rx, events::DEVICE_BOUND, |_| true).await;
        bound += 1;
    }

    let started = wait_for(&mut rx, events::ACTUATION_STARTED, |_| true).await;
    assert_eq!(started.get_str("device"), Some("Waste Bin 2"));
    assert_eq!(started.get_str("island"), Some("isola-1"));
    assert_eq!(
        started.get_str("target"),
        Some("local://simulator/tornitura/isola-1/waste/compactor-2")
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        registry.actuator_state("/tornitura/isola-1/waste/compactor-2"),
        Some(SwitchState::On)
    );
    // drop back under the threshold so the policy does not fire again
    registry.set_sensor_value("/tornitura/isola-1/waste/bin-2", 30.0);

    let finished = wait_for(&mut rx, events::ACTUATION_FINISHED, |_| true).await;
    assert_eq!(finished.get_str("device"), Some("Waste Bin 2"));
    assert_eq!(
        registry.actuator_state("/tornitura/isola-1/waste/compactor-2"),
        Some(SwitchState::Off)
    );
    // nothing else on the floor crossed a threshold
    for path in registry.paths() {
        if path != "/tornitura/isola-1/waste/compactor-2" {
            assert_ne!(registry.actuator_state(path), Some(SwitchState::On), "{path}");
        }
    }

    manager.shutdown_all().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn critical_bin_is_reset() {
    let (registry, controller, manager) = standalone();
    registry.set_sensor_value("/tornitura/isola-2/waste/bin-1", 97.0);
    let mut rx = manager.subscribe();

    manager.spawn(controller).await.unwrap();

    let finished = wait_for(&mut rx, events::ACTUATION_FINISHED, |e| {
        e.get_str("island") == Some("isola-2")
    })
    .await;
    assert_eq!(finished.get_str("action"), Some("Reset"));
    assert_eq!(
        finished.get_str("target"),
        Some("local://simulator/tornitura/isola-2/waste/bin-1")
    );
    assert_eq!(registry.sensor_value("/tornitura/isola-2/waste/bin-1"), Some(BIN_BASELINE));
    assert_eq!(
        registry.actuator_state("/tornitura/isola-2/waste/compactor-1"),
        Some(SwitchState::Off)
    );

    manager.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn controller_discovers_udp_server() {
    let mut config = FactoryConfig::default();
    config.server.bind = "127.0.0.1:0".parse().unwrap();
    let manager = ServiceManager::new();
    let mut rx = manager.subscribe();

    let (_registry, addr) = floor::start_server(&manager, &config).await.unwrap();
    config.controller.target = Address::udp(addr);
    config.controller.poll_interval_ms = 200;
    floor::start_controller(&manager, &config).await.unwrap();
    assert_eq!(manager.len(), 3);

    let bound = wait_for(&mut rx, events::DEVICE_BOUND, |e| {
        e.get_str("device") == Some("Conveyor Belt 3")
    })
    .await;
    assert_eq!(bound.get_str("island"), Some("isola-2"));
    assert_eq!(
        bound.get_str("address"),
        Some(format!("udp://{addr}/tornitura/isola-2/conveyor/weight-3").as_str())
    );

    manager.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn server_refuses_an_address_in_use() {
    let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut config = FactoryConfig::default();
    config.server.bind = taken.local_addr().unwrap();
    let manager = ServiceManager::new();

    let result = floor::start_server(&manager, &config).await;
    assert!(matches!(result, Err(Error::Io(_))));
    assert!(manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn standalone_binds_the_whole_floor() {
    let config = FactoryConfig::default();
    let manager = ServiceManager::new();
    let mut rx = manager.subscribe();

    let registry = floor::start_standalone(&manager, &config).await.unwrap();
    assert_eq!(manager.len(), 2);

    for _ in 0..12 {
        let bound = wait_for(&mut rx, events::DEVICE_BOUND, |_| true).await;
        assert_eq!(bound.source, "controller");
    }
    // physics is running alongside the controller
    let before = registry.sensor_value("/tornitura/isola-1/waste/bin-1").unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let after = registry.sensor_value("/tornitura/isola-1/waste/bin-1").unwrap();
    assert!(after > before, "{before} -> {after}");

    manager.shutdown_all().await.unwrap();
}
