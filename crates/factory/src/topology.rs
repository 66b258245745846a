//! Topology builder
//!
//! Turns island configuration into controller-side [`Location`]s with their
//! virtual devices and policy templates. Pure and deterministic.

use std::time::Duration;

use crate::config::IslandConfig;
use crate::model::{Device, Location, Policy, ResourceKind};

/// Normal and critical policy attached to every device of a sensor kind
pub fn policy_template(kind: ResourceKind) -> (Option<Policy>, Option<Policy>) {
    match kind {
        ResourceKind::BinLevel => (
            Some(Policy::set(80.0, Duration::from_secs(5), ResourceKind::Compactor)),
            Some(Policy::reset(95.0, ResourceKind::BinLevel)),
        ),
        ResourceKind::CoolantTurbidity => (
            Some(Policy::set(15.0, Duration::from_secs(4), ResourceKind::FilterPump)),
            None,
        ),
        ResourceKind::ConveyorWeight => (
            Some(Policy::set(150.0, Duration::from_secs(3), ResourceKind::ConveyorMotor)),
            None,
        ),
        _ => (None, None),
    }
}

/// Internal id of the `index`-th resource of a kind (`bin-2`)
pub fn internal_id(kind: ResourceKind, index: usize) -> String {
    format!("{}-{}", kind.short_name(), index)
}

/// Build one island; `counts` is walked in order, indices are 1-based
pub fn build_location(
    department: &str,
    island_name: &str,
    counts: &[(ResourceKind, usize)],
) -> Location {
    let mut location = Location::new(department, island_name);

    for &(kind, count) in counts {
        if kind.is_actuator() {
            continue;
        }
        let (normal, critical) = policy_template(kind);
        for index in 1..=count {
            let mut device = Device::new(
                format!("{} {}", kind.display_name(), index),
                kind,
                internal_id(kind, index),
            );
            device.normal_policy = normal;
            device.critical_policy = critical;
            location.add_device(device);
        }
    }

    location
}

pub fn build_topology(islands: &[IslandConfig]) -> Vec<Location> {
    islands
        .iter()
        .map(|island| build_location(&island.department, &island.name, &island.counts()))
        .collect()
}
