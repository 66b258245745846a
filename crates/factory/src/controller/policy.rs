//! Policy evaluation and target resolution

use super::ControlError;
use crate::model::{Device, Location, Policy};
use crate::protocol::Address;

/// Policy that fires for the device's current value, if any
///
/// The critical policy fires at or above its threshold and suppresses the
/// normal one, which fires strictly above its threshold.
pub fn select_policy(device: &Device) -> Option<Policy> {
    if let Some(critical) = device.critical_policy {
        if device.value >= critical.threshold {
            return Some(critical);
        }
    }
    device
        .normal_policy
        .filter(|normal| device.value > normal.threshold)
}

/// Address a policy acts on
///
/// A policy targeting the device's own kind acts on the device itself;
/// otherwise the actuator with the same index is looked up on the island.
pub fn resolve_target(
    device: &Device,
    location: &Location,
    policy: &Policy,
) -> Result<Address, ControlError> {
    let unresolved = || ControlError::UnresolvedTarget {
        device: device.name.clone(),
        kind: policy.target_kind,
    };

    if policy.target_kind == device.kind {
        return device.address.clone().ok_or_else(unresolved);
    }

    let index = device.index().ok_or_else(unresolved)?;
    location
        .actuator(policy.target_kind, index)
        .cloned()
        .ok_or_else(unresolved)
}
