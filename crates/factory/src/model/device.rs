//! Virtual devices and their control policies

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceKind;
use crate::protocol::{Address, trailing_index};

/// What an actuation does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Switch ON, hold for the restore duration, switch OFF (PUT twice)
    Set,
    /// Reset the target to its baseline in one step (POST)
    Reset,
}

/// Threshold rule attached to a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub threshold: f64,
    pub restore_duration: Duration,
    pub target_kind: ResourceKind,
    pub action: Action,
}

impl Policy {
    pub const fn set(
        threshold: f64,
        restore_duration: Duration,
        target_kind: ResourceKind,
    ) -> Self {
        Self {
            threshold,
            restore_duration,
            target_kind,
            action: Action::Set,
        }
    }

    pub const fn reset(threshold: f64, target_kind: ResourceKind) -> Self {
        Self {
            threshold,
            restore_duration: Duration::ZERO,
            target_kind,
            action: Action::Reset,
        }
    }
}

/// Busy flag shared between a device and its running actuation
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Mark busy until the returned guard is dropped
    ///
    /// Returns `None` if an actuation already holds the flag.
    pub fn acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }
}

/// Clears the busy flag on drop, whichever way the actuation ends
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A sensor as the controller sees it
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub kind: ResourceKind,
    pub unit: &'static str,
    /// Stable identifier embedded in the resource path (`bin-2`)
    pub internal_id: String,
    /// Set by discovery; unbound devices are never read or acted on
    pub address: Option<Address>,
    pub value: f64,
    pub last_value: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub normal_policy: Option<Policy>,
    pub critical_policy: Option<Policy>,
    pub busy: BusyFlag,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        internal_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: kind.unit(),
            internal_id: internal_id.into(),
            address: None,
            value: 0.0,
            last_value: None,
            last_update: None,
            normal_policy: None,
            critical_policy: None,
            busy: BusyFlag::default(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.address.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Index shared by the device and its coupled actuator (`bin-2` → 2)
    pub fn index(&self) -> Option<u32> {
        trailing_index(&self.internal_id)
    }

    /// Record a new reading and return the rate of change per minute
    ///
    /// The rate is 0 for the first reading and whenever no time has passed.
    pub fn update_value(&mut self, value: f64, now: DateTime<Utc>) -> f64 {
        let previous = self.value;
        let previous_time = self.last_update;

        self.last_value = Some(previous);
        self.value = value;
        self.last_update = Some(now);

        match previous_time {
            Some(then) => {
                let elapsed_ms = (now - then).num_milliseconds();
                if elapsed_ms <= 0 {
                    return 0.0;
                }
                let minutes = elapsed_ms as f64 / 60_000.0;
                (value - previous) / minutes
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn bin() -> Device {
        Device::new("Waste Bin 1", ResourceKind::BinLevel, "bin-1")
    }

    #[test]
    fn test_rate_per_minute() {
        let mut device = bin();
        let t0 = Utc::now();

        assert_eq!(device.update_value(50.0, t0), 0.0);
        let rate = device.update_value(60.0, t0 + TimeDelta::seconds(30));

        assert!((rate - 20.0).abs() < 1e-9);
        assert_eq!(device.last_value, Some(50.0));
        assert_eq!(device.value, 60.0);
        assert_eq!(device.last_update, Some(t0 + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_rate_is_zero_without_elapsed_time() {
        let mut device = bin();
        let t0 = Utc::now();
        device.update_value(10.0, t0);
        assert_eq!(device.update_value(30.0, t0), 0.0);
    }

    #[test]
    fn test_falling_rate_is_negative() {
        let mut device = bin();
        let t0 = Utc::now();
        device.update_value(90.0, t0);
        let rate = device.update_value(60.0, t0 + TimeDelta::minutes(2));
        assert!((rate + 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_busy_flag_guard() {
        let device = bin();
        assert!(!device.is_busy());

        let guard = device.busy.acquire().expect("flag free");
        assert!(device.is_busy());
        assert!(device.busy.acquire().is_none());

        drop(guard);
        assert!(!device.is_busy());
    }

    #[test]
    fn test_index_from_internal_id() {
        assert_eq!(bin().index(), Some(1));
        assert_eq!(Device::new("x", ResourceKind::ConveyorWeight, "weight-12").index(), Some(12));
    }

    #[test]
    fn test_unbound_by_default() {
        let device = bin();
        assert!(!device.is_bound());
        assert_eq!(device.unit, "%");
    }
}
