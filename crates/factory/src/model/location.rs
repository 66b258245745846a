//! Islands: a named group of devices plus the actuators they drive

use std::collections::HashMap;

use super::{Device, ResourceKind};
use crate::protocol::Address;

#[derive(Debug, Clone)]
pub struct Location {
    pub department: String,
    pub island_name: String,
    pub devices: Vec<Device>,
    /// (actuator kind, index) → address; filled by discovery
    pub actuator_map: HashMap<(ResourceKind, u32), Address>,
}

impl Location {
    pub fn new(department: impl Into<String>, island_name: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            island_name: island_name.into(),
            devices: Vec::new(),
            actuator_map: HashMap::new(),
        }
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Record an actuator address; sensor kinds are ignored
    pub fn map_actuator(&mut self, kind: ResourceKind, index: u32, address: Address) -> bool {
        if !kind.is_actuator() {
            return false;
        }
        self.actuator_map.insert((kind, index), address);
        true
    }

    pub fn actuator(&self, kind: ResourceKind, index: u32) -> Option<&Address> {
        self.actuator_map.get(&(kind, index))
    }

    pub fn bound_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_bound())
    }

    pub fn unbound_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| !d.is_bound())
    }
}
