//! Controller
//!
//! Discovers the simulated floor, polls every bound device once per tick and
//! drives actuators from each device's threshold policies.
//!
//! Per device the controller cycles `Idle → Busy → Idle`: a policy fires only
//! while the device is idle, and the device stays busy until its actuation task
//! finishes (ON, restore wait, OFF; or a single reset).

mod actuation;
mod discovery;
mod monitor;
mod policy;
mod service;

pub use actuation::{Actuation, ActuationTracker, execute};
pub use discovery::{DiscoveryReport, apply_links, discover, has_segment, last_segment};
pub use monitor::{TickSummary, poll_once};
pub use policy::{resolve_target, select_policy};
pub use service::{CONTROLLER_SERVICE_ID, ControllerService};

use crate::model::ResourceKind;
use crate::protocol::ProtocolError;

/// Event types published on the service bus
pub mod events {
    pub const DEVICE_BOUND: &str = "device/bound";
    pub const ACTUATION_STARTED: &str = "actuation/started";
    pub const ACTUATION_FINISHED: &str = "actuation/finished";
    pub const ACTUATION_FAILED: &str = "actuation/failed";
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Directory fetch or parse failed; discovery ends with what it has
    #[error("discovery failed: {0}")]
    Discovery(#[source] ProtocolError),

    #[error("reading {device} failed: {source}")]
    Read {
        device: String,
        #[source]
        source: ProtocolError,
    },

    #[error("actuation on {target} failed: {source}")]
    Actuation {
        target: String,
        #[source]
        source: ProtocolError,
    },

    #[error("no {kind} target for {device}")]
    UnresolvedTarget { device: String, kind: ResourceKind },
}
