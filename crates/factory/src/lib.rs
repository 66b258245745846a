//! Smart Factory Floor
//!
//! Simulated sensor/actuator pairs (waste bins + compactors, coolant tanks +
//! filter pumps, conveyor belts + motors) served over a small request/response
//! protocol, and a controller that discovers them, monitors their readings and
//! drives the actuators from threshold policies.
//!
//! - [`simulator`]: resource registry, physics engine and device server
//! - [`controller`]: discovery, monitoring loop and actuation
//! - [`protocol`]: transport trait, UDP and in-process transports, link format
//! - [`floor`]: service wiring for each run mode

// Re-export the service runtime
pub use factory_runtime;

pub mod config;
pub mod controller;
pub mod floor;
pub mod model;
pub mod protocol;
pub mod simulator;
pub mod topology;
pub mod types;

pub use types::{Error, Result};
