//! Device simulator
//!
//! The server side of the floor: a [`ResourceRegistry`] of simulated resources,
//! the [`PhysicsService`] that moves sensor readings, and two front-ends
//! ([`DeviceServer`] over UDP, [`LocalTransport`] in-process).

mod local;
pub mod physics;
mod registry;
mod server;
mod service;

pub use local::{LOCAL_AUTHORITY, LocalTransport};
pub use physics::{ActuatorState, SimulatedSensor};
pub use registry::{ResourceRegistry, resource_path};
pub use server::{DeviceServer, SERVER_SERVICE_ID};
pub use service::{PHYSICS_SERVICE_ID, PhysicsService};
