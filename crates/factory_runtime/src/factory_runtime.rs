//! Factory Runtime
//!
//! Hosts the long-running parts of the factory (device server, physics engine,
//! controller). Each one implements [`Service`] and is driven on its own tokio
//! task by the [`ServiceManager`]:
//! - `on_start` runs once before anything else
//! - `on_tick` runs every `tick_interval` and never overlaps the previous tick
//! - `on_event` receives bus events matching the service's subscriptions
//! - `on_stop` runs once on shutdown, bounded by `shutdown_timeout`

mod bus;
mod error;
mod handle;
mod manager;
mod service;
mod spec;

pub use bus::{Event, EventPublisher};
pub use error::{ServiceError, ServiceResult};
pub use handle::{ServiceHandle, ServiceState};
pub use manager::ServiceManager;
pub use service::{Service, ServiceContext};
pub use spec::ServiceSpec;
