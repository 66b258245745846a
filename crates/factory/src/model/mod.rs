//! Controller-side data model: resource kinds, policies, devices, islands

mod device;
mod kind;
mod location;

pub use device::{Action, BusyFlag, BusyGuard, Device, Policy};
pub use kind::{Category, ResourceClass, ResourceKind, UnknownResourceType};
pub use location::Location;
