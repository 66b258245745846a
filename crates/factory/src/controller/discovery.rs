//! Discovery
//!
//! One GET of the resource directory binds virtual devices to live addresses
//! and fills each island's actuator map. Matching is by whole path segment:
//! the island name must be one segment of the path and the internal id must be
//! the last one, so `bin-1` never claims `bin-10` and `isola-1` never claims
//! `isola-1_b`.

use tracing::{debug, info, warn};

use super::ControlError;
use crate::model::{Location, ResourceKind};
use crate::protocol::link_format::{self, Link};
use crate::protocol::{Address, ProtocolError, Transport, WELL_KNOWN_CORE};

/// Outcome of a discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// (island, device name, address)
    pub bound: Vec<(String, String, Address)>,
    /// (island, actuator kind, index, address)
    pub actuators: Vec<(String, ResourceKind, u32, Address)>,
    /// (island, device name)
    pub unbound: Vec<(String, String)>,
}

/// Whether one `/`-separated segment of `path` is exactly `segment`
pub fn has_segment(path: &str, segment: &str) -> bool {
    !segment.is_empty() && path.split('/').any(|s| s == segment)
}

/// Final segment of a path, e.g. `bin-1`
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resource kind advertised by a directory entry, if any
fn link_kind(link: &Link) -> Option<ResourceKind> {
    let rt = link.attr("rt")?;
    match rt.parse() {
        Ok(kind) => Some(kind),
        Err(e) => {
            debug!(href = %link.href, error = %e, "Ignoring directory entry");
            None
        }
    }
}

/// Bind devices and map actuators from already-fetched directory links
pub fn apply_links(
    base: &Address,
    links: &[Link],
    locations: &mut [Location],
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    for link in links {
        let Some(kind) = link_kind(link) else {
            continue;
        };
        let address = base.join(&link.href);
        let path = address.path();
        let leaf = last_segment(path);

        for location in locations.iter_mut() {
            if !has_segment(path, &location.island_name) {
                continue;
            }

            for device in location.devices.iter_mut() {
                if device.kind == kind && device.internal_id == leaf {
                    device.address = Some(address.clone());
                    report.bound.push((
                        location.island_name.clone(),
                        device.name.clone(),
                        address.clone(),
                    ));
                }
            }

            if kind.is_actuator() {
                match address.index_suffix() {
                    Some(index) => {
                        location.map_actuator(kind, index, address.clone());
                        report.actuators.push((
                            location.island_name.clone(),
                            kind,
                            index,
                            address.clone(),
                        ));
                    }
                    None => debug!(address = %address, "Actuator without index suffix"),
                }
            }
        }
    }

    for location in locations.iter() {
        for device in location.unbound_devices() {
            report
                .unbound
                .push((location.island_name.clone(), device.name.clone()));
        }
    }

    report
}

/// Fetch the directory from `base` and apply it
///
/// On failure the locations are left as they were.
pub async fn discover(
    transport: &dyn Transport,
    base: &Address,
    locations: &mut [Location],
) -> Result<DiscoveryReport, ControlError> {
    let directory = base.join(WELL_KNOWN_CORE);
    info!(directory = %directory, "Discovering resources");

    let response = transport
        .get(&directory)
        .await
        .map_err(ControlError::Discovery)?;

    let body = match response.payload {
        Some(serde_json::Value::String(body)) => body,
        other => {
            return Err(ControlError::Discovery(ProtocolError::UnexpectedPayload(
                format!("{other:?}"),
            )));
        }
    };

    let links = link_format::parse(&body).map_err(|e| ControlError::Discovery(e.into()))?;
    debug!(links = links.len(), "Directory parsed");

    let report = apply_links(base, &links, locations);
    for (island, name) in &report.unbound {
        warn!(island = %island, device = %name, "Device not found in directory");
    }
    info!(
        bound = report.bound.len(),
        actuators = report.actuators.len(),
        unbound = report.unbound.len(),
        "Discovery complete"
    );

    Ok(report)
}
