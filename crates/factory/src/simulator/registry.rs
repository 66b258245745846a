//! Resource registry
//!
//! Every simulated resource of the floor, keyed by path. The registry is built
//! once by the composition root and shared by reference with the physics
//! service and the transport front-ends.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::physics::{ActuatorState, SimulatedSensor};
use crate::config::IslandConfig;
use crate::model::ResourceKind;
use crate::protocol::{Method, Response, ResponseCode, StatusPayload, WELL_KNOWN_CORE, link_format};

struct SensorResource {
    name: String,
    title: String,
    model: Mutex<SimulatedSensor>,
    changes: watch::Sender<f64>,
}

struct ActuatorResource {
    name: String,
    title: String,
    kind: ResourceKind,
    state: ActuatorState,
}

enum Resource {
    Sensor(SensorResource),
    Actuator(ActuatorResource),
}

impl Resource {
    fn kind(&self) -> ResourceKind {
        match self {
            Resource::Sensor(sensor) => sensor.model.lock().kind(),
            Resource::Actuator(actuator) => actuator.kind,
        }
    }

    fn title(&self) -> &str {
        match self {
            Resource::Sensor(sensor) => &sensor.title,
            Resource::Actuator(actuator) => &actuator.title,
        }
    }
}

pub struct ResourceRegistry {
    resources: BTreeMap<String, Resource>,
}

fn resource_name(island: &str, kind: ResourceKind, index: usize) -> String {
    format!("{}-{}-{}", island, kind.short_name(), index)
}

fn resource_title(island: &str, kind: ResourceKind, index: usize) -> String {
    format!("{} {} ({})", kind.display_name(), index, island)
}

/// Path of the `index`-th resource of `kind` on an island
pub fn resource_path(
    department: &str,
    island: &str,
    kind: ResourceKind,
    index: usize,
) -> String {
    format!(
        "/{}/{}/{}/{}-{}",
        department,
        island,
        kind.category().as_str(),
        kind.short_name(),
        index
    )
}

impl ResourceRegistry {
    /// Register both halves of every sensor/actuator chain on every island
    pub fn from_islands(islands: &[IslandConfig]) -> Self {
        let mut resources = BTreeMap::new();

        for island in islands {
            for (sensor_kind, count) in island.counts() {
                let actuator_kind = sensor_kind.coupled();
                for index in 1..=count {
                    let state = ActuatorState::default();
                    let Some(model) = SimulatedSensor::new(sensor_kind, state.clone()) else {
                        continue;
                    };

                    resources.insert(
                        resource_path(&island.department, &island.name, actuator_kind, index),
                        Resource::Actuator(ActuatorResource {
                            name: resource_name(&island.name, actuator_kind, index),
                            title: resource_title(&island.name, actuator_kind, index),
                            kind: actuator_kind,
                            state,
                        }),
                    );

                    let (changes, _) = watch::channel(model.value());
                    resources.insert(
                        resource_path(&island.department, &island.name, sensor_kind, index),
                        Resource::Sensor(SensorResource {
                            name: resource_name(&island.name, sensor_kind, index),
                            title: resource_title(&island.name, sensor_kind, index),
                            model: Mutex::new(model),
                            changes,
                        }),
                    );
                }
            }
        }

        debug!(resources = resources.len(), "Resource registry built");
        Self { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Current reading of a sensor
    pub fn sensor_value(&self, path: &str) -> Option<f64> {
        match self.resources.get(path)? {
            Resource::Sensor(sensor) => Some(sensor.model.lock().value()),
            Resource::Actuator(_) => None,
        }
    }

    /// Current state of an actuator
    pub fn actuator_state(&self, path: &str) -> Option<crate::protocol::SwitchState> {
        match self.resources.get(path)? {
            Resource::Actuator(actuator) => Some(actuator.state.status()),
            Resource::Sensor(_) => None,
        }
    }

    /// Receiver that sees every new reading of a sensor
    pub fn watch(&self, path: &str) -> Option<watch::Receiver<f64>> {
        match self.resources.get(path)? {
            Resource::Sensor(sensor) => Some(sensor.changes.subscribe()),
            Resource::Actuator(_) => None,
        }
    }

    /// Overwrite a sensor reading
    pub fn set_sensor_value(&self, path: &str, value: f64) -> bool {
        let Some(Resource::Sensor(sensor)) = self.resources.get(path) else {
            return false;
        };
        let mut model = sensor.model.lock();
        match &mut *model {
            SimulatedSensor::Bin { level: v, .. }
            | SimulatedSensor::Turbidity { ntu: v, .. }
            | SimulatedSensor::Weight { kg: v, .. } => *v = value,
        }
        drop(model);
        sensor.changes.send_replace(value);
        true
    }

    /// Advance every sensor by `elapsed` and publish the new readings
    pub fn advance_all(&self, elapsed: Duration) {
        let mut rng = rand::thread_rng();
        for (path, resource) in &self.resources {
            if let Resource::Sensor(sensor) = resource {
                let value = sensor.model.lock().advance(elapsed, &mut rng);
                sensor.changes.send_replace(value);
                trace!(path = %path, value, "Sensor advanced");
            }
        }
    }

    /// Link-format listing of every resource
    pub fn directory(&self) -> String {
        let links: Vec<_> = self
            .resources
            .iter()
            .map(|(path, resource)| {
                link_format::Link::new(path.as_str())
                    .with_attr("rt", resource.kind().resource_type())
                    .with_attr("title", resource.title())
            })
            .collect();
        link_format::render(&links)
    }

    /// Answer one request
    pub fn handle(&self, method: Method, path: &str, payload: Option<&Value>) -> Response {
        if path == WELL_KNOWN_CORE {
            return match method {
                Method::Get => {
                    Response::with_payload(ResponseCode::Content, Value::String(self.directory()))
                }
                _ => Response::new(ResponseCode::MethodNotAllowed),
            };
        }

        let Some(resource) = self.resources.get(path) else {
            return Response::new(ResponseCode::NotFound);
        };

        match (resource, method) {
            (Resource::Sensor(sensor), Method::Get) => {
                let value = sensor.model.lock().value();
                Response::with_payload(
                    ResponseCode::Content,
                    json!([{
                        "n": sensor.name,
                        "v": value,
                        "u": resource.kind().unit(),
                        "t": chrono::Utc::now().timestamp(),
                    }]),
                )
            }
            (Resource::Sensor(sensor), Method::Post) => {
                let value = sensor.model.lock().reset();
                sensor.changes.send_replace(value);
                info!(path, value, "Sensor reset");
                Response::new(ResponseCode::Changed)
            }
            (Resource::Actuator(actuator), Method::Get) => {
                let on = actuator.state.is_on();
                Response::with_payload(
                    ResponseCode::Content,
                    json!({"status": actuator.state.status(), "v": u8::from(on)}),
                )
            }
            (Resource::Actuator(actuator), Method::Put) => {
                let parsed = payload
                    .cloned()
                    .map(serde_json::from_value::<StatusPayload>);
                match parsed {
                    Some(Ok(StatusPayload { status })) => {
                        actuator.state.switch(status);
                        info!(path, actuator = %actuator.name, ?status, "Actuator switched");
                        Response::new(ResponseCode::Changed)
                    }
                    _ => {
                        debug!(path, "Rejected actuator payload");
                        Response::new(ResponseCode::BadRequest)
                    }
                }
            }
            _ => Response::new(ResponseCode::MethodNotAllowed),
        }
    }
}
