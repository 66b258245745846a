//! Physics engine
//!
//! Each simulated sensor drifts with time and is pulled back by its coupled
//! actuator while that actuator is ON. Sensors only read actuator state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::model::ResourceKind;
use crate::protocol::SwitchState;

// Waste bin, percent full
pub const BIN_MAX: f64 = 100.0;
pub const BIN_FILL_RATE: f64 = 1.2;
pub const BIN_FILL_JITTER: f64 = 0.6;
pub const BIN_COMPACT_RATE: f64 = 6.0;
pub const BIN_COMPACT_FLOOR: f64 = 10.0;
pub const BIN_BASELINE: f64 = 2.0;
pub const BIN_INITIAL: f64 = 20.0;

// Coolant turbidity, NTU
pub const TURBIDITY_MAX: f64 = 50.0;
pub const TURBIDITY_RISE_RATE: f64 = 0.6;
pub const TURBIDITY_FILTER_RATE: f64 = 3.0;
pub const TURBIDITY_FLOOR: f64 = 1.0;
pub const TURBIDITY_BASELINE: f64 = 1.0;
pub const TURBIDITY_INITIAL: f64 = 5.0;

// Conveyor load, kg
pub const WEIGHT_MAX: f64 = 250.0;
pub const WEIGHT_LOAD_RATE: f64 = 4.0;
pub const WEIGHT_UNLOAD_RATE: f64 = 25.0;
pub const WEIGHT_FLOOR: f64 = 0.0;
pub const WEIGHT_BASELINE: f64 = 0.0;
pub const WEIGHT_INITIAL: f64 = 40.0;

/// On/off state of a simulated actuator, shared with the sensor it drives
#[derive(Debug, Clone, Default)]
pub struct ActuatorState(Arc<AtomicBool>);

impl ActuatorState {
    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SwitchState {
        if self.is_on() {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }

    pub fn switch(&self, status: SwitchState) {
        self.0.store(status == SwitchState::On, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub enum SimulatedSensor {
    Bin { level: f64, compactor: ActuatorState },
    Turbidity { ntu: f64, pump: ActuatorState },
    Weight { kg: f64, motor: ActuatorState },
}

impl SimulatedSensor {
    /// Sensor of `kind` at its initial reading; `None` for actuator kinds
    pub fn new(kind: ResourceKind, actuator: ActuatorState) -> Option<Self> {
        match kind {
            ResourceKind::BinLevel => Some(SimulatedSensor::Bin {
                level: BIN_INITIAL,
                compactor: actuator,
            }),
            ResourceKind::CoolantTurbidity => Some(SimulatedSensor::Turbidity {
                ntu: TURBIDITY_INITIAL,
                pump: actuator,
            }),
            ResourceKind::ConveyorWeight => Some(SimulatedSensor::Weight {
                kg: WEIGHT_INITIAL,
                motor: actuator,
            }),
            _ => None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            SimulatedSensor::Bin { .. } => ResourceKind::BinLevel,
            SimulatedSensor::Turbidity { .. } => ResourceKind::CoolantTurbidity,
            SimulatedSensor::Weight { .. } => ResourceKind::ConveyorWeight,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            SimulatedSensor::Bin { level, .. } => *level,
            SimulatedSensor::Turbidity { ntu, .. } => *ntu,
            SimulatedSensor::Weight { kg, .. } => *kg,
        }
    }

    pub fn actuator(&self) -> &ActuatorState {
        match self {
            SimulatedSensor::Bin { compactor, .. } => compactor,
            SimulatedSensor::Turbidity { pump, .. } => pump,
            SimulatedSensor::Weight { motor, .. } => motor,
        }
    }

    /// Move the reading forward by `elapsed` and return it
    pub fn advance<R: Rng + ?Sized>(&mut self, elapsed: Duration, rng: &mut R) -> f64 {
        let dt = elapsed.as_secs_f64();
        match self {
            SimulatedSensor::Bin { level, compactor } => {
                *level = if compactor.is_on() {
                    drain(*level, BIN_COMPACT_RATE * dt, BIN_COMPACT_FLOOR)
                } else {
                    let rate = BIN_FILL_RATE + rng.gen_range(0.0..BIN_FILL_JITTER);
                    (*level + rate * dt).min(BIN_MAX)
                };
                *level
            }
            SimulatedSensor::Turbidity { ntu, pump } => {
                *ntu = if pump.is_on() {
                    drain(*ntu, TURBIDITY_FILTER_RATE * dt, TURBIDITY_FLOOR)
                } else {
                    (*ntu + TURBIDITY_RISE_RATE * dt).min(TURBIDITY_MAX)
                };
                *ntu
            }
            SimulatedSensor::Weight { kg, motor } => {
                *kg = if motor.is_on() {
                    drain(*kg, WEIGHT_UNLOAD_RATE * dt, WEIGHT_FLOOR)
                } else {
                    (*kg + WEIGHT_LOAD_RATE * dt).min(WEIGHT_MAX)
                };
                *kg
            }
        }
    }

    /// Return the reading to its baseline
    pub fn reset(&mut self) -> f64 {
        match self {
            SimulatedSensor::Bin { level, .. } => {
                *level = BIN_BASELINE;
                *level
            }
            SimulatedSensor::Turbidity { ntu, .. } => {
                *ntu = TURBIDITY_BASELINE;
                *ntu
            }
            SimulatedSensor::Weight { kg, .. } => {
                *kg = WEIGHT_BASELINE;
                *kg
            }
        }
    }
}

/// Lower `value` by `amount`, stopping at `floor`; values already below stay put
fn drain(value: f64, amount: f64, floor: f64) -> f64 {
    if value <= floor {
        value
    } else {
        (value - amount).max(floor)
    }
}
