//! Resource kinds
//!
//! The closed set of things a factory resource can measure or actuate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a resource reports a value or changes the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceClass {
    Sensor,
    Actuator,
}

/// Category segment of a resource path (`/{dept}/{island}/{category}/...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Waste,
    Coolant,
    Conveyor,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Waste => "waste",
            Category::Coolant => "coolant",
            Category::Conveyor => "conveyor",
        }
    }
}

/// What a resource measures or actuates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    BinLevel,
    Compactor,
    CoolantTurbidity,
    FilterPump,
    ConveyorWeight,
    ConveyorMotor,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::BinLevel,
        ResourceKind::Compactor,
        ResourceKind::CoolantTurbidity,
        ResourceKind::FilterPump,
        ResourceKind::ConveyorWeight,
        ResourceKind::ConveyorMotor,
    ];

    /// The three sensor kinds, in topology order
    pub const SENSORS: [ResourceKind; 3] = [
        ResourceKind::BinLevel,
        ResourceKind::CoolantTurbidity,
        ResourceKind::ConveyorWeight,
    ];

    pub fn class(&self) -> ResourceClass {
        match self {
            ResourceKind::BinLevel
            | ResourceKind::CoolantTurbidity
            | ResourceKind::ConveyorWeight => ResourceClass::Sensor,
            ResourceKind::Compactor | ResourceKind::FilterPump | ResourceKind::ConveyorMotor => {
                ResourceClass::Actuator
            }
        }
    }

    pub fn is_actuator(&self) -> bool {
        self.class() == ResourceClass::Actuator
    }

    /// Resource-type attribute advertised in the directory (`rt=`)
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::BinLevel => "factory.sensor.bin_level",
            ResourceKind::Compactor => "factory.actuator.compactor",
            ResourceKind::CoolantTurbidity => "factory.sensor.coolant_turbidity",
            ResourceKind::FilterPump => "factory.actuator.filter_pump",
            ResourceKind::ConveyorWeight => "factory.sensor.conveyor_weight",
            ResourceKind::ConveyorMotor => "factory.actuator.conveyor_motor",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ResourceKind::BinLevel | ResourceKind::Compactor => Category::Waste,
            ResourceKind::CoolantTurbidity | ResourceKind::FilterPump => Category::Coolant,
            ResourceKind::ConveyorWeight | ResourceKind::ConveyorMotor => Category::Conveyor,
        }
    }

    /// Short name used in resource paths and internal ids (`bin`, `pump`, ...)
    pub fn short_name(&self) -> &'static str {
        match self {
            ResourceKind::BinLevel => "bin",
            ResourceKind::Compactor => "compactor",
            ResourceKind::CoolantTurbidity => "turbidity",
            ResourceKind::FilterPump => "pump",
            ResourceKind::ConveyorWeight => "weight",
            ResourceKind::ConveyorMotor => "motor",
        }
    }

    /// Display name of the physical equipment
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::BinLevel => "Waste Bin",
            ResourceKind::Compactor => "Compactor",
            ResourceKind::CoolantTurbidity => "Coolant Tank",
            ResourceKind::FilterPump => "Filter Pump",
            ResourceKind::ConveyorWeight => "Conveyor Belt",
            ResourceKind::ConveyorMotor => "Conveyor Motor",
        }
    }

    /// Unit of the reading; actuators report a bare on/off level
    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::BinLevel => "%",
            ResourceKind::CoolantTurbidity => "NTU",
            ResourceKind::ConveyorWeight => "kg",
            _ => "",
        }
    }

    /// The other half of this kind's sensor/actuator chain
    pub fn coupled(&self) -> ResourceKind {
        match self {
            ResourceKind::BinLevel => ResourceKind::Compactor,
            ResourceKind::Compactor => ResourceKind::BinLevel,
            ResourceKind::CoolantTurbidity => ResourceKind::FilterPump,
            ResourceKind::FilterPump => ResourceKind::CoolantTurbidity,
            ResourceKind::ConveyorWeight => ResourceKind::ConveyorMotor,
            ResourceKind::ConveyorMotor => ResourceKind::ConveyorWeight,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_parses_back() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.resource_type().parse::<ResourceKind>(), Ok(kind));
        }
        assert!("factory.sensor.humidity".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_every_chain_pairs_a_sensor_with_an_actuator() {
        for sensor in ResourceKind::SENSORS {
            let actuator = sensor.coupled();
            assert_eq!(sensor.class(), ResourceClass::Sensor);
            assert!(actuator.is_actuator());
            assert_eq!(actuator.coupled(), sensor);
            assert_eq!(sensor.category(), actuator.category());
        }
    }

    #[test]
    fn test_naming() {
        assert_eq!(ResourceKind::ConveyorWeight.short_name(), "weight");
        assert_eq!(ResourceKind::CoolantTurbidity.display_name(), "Coolant Tank");
        assert_eq!(ResourceKind::BinLevel.unit(), "%");
        assert_eq!(ResourceKind::FilterPump.category().as_str(), "coolant");
    }
}
