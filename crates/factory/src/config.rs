//! Configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `FACTORY_`-prefixed environment variables (`__` separates nesting, e.g.
//! `FACTORY_CONTROLLER__TARGET=udp://10.0.0.5:5683`).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::model::ResourceKind;
use crate::protocol::Address;

/// File picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "factory.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub islands: Vec<IslandConfig>,
}

/// Simulated device server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// UDP address the device server listens on
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Physics tick period
    #[serde(default = "default_physics_interval_ms")]
    pub physics_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Base address of the device server to discover
    #[serde(default = "default_target")]
    pub target: Address,
    /// Monitoring tick period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on concurrently running actuations
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// One island and how many of each chain it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IslandConfig {
    pub department: String,
    pub name: String,
    #[serde(default)]
    pub bin: usize,
    #[serde(default)]
    pub coolant: usize,
    #[serde(default)]
    pub conveyor: usize,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5683))
}

fn default_physics_interval_ms() -> u64 {
    100
}

fn default_target() -> Address {
    Address::udp(default_bind())
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            physics_interval_ms: default_physics_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn physics_interval(&self) -> Duration {
        Duration::from_millis(self.physics_interval_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl ControllerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl IslandConfig {
    pub fn new(department: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            name: name.into(),
            bin: 0,
            coolant: 0,
            conveyor: 0,
        }
    }

    pub fn with_counts(mut self, bin: usize, coolant: usize, conveyor: usize) -> Self {
        self.bin = bin;
        self.coolant = coolant;
        self.conveyor = conveyor;
        self
    }

    /// Sensor kind → count, in build order
    pub fn counts(&self) -> [(ResourceKind, usize); 3] {
        [
            (ResourceKind::BinLevel, self.bin),
            (ResourceKind::CoolantTurbidity, self.coolant),
            (ResourceKind::ConveyorWeight, self.conveyor),
        ]
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            controller: ControllerConfig::default(),
            islands: vec![
                IslandConfig::new("tornitura", "isola-1").with_counts(3, 2, 1),
                IslandConfig::new("tornitura", "isola-2").with_counts(1, 2, 3),
            ],
        }
    }
}

impl FactoryConfig {
    /// Load and validate the layered configuration
    ///
    /// An explicit `path` must exist; without one, `factory.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(FactoryConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()).into());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
                }
            }
        }

        let config: FactoryConfig = figment
            .merge(Env::prefixed("FACTORY_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.physics_interval_ms == 0 {
            return Err(ConfigError::Invalid("server.physics_interval_ms must be > 0".into()));
        }
        if self.controller.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("controller.poll_interval_ms must be > 0".into()));
        }
        if self.controller.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("controller.request_timeout_ms must be > 0".into()));
        }
        if self.controller.max_in_flight == 0 {
            return Err(ConfigError::Invalid("controller.max_in_flight must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for island in &self.islands {
            if island.name.trim().is_empty() || island.department.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "island and department names must not be empty".into(),
                ));
            }
            if island.name.contains('/') || island.department.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "island {}/{}: names must be single path segments",
                    island.department, island.name
                )));
            }
            if !seen.insert(island.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate island name: {}", island.name)));
            }
        }

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
