//! Crate-wide error and result types

use factory_runtime::ServiceError;

use crate::config::ConfigError;
use crate::protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

pub type Result<T> = std::result::Result<T, Error>;
