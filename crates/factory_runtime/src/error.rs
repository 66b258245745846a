/// Lifecycle failures of a hosted service
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Service id already in use: {0}")]
    AlreadyRunning(String),

    #[error("Service not running: {0}")]
    NotRunning(String),

    #[error("Service did not stop within its shutdown timeout")]
    ShutdownTimeout,

    #[error("Nobody is listening on the event bus")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
