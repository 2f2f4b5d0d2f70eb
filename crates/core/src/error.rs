use thiserror::Error;

/// Errors raised by the device SDK. The cover entity never maps these; they
/// travel to the caller as-is inside [`CommandError::Device`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("connection to hub failed: {0}")]
    Connection(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("device rejected request: {0}")]
    Rejected(String),
    #[error("hub login failed")]
    Auth,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("no device with ain {0}")]
    NotFound(String),
    #[error("background worker failed: {0}")]
    Executor(String),
}
