// error.rs
use thiserror::Error;

/// Failure reported by a device capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Capability not supported: {0}")]
    Unsupported(&'static str),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Why a request produced no reply. None of these reach the sender of the
/// request; they are logged and counted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No device id provided")]
    MissingDeviceId,
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
    #[error("No {0} provided")]
    MissingField(&'static str),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid config: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Metrics error: {0}")]
    Metrics(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}
