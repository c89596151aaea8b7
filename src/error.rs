use std::io;
use thiserror::Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start bridge (config): {source}")]
    Config { #[from] source: ConfigError },

    #[error("Failed to start bridge (bluetooth): {source}")]
    Device { #[from] source: DeviceError },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,
}

/// Telemetry frame decode failures. The offending frame is discarded and the
/// node keeps its previous sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Telemetry frame is truncated: {actual} of 18 bytes")]
    Truncated { actual: usize },

    #[error("Telemetry field {field} is not a finite number")]
    MalformedField { field: &'static str },
}

/// Actuator response decode failures.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to parse actuator response: {source}")]
    Malformed { #[from] source: serde_json::Error },

    #[error("Actuator response references an unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Actuator response is missing the {field} field")]
    MissingField { field: &'static str },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("The actuator handshake is not complete")]
    NotReady,
}
