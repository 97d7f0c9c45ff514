use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("sensor bus error: {0}")]
    Bus(String),
    #[error("adc channel {0} out of range (1..=8)")]
    InvalidChannel(u8),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("non-finite input voltage: {0}")]
    NonFiniteVoltage(f32),
    #[error("voltage {0} V maps to a non-finite pressure")]
    NonFinitePressure(f32),
    #[error("invalid calibration: {0}")]
    InvalidCalibration(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("timeout connecting to instrument")]
    Timeout,
    #[error("instrument unreachable: {0}")]
    Unreachable(String),
    #[error("instrument identification failed: {0}")]
    Identify(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("timeout waiting for instrument to complete the save")]
    Timeout,
    #[error("instrument rejected the save: {0}")]
    Rejected(String),
    #[error("instrument io error: {0}")]
    Io(String),
}

/// Umbrella error for everything the loop and controller surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AutopressError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor")]
    MissingSensor,
    #[error("missing instrument connector")]
    MissingConnector,
    #[error("missing run config")]
    MissingConfig,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
