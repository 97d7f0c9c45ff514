#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Pressure-gated acquisition trigger (hardware-agnostic).
//!
//! All hardware goes through `autopress_traits::Sensor` and
//! `autopress_traits::InstrumentConnector`.
//!
//! ## Architecture
//!
//! - **Sensor reader**: one bounded ADC read, scaled by the divider ratio (`sensor`)
//! - **Pressure converter**: log-linear gauge curve (`calibration`)
//! - **Band detector**: edge-triggered Outside/Inside state machine, one per target (`band`)
//! - **Remote trigger client**: session ownership, save and single retry (`trigger`)
//! - **Control loop**: drift-compensated cadence (`runner`)
//! - **Controller**: shared config, status and a worker thread (`controller`)

pub mod band;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod naming;
pub mod reading;
pub mod runner;
pub mod sensor;
pub mod status;
pub mod trigger;
pub mod util;

pub use band::{BandDetector, BandSet, DetectorState, TargetBand, TriggerEvent};
pub use builder::ControlLoopBuilder;
pub use calibration::{CalibrationParameters, voltage_to_pressure};
pub use config::{RunConfig, SharedConfig};
pub use controller::Controller;
pub use error::{
    AutopressError, BuildError, ConnectionError, ConversionError, Result, SensorError,
    TriggerError,
};
pub use naming::SaveNaming;
pub use reading::{PressureReading, SampleReading};
pub use runner::{ControlLoop, CycleReport, RunSummary};
pub use sensor::SensorReader;
pub use status::{
    EventBus, HISTORY_CAPACITY, LoopEvent, LoopStatus, StatusBoard, TriggerRecord,
};
pub use trigger::{RemoteTriggerClient, TriggerOutcome};
