//! Timestamped samples flowing through one cycle.

use std::time::Instant;

/// One ADC sample, already scaled back to the gauge output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleReading {
    pub at: Instant,
    pub channel: u8,
    /// Voltage at the ADC pin, for diagnostics.
    pub raw_v: f32,
    /// Gauge output (`raw_v * divider_ratio`).
    pub voltage: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    pub at: Instant,
    pub voltage: f32,
    pub pressure_mbar: f64,
}
