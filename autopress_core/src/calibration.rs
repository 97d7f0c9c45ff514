//! Gauge transfer curve.
//!
//! The active gauge reports pressure logarithmically:
//! `pressure_mbar = 10 ^ ((V - offset_v) / slope_v_per_decade)`,
//! where `V` is the gauge output. The ADC sees that output through a
//! potential divider, so the sensor reader multiplies by `divider_ratio`
//! before the converter runs.

use crate::error::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParameters {
    /// Factor undoing the divider between gauge and ADC.
    pub divider_ratio: f64,
    pub offset_v: f64,
    pub slope_v_per_decade: f64,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            divider_ratio: 2.0,
            offset_v: 7.75,
            slope_v_per_decade: 0.75,
        }
    }
}

impl CalibrationParameters {
    pub fn validate(&self) -> Result<(), ConversionError> {
        if !(self.divider_ratio.is_finite() && self.divider_ratio > 0.0) {
            return Err(ConversionError::InvalidCalibration(
                "divider_ratio must be finite and > 0",
            ));
        }
        if !self.offset_v.is_finite() {
            return Err(ConversionError::InvalidCalibration(
                "offset_v must be finite",
            ));
        }
        if !self.slope_v_per_decade.is_finite() || self.slope_v_per_decade == 0.0 {
            return Err(ConversionError::InvalidCalibration(
                "slope_v_per_decade must be finite and non-zero",
            ));
        }
        Ok(())
    }

    /// Gauge output that corresponds to `pressure_mbar`.
    pub fn pressure_to_voltage(&self, pressure_mbar: f64) -> f64 {
        self.offset_v + self.slope_v_per_decade * pressure_mbar.log10()
    }
}

/// Convert a scaled gauge voltage to pressure in mbar.
///
/// Never clamps: anything finite the curve produces is returned as is.
#[inline]
pub fn voltage_to_pressure(
    voltage: f32,
    cal: &CalibrationParameters,
) -> Result<f64, ConversionError> {
    if !voltage.is_finite() {
        return Err(ConversionError::NonFiniteVoltage(voltage));
    }
    let exponent = (f64::from(voltage) - cal.offset_v) / cal.slope_v_per_decade;
    let p = 10f64.powf(exponent);
    if p.is_finite() {
        Ok(p)
    } else {
        Err(ConversionError::NonFinitePressure(voltage))
    }
}
