//! Simulated sensor and instrument for running without the ADC board or an
//! oscilloscope on the network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopress_traits::{BoxError, Instrument, InstrumentConnector, SaveRequest, Sensor};

use crate::error::HwError;

/// Shape of the simulated vacuum trace.
///
/// The gauge output oscillates sinusoidally around the voltage that
/// corresponds to `base_mbar`, so the pressure periodically leaves and
/// re-enters any narrow band around the base value.
#[derive(Debug, Clone, Copy)]
pub struct SimProfile {
    pub base_mbar: f64,
    /// Peak deviation of the gauge output in volts.
    pub amplitude_v: f64,
    /// Samples per full oscillation.
    pub period_samples: u32,
    /// Gauge transfer curve used to place the base pressure.
    pub offset_v: f64,
    pub slope_v_per_decade: f64,
    /// Divider between the gauge and the ADC input.
    pub divider_ratio: f64,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            base_mbar: 5e-3,
            amplitude_v: 0.05,
            period_samples: 60,
            offset_v: 7.75,
            slope_v_per_decade: 0.75,
            divider_ratio: 2.0,
        }
    }
}

pub struct SimulatedSensor {
    profile: SimProfile,
    sample: u64,
    failing: bool,
}

impl SimulatedSensor {
    pub fn new(profile: SimProfile) -> Self {
        Self {
            profile,
            sample: 0,
            failing: false,
        }
    }

    /// A sensor whose every read times out (unplugged board).
    pub fn failing() -> Self {
        Self {
            profile: SimProfile::default(),
            sample: 0,
            failing: true,
        }
    }

    /// Gauge output voltage (before the divider) for the given sample index.
    pub fn gauge_voltage(&self, sample: u64) -> f64 {
        let p = &self.profile;
        let base = p.offset_v + p.slope_v_per_decade * p.base_mbar.log10();
        let period = f64::from(p.period_samples.max(1));
        let phase = (sample % u64::from(p.period_samples.max(1))) as f64 / period;
        base + p.amplitude_v * (std::f64::consts::TAU * phase).sin()
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(SimProfile::default())
    }
}

impl Sensor for SimulatedSensor {
    fn read_voltage(&mut self, channel: u8, _timeout: Duration) -> Result<f32, BoxError> {
        if !(1..=8).contains(&channel) {
            return Err(Box::new(HwError::InvalidChannel(channel)));
        }
        if self.failing {
            return Err(Box::new(HwError::DataReadyTimeout));
        }
        let v = self.gauge_voltage(self.sample) / self.profile.divider_ratio;
        self.sample = self.sample.wrapping_add(1);
        tracing::trace!(channel, volts = v, "simulated adc sample");
        Ok(v as f32)
    }
}

/// Shared record of every save the simulated instrument accepted.
pub type SaveLog = Arc<Mutex<Vec<SaveRequest>>>;

pub struct SimulatedInstrument {
    log: SaveLog,
    reject: bool,
}

impl Instrument for SimulatedInstrument {
    fn identify(&mut self, _timeout: Duration) -> Result<String, BoxError> {
        Ok("Simulated,Oscilloscope,0,1.0".to_string())
    }

    fn save_buffer(&mut self, request: &SaveRequest, _timeout: Duration) -> Result<(), BoxError> {
        if self.reject {
            return Err(Box::new(HwError::Rejected {
                code: -200,
                message: "Execution error".into(),
            }));
        }
        tracing::info!(file = %request.file_path, "simulated instrument saved waveform");
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct SimulatedConnector {
    log: SaveLog,
    reject: bool,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose sessions reject every save command.
    pub fn rejecting() -> Self {
        Self {
            log: SaveLog::default(),
            reject: true,
        }
    }

    pub fn save_log(&self) -> SaveLog {
        self.log.clone()
    }
}

impl InstrumentConnector for SimulatedConnector {
    type Session = SimulatedInstrument;

    fn connect(&mut self, address: &str, _timeout: Duration) -> Result<Self::Session, BoxError> {
        tracing::debug!(address, "simulated instrument connected");
        Ok(SimulatedInstrument {
            log: self.log.clone(),
            reject: self.reject,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_oscillates_around_base_pressure() {
        let profile = SimProfile::default();
        let mut sensor = SimulatedSensor::new(profile);
        let first = sensor
            .read_voltage(1, Duration::from_millis(10))
            .expect("read");
        let expected = (profile.offset_v + profile.slope_v_per_decade * profile.base_mbar.log10())
            / profile.divider_ratio;
        assert!((f64::from(first) - expected).abs() < 1e-5);

        let quarter = sensor.gauge_voltage(u64::from(profile.period_samples / 4));
        assert!(quarter > expected * profile.divider_ratio);
    }

    #[test]
    fn sensor_rejects_unknown_channel() {
        let mut sensor = SimulatedSensor::default();
        let err = sensor
            .read_voltage(9, Duration::from_millis(10))
            .expect_err("channel 9 does not exist");
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn failing_sensor_times_out() {
        let mut sensor = SimulatedSensor::failing();
        let err = sensor
            .read_voltage(1, Duration::from_millis(10))
            .expect_err("always fails");
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn instrument_records_saves() {
        let mut connector = SimulatedConnector::new();
        let log = connector.save_log();
        let mut session = connector
            .connect("sim", Duration::from_millis(10))
            .expect("connect");
        let req = SaveRequest {
            file_path: "C:\\data\\a.bin".into(),
        };
        session
            .save_buffer(&req, Duration::from_millis(10))
            .expect("save");
        assert_eq!(log.lock().expect("lock").as_slice(), &[req]);
    }
}
