//! Sensor reader: one bounded ADC read, scaled back to the gauge output.

use std::sync::Arc;
use std::time::Duration;

use autopress_traits::{Clock, Sensor};

use crate::error::SensorError;
use crate::hw_error::map_sensor_error;
use crate::reading::SampleReading;

pub struct SensorReader<S> {
    sensor: S,
    divider_ratio: f64,
    timeout: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<S: Sensor> SensorReader<S> {
    pub fn new(
        sensor: S,
        divider_ratio: f64,
        timeout: Duration,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            sensor,
            divider_ratio,
            timeout,
            clock,
        }
    }

    pub fn set_divider_ratio(&mut self, ratio: f64) {
        self.divider_ratio = ratio;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Read `channel` once. The divider compensation is applied here and
    /// nowhere else.
    pub fn read_voltage(&mut self, channel: u8) -> Result<SampleReading, SensorError> {
        if !(1..=8).contains(&channel) {
            return Err(SensorError::InvalidChannel(channel));
        }
        let raw_v = self
            .sensor
            .read_voltage(channel, self.timeout)
            .map_err(|e| map_sensor_error(&*e))?;
        let voltage = (f64::from(raw_v) * self.divider_ratio) as f32;
        Ok(SampleReading {
            at: self.clock.now(),
            channel,
            raw_v,
            voltage,
        })
    }

    pub fn into_inner(self) -> S {
        self.sensor
    }
}
