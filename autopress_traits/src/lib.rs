//! Capability traits shared by the core loop and the hardware adapters.
//!
//! Errors cross these boundaries as `Box<dyn Error + Send + Sync>`; the core
//! maps them to its typed errors in one place.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A calibrated analog front end.
pub trait Sensor {
    /// Read the voltage present at the ADC input of `channel`.
    ///
    /// This is the signal *after* any physical potential divider; scaling back
    /// to the transducer output happens in the core.
    fn read_voltage(&mut self, channel: u8, timeout: Duration) -> Result<f32, BoxError>;
}

/// Where the instrument should write its current acquisition buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Path on the instrument's own filesystem.
    pub file_path: String,
}

/// An open session with the acquisition instrument.
pub trait Instrument {
    /// Identification string (`*IDN?` for SCPI instruments).
    fn identify(&mut self, timeout: Duration) -> Result<String, BoxError>;

    /// Persist the current acquisition buffer to `request.file_path` and wait
    /// for the instrument to acknowledge completion.
    fn save_buffer(&mut self, request: &SaveRequest, timeout: Duration) -> Result<(), BoxError>;

    fn close(&mut self) -> Result<(), BoxError>;
}

/// Opens sessions to an instrument by address.
pub trait InstrumentConnector {
    type Session: Instrument;

    fn connect(&mut self, address: &str, timeout: Duration) -> Result<Self::Session, BoxError>;
}

impl<T: Sensor + ?Sized> Sensor for Box<T> {
    fn read_voltage(&mut self, channel: u8, timeout: Duration) -> Result<f32, BoxError> {
        (**self).read_voltage(channel, timeout)
    }
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn identify(&mut self, timeout: Duration) -> Result<String, BoxError> {
        (**self).identify(timeout)
    }

    fn save_buffer(&mut self, request: &SaveRequest, timeout: Duration) -> Result<(), BoxError> {
        (**self).save_buffer(request, timeout)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        (**self).close()
    }
}
