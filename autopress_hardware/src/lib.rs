pub mod error;
#[cfg(feature = "hardware")]
pub mod mcp3424;
pub mod scpi;
pub mod sim;
pub mod util;

pub use scpi::{DEFAULT_SCPI_PORT, ScpiConnector, ScpiSession};
pub use sim::{SaveLog, SimProfile, SimulatedConnector, SimulatedInstrument, SimulatedSensor};

#[cfg(feature = "hardware")]
pub use hardware::HardwareSensor;

#[cfg(feature = "hardware")]
pub mod hardware {
    use std::time::Duration;

    use autopress_traits::{BoxError, Sensor};

    use crate::error::HwError;
    use crate::mcp3424::{AdcPi, Resolution};

    /// Gauge input wired to an ADC Pi board.
    pub struct HardwareSensor {
        adc: AdcPi,
    }

    impl HardwareSensor {
        pub fn try_new(address_1: u8, address_2: u8, bits: u8) -> Result<Self, HwError> {
            let resolution = Resolution::from_bits(bits)
                .ok_or_else(|| HwError::I2c(format!("unsupported ADC resolution {bits} bits")))?;
            Ok(Self {
                adc: AdcPi::new(address_1, address_2, resolution)?,
            })
        }
    }

    impl Sensor for HardwareSensor {
        fn read_voltage(&mut self, channel: u8, timeout: Duration) -> Result<f32, BoxError> {
            match self.adc.read_channel(channel, timeout) {
                Ok(v) => Ok(v as f32),
                Err(e) => {
                    tracing::warn!(channel, error = %e, "adc read failed");
                    Err(Box::new(e))
                }
            }
        }
    }
}
