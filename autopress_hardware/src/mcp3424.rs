//! ADC Pi board driver: two MCP3424 delta-sigma converters on I²C.
//!
//! Channels 1..=4 live on the first converter, 5..=8 on the second. Each read
//! starts a one-shot conversion and polls the RDY bit until the result is
//! latched or the timeout expires.

use std::time::Duration;

use rppal::i2c::I2c;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::poll_until;

/// Input divider on the ADC Pi front end (0–5 V terminals onto the 2.048 V
/// converter range).
const BOARD_DIVIDER: f64 = 2.471;
const RDY: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits12,
    Bits14,
    Bits16,
    Bits18,
}

impl Resolution {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            12 => Some(Self::Bits12),
            14 => Some(Self::Bits14),
            16 => Some(Self::Bits16),
            18 => Some(Self::Bits18),
            _ => None,
        }
    }

    fn rate_bits(self) -> u8 {
        match self {
            Self::Bits12 => 0b00,
            Self::Bits14 => 0b01,
            Self::Bits16 => 0b10,
            Self::Bits18 => 0b11,
        }
    }

    fn width(self) -> u32 {
        match self {
            Self::Bits12 => 12,
            Self::Bits14 => 14,
            Self::Bits16 => 16,
            Self::Bits18 => 18,
        }
    }

    /// Volts per count at unity gain.
    fn lsb(self) -> f64 {
        4.096 / f64::from(1u32 << self.width())
    }

    /// Typical conversion time; used as the poll interval.
    fn conversion_time(self) -> Duration {
        match self {
            Self::Bits12 => Duration::from_micros(4_200),
            Self::Bits14 => Duration::from_micros(16_700),
            Self::Bits16 => Duration::from_micros(66_700),
            Self::Bits18 => Duration::from_micros(266_700),
        }
    }
}

pub struct AdcPi {
    i2c: I2c,
    addresses: [u8; 2],
    resolution: Resolution,
}

impl AdcPi {
    pub fn new(address_1: u8, address_2: u8, resolution: Resolution) -> Result<Self> {
        let i2c = I2c::new().map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            i2c,
            addresses: [address_1, address_2],
            resolution,
        })
    }

    pub fn read_channel(&mut self, channel: u8, timeout: Duration) -> Result<f64> {
        if !(1..=8).contains(&channel) {
            return Err(HwError::InvalidChannel(channel));
        }
        let idx = usize::from((channel - 1) / 4);
        let ch_bits = (channel - 1) % 4;
        let config = RDY | (ch_bits << 5) | (self.resolution.rate_bits() << 2);

        self.i2c
            .set_slave_address(u16::from(self.addresses[idx]))
            .map_err(|e| HwError::I2c(e.to_string()))?;
        self.i2c
            .write(&[config])
            .map_err(|e| HwError::I2c(e.to_string()))?;

        let resolution = self.resolution;
        let i2c = &mut self.i2c;
        let code = poll_until(
            || {
                let mut buf = [0u8; 4];
                let len = if resolution == Resolution::Bits18 { 4 } else { 3 };
                i2c.read(&mut buf[..len])
                    .map_err(|e| HwError::I2c(e.to_string()))?;
                let status = buf[len - 1];
                if status & RDY != 0 {
                    return Ok(None);
                }
                Ok(Some(decode(&buf[..len - 1], resolution)))
            },
            timeout,
            resolution.conversion_time() / 4,
        )?;

        let volts = f64::from(code) * resolution.lsb() * BOARD_DIVIDER;
        trace!(channel, code, volts, "mcp3424 sample");
        Ok(volts)
    }
}

/// Sign-extend the big-endian conversion result.
fn decode(bytes: &[u8], resolution: Resolution) -> i32 {
    let raw = bytes
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    let width = resolution.width();
    let mask = (1u32 << width) - 1;
    let value = raw & mask;
    let sign = 1u32 << (width - 1);
    if value & sign != 0 {
        (value | !mask) as i32
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_results() {
        assert_eq!(decode(&[0x07, 0xFF], Resolution::Bits12), 2047);
        assert_eq!(decode(&[0x0F, 0xFF], Resolution::Bits12), -1);
        assert_eq!(decode(&[0x02, 0x00, 0x00], Resolution::Bits18), -131_072);
    }
}
