//! Decoder for the air-quality sensor's BLE notification payload.
//!
//! The device packs seven unsigned 16-bit little-endian values into a
//! 14-byte buffer. Values are reported in device units as-is.
//!
//! | Bytes  | Field       |
//! |--------|-------------|
//! | 0..2   | battery     |
//! | 2..4   | temperature |
//! | 4..6   | humidity    |
//! | 6..8   | pressure    |
//! | 8..10  | co2         |
//! | 10..12 | tvoc        |
//! | 12..14 | altitude    |

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

pub const PAYLOAD_LEN: usize = 14;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid base64 in notification payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("notification payload is {len} bytes, expected at least {}", PAYLOAD_LEN)]
    TooShort { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    /// Remaining battery, percent.
    pub battery: u16,
    pub temperature: u16,
    /// Relative humidity, percent.
    pub humidity: u16,
    /// hPa
    pub pressure: u16,
    /// ppm
    pub co2: u16,
    /// ppm
    pub tvoc: u16,
    /// Metres.
    pub altitude: u16,
}

impl SensorReading {
    /// Decode a raw payload. Bytes past the first 14 are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, PayloadError> {
        if buf.len() < PAYLOAD_LEN {
            return Err(PayloadError::TooShort { len: buf.len() });
        }

        let word = |i: usize| u16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]);

        Ok(Self {
            battery: word(0),
            temperature: word(1),
            humidity: word(2),
            pressure: word(3),
            co2: word(4),
            tvoc: word(5),
            altitude: word(6),
        })
    }

    /// Decode the base64 `bleNotificationPayload` string of a scenario result.
    /// Characters outside the base64 alphabet, such as line breaks, are skipped.
    pub fn from_base64(payload: &str) -> Result<Self, PayloadError> {
        let cleaned: String = payload
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '+' | '/' | '='))
            .collect();
        let buf = BASE64.decode(cleaned)?;
        Self::decode(&buf)
    }
}

/// Renders the chat reply. Altitude is shown before the gas readings even
/// though it sits last in the buffer.
impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "バッテリ残量 : {}%", self.battery)?;
        writeln!(f, "温度 : {}度", self.temperature)?;
        writeln!(f, "湿度 : {}%", self.humidity)?;
        writeln!(f, "気圧 : {}hPa", self.pressure)?;
        writeln!(f, "高度 : {}m", self.altitude)?;
        writeln!(f, "CO2 : {}ppm", self.co2)?;
        writeln!(f, "TVOC : {}ppm", self.tvoc)
    }
}
