//! Serial speeds the sensor supports

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Baud rate the sensor can be negotiated to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaudRate {
    B9600,
    #[default]
    B115200,
}

impl BaudRate {
    /// The other supported rate, tried when a handshake fails
    pub fn alternate(self) -> Self {
        match self {
            Self::B9600 => Self::B115200,
            Self::B115200 => Self::B9600,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::B9600 => 9600,
            Self::B115200 => 115200,
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> u32 {
        baud.as_u32()
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            9600 => Ok(Self::B9600),
            115200 => Ok(Self::B115200),
            other => Err(Error::Validation(format!(
                "unsupported baud rate {} (expected 9600 or 115200)",
                other
            ))),
        }
    }
}

impl FromStr for BaudRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("not a baud rate: {:?}", s)))?;
        Self::try_from(value)
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}
