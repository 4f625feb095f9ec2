//! Link configuration

use std::env;
use std::time::Duration;

use gt521_core::constants::{
    DEFAULT_READ_TIMEOUT, DEFAULT_REOPEN_DELAY, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_SETTLE_DELAY,
};
use gt521_types::BaudRate;

use crate::error::Result;

/// Environment variable holding the serial port
pub const PORT_ENV: &str = "GT521_PORT";

/// Environment variable holding the desired baud rate
pub const BAUD_ENV: &str = "GT521_BAUD";

const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Settings for one serial link to the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Serial device path
    pub port: String,

    /// Baud rate the link should end up at after negotiation
    pub baud: BaudRate,

    /// Transport read timeout (one read window)
    pub read_timeout: Duration,

    /// Upper bound for waiting on one response
    pub response_timeout: Duration,

    /// Pause after the first open so the device can reset
    pub settle_delay: Duration,

    /// Pause after every reopen before the handshake
    pub reopen_delay: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Read port and baud rate from `GT521_PORT` / `GT521_BAUD`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(port) = env::var(PORT_ENV) {
            config.port = port;
        }
        if let Ok(baud) = env::var(BAUD_ENV) {
            config.baud = baud.parse()?;
        }

        Ok(config)
    }

    pub fn with_baud(mut self, baud: BaudRate) -> Self {
        self.baud = baud;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_reopen_delay(mut self, delay: Duration) -> Self {
        self.reopen_delay = delay;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud: BaudRate::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            reopen_delay: DEFAULT_REOPEN_DELAY,
        }
    }
}
