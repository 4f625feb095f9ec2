//! Serial port transport

use std::io::{self, Read, Write};
use std::time::Duration;

use gt521_core::{ByteSource, constants::DEFAULT_READ_TIMEOUT};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace, warn};

use crate::{Transport, error::*};

/// Serial transport for GT-521 sensors (8N1, no flow control)
pub struct SerialTransport {
    port: String,
    baud: u32,
    read_timeout: Duration,
    handle: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create new serial transport for `port` (e.g. `/dev/ttyUSB0`)
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: 0,
            read_timeout: DEFAULT_READ_TIMEOUT,
            handle: None,
        }
    }

    /// Set read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn handle(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl ByteSource for SerialTransport {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.handle()?.read(buf) {
            Ok(n) => {
                if n > 0 {
                    trace!(data = %hex::encode(&buf[..n]), "Received {} bytes", n);
                }
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.handle()?.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, baud: u32) -> Result<()> {
        if self.is_open() {
            return Err(Error::AlreadyConnected);
        }

        debug!("Opening {} at {} baud...", self.port, baud);

        let handle = serialport::new(&self.port, baud)
            .timeout(self.read_timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|source| Error::Open {
                port: self.port.clone(),
                baud,
                source,
            })?;

        self.baud = baud;
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("Closed {}", self.port);
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let handle = self.handle.as_mut().ok_or(Error::NotConnected)?;

        trace!(data = %hex::encode(data), "Sending {} bytes", data.len());

        handle.write_all(data)?;
        handle.flush()?;

        Ok(data.len())
    }

    fn name(&self) -> String {
        self.port.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("Serial transport {} dropped while still open", self.port);
        }
    }
}
