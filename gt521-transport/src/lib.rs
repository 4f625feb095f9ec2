//! Transport layer for the GT-521 protocol
//!
//! Provides serial communication with the sensor, plus an in-memory
//! simulated device behind the `sim` feature.
//!
//! The crate's tests enable `sim` through a dev-dependency on itself, so
//! `cargo test -p gt521-transport` runs the simulator tests as well.

pub mod error;
pub mod serial;
#[cfg(feature = "sim")]
pub mod sim;

pub use error::{Error, Result};
pub use serial::SerialTransport;
#[cfg(feature = "sim")]
pub use sim::{SimDevice, SimProbe, SimReply};

pub use gt521_core::ByteSource;

/// Transport trait for the byte link to the sensor
///
/// Reads go through [`ByteSource`]; a read that times out returns `Ok(0)`.
pub trait Transport: ByteSource + Send {
    /// Open the link at `baud`
    fn open(&mut self, baud: u32) -> Result<()>;

    /// Close the link; closing a closed link is a no-op
    fn close(&mut self);

    /// Check if the link is open
    fn is_open(&self) -> bool;

    /// Baud rate of the last open
    fn baud_rate(&self) -> u32;

    /// Write all of `data`, failing when the link is not writable
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Port name for logging
    fn name(&self) -> String;
}
