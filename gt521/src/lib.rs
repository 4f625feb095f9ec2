//! # gt521
//!
//! Driver for GT-521Fxx optical fingerprint sensors over a serial link.
//!
//! ## Features
//!
//! - Automatic baud rate recovery when the sensor was left at another speed
//! - Typed commands, responses and nack codes
//! - Bounded waits everywhere, with a close handle for signal handlers
//! - Enrollment and identification workflows with retry policies
//!
//! ## Quick Start
//!
//! ```no_run
//! use gt521::{BaudRate, Device, Identification};
//!
//! fn main() -> gt521::Result<()> {
//!     let mut device = Device::new("/dev/ttyUSB0", BaudRate::B115200);
//!     device.init()?;
//!     device.open()?;
//!
//!     match device.identify()? {
//!         Identification::Match(id) => println!("Hello #{}", id),
//!         other => println!("{}", other),
//!     }
//!
//!     device.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod retry;
pub mod workflow;

// Re-exports
pub use config::LinkConfig;
pub use device::Device;
pub use dispatcher::{CommandDispatcher, WaitPolicy};
pub use error::{Error, Result};
pub use link::{CloseHandle, LinkManager};
pub use retry::{AckOutcome, Retry, RetryError};
pub use workflow::{EnrollFailure, EnrollState, Enrollment};

// Re-export types
pub use gt521_core::{CancelToken, Command, DataPacket, NackCode, ResponsePacket};
pub use gt521_types::{BaudRate, CaptureMode, Identification, Stage};
