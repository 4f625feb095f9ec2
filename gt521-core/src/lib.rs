//! # gt521-core
//!
//! Core protocol implementation for GT-521Fxx optical fingerprint sensors.
//!
//! This crate provides the low-level protocol primitives:
//! - Command and response packet encoding/decoding
//! - Checksum calculation
//! - Header synchronization over a noisy byte stream
//! - Command definitions
//! - Protocol constants
//! - Bounded waits and cancellation

pub mod checksum;
pub mod codec;
pub mod command;
pub mod constants;
pub mod error;
pub mod packet;
pub mod wait;

pub use codec::ByteSource;
pub use command::Command;
pub use constants::NackCode;
pub use error::{Error, Result};
pub use packet::{CommandPacket, DataPacket, FRAME_LEN, ResponsePacket};
pub use wait::{CancelToken, Deadline};
