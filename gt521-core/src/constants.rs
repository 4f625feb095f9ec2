//! Protocol constants

use std::fmt;
use std::time::Duration;

/// Start marker of command and response frames.
///
/// The device uses the same two bytes in both directions; which one a frame
/// is follows from who is reading it.
pub const PACKET_START: [u8; 2] = [0x55, 0xAA];

/// Sync bytes in front of a data packet
pub const DATA_START: [u8; 2] = [0x5A, 0xA5];

/// Device id written at offset 2
pub const DEVICE_ID: u8 = 0x01;

/// Reserved byte at offset 3
pub const RESERVED: u8 = 0x00;

/// Low byte of the command field in an acknowledged response
pub const ACK: u8 = 0x30;

/// Low byte of the command field in a rejected response
pub const NACK: u8 = 0x31;

/// Default transport read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default upper bound for one command/response exchange
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after first opening the port so the device can reset
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Pause after (re)opening the port before a handshake
pub const DEFAULT_REOPEN_DELAY: Duration = Duration::from_millis(100);

/// Attempts per retried workflow step
pub const DEFAULT_TRY_COUNT: usize = 10;

/// Delay between retried workflow steps
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Largest data packet accepted (raw image plus slack)
pub const MAX_DATA_PACKET_SIZE: usize = 128 * 1024;

/// Bytes the decoder still takes from the line once its deadline has passed.
///
/// Covers a frame that was already on its way when the wait ran out, so
/// `Deadline::immediate()` can still pick up a buffered response.
pub const READ_WINDOW: usize = 256;

/// Error code carried in the parameter of a nack response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackCode {
    Timeout,
    InvalidBaudrate,
    InvalidPos,
    IsNotUsed,
    IsAlreadyUsed,
    CommErr,
    VerifyFailed,
    IdentifyFailed,
    DbIsFull,
    DbIsEmpty,
    TurnErr,
    BadFinger,
    EnrollFailed,
    IsNotSupported,
    DevErr,
    CaptureCanceled,
    InvalidParam,
    FingerIsNotPressed,
    /// Duplicate id reported by enrollment (parameter below 0x1000)
    DuplicateId(u32),
    Other(u32),
}

impl From<u32> for NackCode {
    fn from(value: u32) -> Self {
        match value {
            0x1001 => Self::Timeout,
            0x1002 => Self::InvalidBaudrate,
            0x1003 => Self::InvalidPos,
            0x1004 => Self::IsNotUsed,
            0x1005 => Self::IsAlreadyUsed,
            0x1006 => Self::CommErr,
            0x1007 => Self::VerifyFailed,
            0x1008 => Self::IdentifyFailed,
            0x1009 => Self::DbIsFull,
            0x100A => Self::DbIsEmpty,
            0x100B => Self::TurnErr,
            0x100C => Self::BadFinger,
            0x100D => Self::EnrollFailed,
            0x100E => Self::IsNotSupported,
            0x100F => Self::DevErr,
            0x1010 => Self::CaptureCanceled,
            0x1011 => Self::InvalidParam,
            0x1012 => Self::FingerIsNotPressed,
            id if id < 0x1000 => Self::DuplicateId(id),
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for NackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "NACK_DUPLICATE_ID({})", id),
            Self::Other(code) => write!(f, "NACK_UNKNOWN(0x{:04X})", code),
            other => write!(f, "NACK_{:?}", other),
        }
    }
}
