//! Error types for gt521-core

use std::time::Duration;

/// Result type alias for gt521 protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Packet too short: expected {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not start with the 0x55 0xAA marker
    #[error("Invalid start marker: 0x{0:02X} 0x{1:02X}")]
    InvalidMarker(u8, u8),

    /// Checksum recomputed on receipt does not match the transmitted one
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ProtocolMismatch {
        expected: u16,
        received: u16,
    },

    /// Unknown command code
    #[error("Unknown command code: 0x{0:04X}")]
    UnknownCommand(u16),

    /// Command parameter does not fit the 32-bit parameter field
    #[error("Parameter {0} does not fit in 32 bits")]
    ParameterOutOfRange(u64),

    /// No complete response within the bounded wait
    #[error("Timeout waiting for response after {waited:?}")]
    Timeout {
        waited: Duration,
    },

    /// Wait was abandoned because the link was asked to close
    #[error("Operation cancelled")]
    Cancelled,

    /// Data packet grew past the accepted maximum
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ProtocolMismatch { .. }
                | Self::InvalidMarker(..)
                | Self::PacketTooShort { .. }
        )
    }

    /// Check if the link must be torn down
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Timeout { waited: Duration::from_secs(1) }.is_recoverable());
        assert!(Error::ProtocolMismatch { expected: 1, received: 2 }.is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
        assert!(Error::Cancelled.requires_reconnect());
    }

    #[test]
    fn test_display() {
        let err = Error::ProtocolMismatch { expected: 0x0101, received: 0x00FF };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0x0101, received 0x00FF"
        );
    }
}
