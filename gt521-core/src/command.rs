//! GT-521 protocol command definitions

use std::fmt;

use crate::error::{Error, Result};

/// Protocol command codes
///
/// Codes from the GT-521Fxx datasheet. Firmware upgrade, template transfer
/// and database download opcodes are not supported and have no variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    // Link
    Open = 0x01,
    Close = 0x02,
    UsbInternalCheck = 0x03,
    ChangeBaudrate = 0x04,

    // Sensor
    CmosLed = 0x12,

    // Enrollment
    GetEnrollCount = 0x20,
    CheckEnrolled = 0x21,
    EnrollStart = 0x22,
    Enroll1 = 0x23,
    Enroll2 = 0x24,
    Enroll3 = 0x25,
    IsPressFinger = 0x26,

    // Database
    DeleteID = 0x40,
    DeleteAll = 0x41,

    // Matching
    Verify1_1 = 0x50,
    Identify1_N = 0x51,

    // Capture
    CaptureFinger = 0x60,
    GetImage = 0x62,
    GetRawImage = 0x63,

    // Response codes (from device)
    Ack = 0x30,
    Nack = 0x31,
}

impl Command {
    /// Check if this is a request command (from host to device)
    pub fn is_request(self) -> bool {
        !self.is_response()
    }

    /// Check if this is a response code (from device to host)
    pub fn is_response(self) -> bool {
        matches!(self, Self::Ack | Self::Nack)
    }

    /// Whether the device answers this command with a trailing data packet
    pub fn has_data_phase(self) -> bool {
        matches!(self, Self::GetImage | Self::GetRawImage)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Close => "Close",
            Self::UsbInternalCheck => "UsbInternalCheck",
            Self::ChangeBaudrate => "ChangeBaudrate",
            Self::CmosLed => "CmosLed",
            Self::GetEnrollCount => "GetEnrollCount",
            Self::CheckEnrolled => "CheckEnrolled",
            Self::EnrollStart => "EnrollStart",
            Self::Enroll1 => "Enroll1",
            Self::Enroll2 => "Enroll2",
            Self::Enroll3 => "Enroll3",
            Self::IsPressFinger => "IsPressFinger",
            Self::DeleteID => "DeleteID",
            Self::DeleteAll => "DeleteAll",
            Self::Verify1_1 => "Verify1_1",
            Self::Identify1_N => "Identify1_N",
            Self::CaptureFinger => "CaptureFinger",
            Self::GetImage => "GetImage",
            Self::GetRawImage => "GetRawImage",
            Self::Ack => "Ack",
            Self::Nack => "Nack",
        }
    }
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> u16 {
        cmd as u16
    }
}

impl TryFrom<u16> for Command {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Open),
            0x02 => Ok(Self::Close),
            0x03 => Ok(Self::UsbInternalCheck),
            0x04 => Ok(Self::ChangeBaudrate),
            0x12 => Ok(Self::CmosLed),
            0x20 => Ok(Self::GetEnrollCount),
            0x21 => Ok(Self::CheckEnrolled),
            0x22 => Ok(Self::EnrollStart),
            0x23 => Ok(Self::Enroll1),
            0x24 => Ok(Self::Enroll2),
            0x25 => Ok(Self::Enroll3),
            0x26 => Ok(Self::IsPressFinger),
            0x40 => Ok(Self::DeleteID),
            0x41 => Ok(Self::DeleteAll),
            0x50 => Ok(Self::Verify1_1),
            0x51 => Ok(Self::Identify1_N),
            0x60 => Ok(Self::CaptureFinger),
            0x62 => Ok(Self::GetImage),
            0x63 => Ok(Self::GetRawImage),
            0x30 => Ok(Self::Ack),
            0x31 => Ok(Self::Nack),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u16)
    }
}
