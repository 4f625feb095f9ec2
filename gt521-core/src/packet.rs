//! GT-521 packet structure and encoding/decoding

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::Command,
    constants::{ACK, DATA_START, DEVICE_ID, NACK, NackCode, PACKET_START, RESERVED},
    error::{Error, Result},
};

/// Length of command and response frames
pub const FRAME_LEN: usize = 12;

/// Command packet sent from host to device
///
/// # Packet Structure
///
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────────┬─────────────┬─────────────┐
/// │  Start   │ DeviceID │ Reserved │  Parameter  │   Command   │  Checksum   │
/// │ 55 AA    │   0x01   │   0x00   │  4 bytes    │  2 bytes    │  2 bytes    │
/// │          │          │          │  (LE u32)   │  (LE u16)   │  (LE u16)   │
/// └──────────┴──────────┴──────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// The checksum is the 16-bit truncated sum of the first ten bytes.
///
/// # Examples
///
/// ```
/// use gt521_core::{Command, CommandPacket};
///
/// let frame = CommandPacket::new(Command::Open, 0).encode();
/// assert_eq!(frame, [0x55, 0xAA, 0x01, 0x00, 0, 0, 0, 0, 0x01, 0x00, 0x01, 0x01]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    /// Command code
    pub command: Command,

    /// Command parameter
    pub parameter: u32,
}

impl CommandPacket {
    pub fn new(command: Command, parameter: u32) -> Self {
        Self { command, parameter }
    }

    /// Create a packet from a wider integer, rejecting values above 32 bits
    ///
    /// # Examples
    ///
    /// ```
    /// use gt521_core::{Command, CommandPacket};
    ///
    /// assert!(CommandPacket::try_new(Command::ChangeBaudrate, 115200).is_ok());
    /// assert!(CommandPacket::try_new(Command::DeleteID, 1 << 32).is_err());
    /// ```
    pub fn try_new(command: Command, parameter: u64) -> Result<Self> {
        let parameter =
            u32::try_from(parameter).map_err(|_| Error::ParameterOutOfRange(parameter))?;
        Ok(Self::new(command, parameter))
    }

    /// Encode packet to its 12-byte wire form
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        encode_frame(self.parameter, self.command.into())
    }

    /// Decode a command frame (device side)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than 12 bytes
    /// - Start marker is wrong
    /// - Checksum verification fails
    /// - Command code is unknown
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let frame = checked_frame(buf)?;
        let code = LittleEndian::read_u16(&frame[8..10]);
        Ok(Self {
            command: Command::try_from(code)?,
            parameter: LittleEndian::read_u32(&frame[4..8]),
        })
    }
}

impl fmt::Display for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[param=0x{:08X}]", self.command, self.parameter)
    }
}

/// Response packet sent from device to host
///
/// Shares the frame layout and the 0x55 0xAA marker with [`CommandPacket`];
/// the command field carries [`ACK`] or [`NACK`] in its low byte.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ResponsePacket {
    /// True iff the low byte of the command field is the ack code
    pub ack: bool,

    /// Response parameter (value on ack, error code on nack)
    pub parameter: u32,

    /// Raw response code (bytes 8–9)
    pub response: u16,
}

impl ResponsePacket {
    /// Acknowledged response carrying `parameter`
    pub fn ack(parameter: u32) -> Self {
        Self {
            ack: true,
            parameter,
            response: u16::from(ACK),
        }
    }

    /// Rejected response carrying error `code`
    pub fn nack(code: u32) -> Self {
        Self {
            ack: false,
            parameter: code,
            response: u16::from(NACK),
        }
    }

    /// Decode a response frame, verifying marker and checksum
    ///
    /// # Examples
    ///
    /// ```
    /// use gt521_core::ResponsePacket;
    ///
    /// let frame = ResponsePacket::ack(7).encode();
    /// let response = ResponsePacket::decode(&frame).unwrap();
    /// assert!(response.ack);
    /// assert_eq!(response.parameter, 7);
    /// ```
    pub fn decode(frame: &[u8; FRAME_LEN]) -> Result<Self> {
        let frame = checked_frame(frame)?;
        Ok(Self {
            ack: frame[8] == ACK,
            parameter: LittleEndian::read_u32(&frame[4..8]),
            response: LittleEndian::read_u16(&frame[8..10]),
        })
    }

    /// Encode to wire form (device side)
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        encode_frame(self.parameter, self.response)
    }

    /// Parameter as the signed value the device means by it
    pub fn signed_parameter(&self) -> i32 {
        self.parameter as i32
    }

    /// Error code of a nack, `None` on ack
    pub fn nack_code(&self) -> Option<NackCode> {
        (!self.ack).then(|| NackCode::from(self.parameter))
    }
}

impl fmt::Debug for ResponsePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePacket")
            .field("ack", &self.ack)
            .field("parameter", &format!("0x{:08X}", self.parameter))
            .field("response", &format!("0x{:04X}", self.response))
            .finish()
    }
}

impl fmt::Display for ResponsePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.nack_code() {
            None => write!(f, "Ack(param={})", self.parameter),
            Some(code) => write!(f, "Nack({})", code),
        }
    }
}

/// Data packet trailing a response
///
/// The payload has no declared length; it is whatever the device had sent
/// when the buffer ran dry, restored to transmission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub payload: Bytes,
}

impl DataPacket {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Wire form of a data packet carrying `payload` (device side)
    pub fn encode_wire(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(DATA_START.len() + payload.len());
        buf.put_slice(&DATA_START);
        buf.extend(payload.iter().rev());
        buf
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn encode_frame(parameter: u32, code: u16) -> [u8; FRAME_LEN] {
    let mut buf = BytesMut::with_capacity(FRAME_LEN);

    buf.put_slice(&PACKET_START);
    buf.put_u8(DEVICE_ID);
    buf.put_u8(RESERVED);
    buf.put_u32_le(parameter);
    buf.put_u16_le(code);
    let sum = checksum::calculate(&buf);
    buf.put_u16_le(sum);

    let mut frame = [0u8; FRAME_LEN];
    frame.copy_from_slice(&buf);
    frame
}

fn checked_frame(buf: &[u8]) -> Result<&[u8; FRAME_LEN]> {
    let frame: &[u8; FRAME_LEN] = buf
        .get(..FRAME_LEN)
        .and_then(|head| head.try_into().ok())
        .ok_or(Error::PacketTooShort {
            expected: FRAME_LEN,
            actual: buf.len(),
        })?;

    if frame[..2] != PACKET_START {
        return Err(Error::InvalidMarker(frame[0], frame[1]));
    }

    if !checksum::verify(frame) {
        return Err(Error::ProtocolMismatch {
            expected: checksum::calculate(&frame[..checksum::CHECKSUM_OFFSET]),
            received: LittleEndian::read_u16(&frame[checksum::CHECKSUM_OFFSET..]),
        });
    }

    Ok(frame)
}
