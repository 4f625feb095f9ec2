//! Stream decoding: header sync, response frames and data packets
//!
//! The decoder never trusts frame boundaries on the wire. It scans byte by
//! byte for the start marker, drops whatever came before it, and drops (and
//! re-scans) frames whose checksum does not match.

use std::collections::VecDeque;
use std::io;

use tracing::{debug, trace, warn};

use crate::{
    constants::{DATA_START, MAX_DATA_PACKET_SIZE, PACKET_START, READ_WINDOW},
    error::{Error, Result},
    packet::{DataPacket, FRAME_LEN, ResponsePacket},
    wait::{CancelToken, Deadline},
};

/// Readable side of a byte stream
pub trait ByteSource {
    /// Read up to `buf.len()` bytes.
    ///
    /// Returns `Ok(0)` when the read timed out with nothing received.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Number of bytes received and not yet read
    fn bytes_available(&mut self) -> io::Result<usize>;
}

impl ByteSource for VecDeque<u8> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.len());
        for (slot, byte) in buf.iter_mut().zip(self.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.len())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_bytes(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_bytes(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }
}

/// Read one response packet from `source`
///
/// Bytes ahead of the `55 AA` marker are discarded. A frame that fails its
/// checksum is discarded too and scanning resumes right after its marker.
///
/// Once `deadline` has passed the decoder takes at most [`READ_WINDOW`]
/// more bytes from the source, so a line that keeps talking without ever
/// forming a valid frame still ends the wait.
///
/// # Errors
///
/// - `Timeout` if a read comes back empty after `deadline` has passed, or
///   the late read window is used up
/// - `Cancelled` if `cancel` is set while waiting
/// - `Io` if the source fails
///
/// # Examples
///
/// ```
/// use std::collections::VecDeque;
/// use gt521_core::{codec, CancelToken, Deadline, ResponsePacket};
///
/// let mut wire: VecDeque<u8> = vec![0x00, 0xFF].into();
/// wire.extend(ResponsePacket::ack(5).encode());
///
/// let response = codec::read_response(&mut wire, Deadline::immediate(), &CancelToken::new()).unwrap();
/// assert_eq!(response.parameter, 5);
/// ```
pub fn read_response<S: ByteSource + ?Sized>(
    source: &mut S,
    deadline: Deadline,
    cancel: &CancelToken,
) -> Result<ResponsePacket> {
    let mut reader = FrameReader {
        source,
        pending: VecDeque::new(),
        deadline,
        cancel,
        late: 0,
    };

    loop {
        reader.sync()?;

        let mut frame = [0u8; FRAME_LEN];
        frame[..2].copy_from_slice(&PACKET_START);
        reader.fill(&mut frame[2..])?;

        match ResponsePacket::decode(&frame) {
            Ok(response) => {
                trace!(frame = %hex::encode(frame), "Received response");
                return Ok(response);
            }
            Err(e @ Error::ProtocolMismatch { .. }) => {
                warn!("Discarding frame {}: {}", hex::encode(frame), e);
                reader.rescan(&frame[PACKET_START.len()..]);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read the data packet that may trail a response
///
/// Returns `None` when nothing is buffered or the buffered bytes do not
/// start with `5A A5`. Otherwise drains the buffer until the source reports
/// no more bytes and returns the payload in transmission order.
pub fn read_data<S: ByteSource + ?Sized>(source: &mut S) -> Result<Option<DataPacket>> {
    if source.bytes_available()? == 0 {
        return Ok(None);
    }

    let mut sync = [0u8; 2];
    let mut got = 0;
    for _ in 0..sync.len() {
        got += source.read_bytes(&mut sync[got..])?;
        if got == sync.len() {
            break;
        }
    }
    if got < sync.len() || sync != DATA_START {
        debug!(sync = %hex::encode(&sync[..got]), "No data packet after response");
        return Ok(None);
    }

    let mut wire = Vec::new();
    loop {
        let available = source.bytes_available()?;
        if available == 0 {
            break;
        }

        let start = wire.len();
        wire.resize(start + available, 0);
        let n = source.read_bytes(&mut wire[start..])?;
        wire.truncate(start + n);
        if n == 0 {
            break;
        }

        if wire.len() > MAX_DATA_PACKET_SIZE {
            return Err(Error::PayloadTooLarge {
                size: wire.len(),
                max: MAX_DATA_PACKET_SIZE,
            });
        }
    }

    wire.reverse();
    debug!(len = wire.len(), "Received data packet");
    Ok(Some(DataPacket::new(wire)))
}

struct FrameReader<'a, S: ?Sized> {
    source: &'a mut S,
    pending: VecDeque<u8>,
    deadline: Deadline,
    cancel: &'a CancelToken,
    /// Bytes read from the source after the deadline passed
    late: usize,
}

impl<S: ByteSource + ?Sized> FrameReader<'_, S> {
    /// Read from the source, failing with a timeout once the deadline has
    /// passed and either the read came back empty or the late window is spent
    fn read_source(&mut self, buf: &mut [u8]) -> Result<usize> {
        let expired = self.deadline.is_expired();
        if expired && self.late >= READ_WINDOW {
            debug!(late = self.late, "Read window exhausted");
            return Err(self.deadline.timeout());
        }

        let n = self.source.read_bytes(buf)?;
        if expired {
            self.late += n;
        }

        if n == 0 && self.deadline.is_expired() {
            return Err(self.deadline.timeout());
        }
        Ok(n)
    }

    fn next_byte(&mut self) -> Result<u8> {
        loop {
            self.cancel.check()?;

            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }

            let mut byte = [0u8; 1];
            if self.read_source(&mut byte)? == 1 {
                return Ok(byte[0]);
            }
        }
    }

    /// Consume bytes up to and including the start marker
    fn sync(&mut self) -> Result<()> {
        let mut previous = None;
        let mut consumed = 0usize;

        loop {
            let byte = self.next_byte()?;
            consumed += 1;

            if previous == Some(PACKET_START[0]) && byte == PACKET_START[1] {
                let skipped = consumed - PACKET_START.len();
                if skipped > 0 {
                    debug!(skipped, "Discarded bytes before header");
                }
                return Ok(());
            }

            previous = Some(byte);
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            self.cancel.check()?;

            while filled < buf.len() {
                match self.pending.pop_front() {
                    Some(byte) => {
                        buf[filled] = byte;
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled == buf.len() {
                break;
            }

            filled += self.read_source(&mut buf[filled..])?;
        }

        Ok(())
    }

    /// Queue `bytes` to be scanned again ahead of the source
    fn rescan(&mut self, bytes: &[u8]) {
        let rest: Vec<u8> = self.pending.drain(..).collect();
        self.pending.extend(bytes);
        self.pending.extend(rest);
    }
}
