//! Simulated GT-521 device
//!
//! Speaks the wire protocol from the device side: decodes command frames
//! written by the host and queues response frames (and data packets) for the
//! host to read. Behaviour is scripted by a handler closure.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use gt521_core::{ByteSource, Command, CommandPacket, DataPacket, ResponsePacket};
use parking_lot::Mutex;
use tracing::trace;

use crate::{Transport, error::*};

/// How the simulated device answers one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimReply {
    /// Ack with parameter
    Ack(u32),
    /// Nack with error code
    Nack(u32),
    /// Ack followed by a data packet
    AckWithData(u32, Vec<u8>),
    /// No answer at all
    Silent,
}

type Handler = Box<dyn FnMut(Command, u32) -> SimReply + Send>;

#[derive(Debug)]
struct SimState {
    device_baud: u32,
    journal: Vec<CommandPacket>,
    noise: Vec<u8>,
    corrupt_next: usize,
    opens: Vec<u32>,
}

/// Inspection handle that stays valid after the device is boxed into a link
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Every command frame the device understood, in order
    pub fn journal(&self) -> Vec<CommandPacket> {
        self.state.lock().journal.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().journal.iter().map(|p| p.command).collect()
    }

    /// Number of times `command` was received
    pub fn count(&self, command: Command) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|p| p.command == command)
            .count()
    }

    /// Baud rate the device currently listens at
    pub fn device_baud(&self) -> u32 {
        self.state.lock().device_baud
    }

    /// Baud rates the host opened the port with, in order
    pub fn host_opens(&self) -> Vec<u32> {
        self.state.lock().opens.clone()
    }

    /// Prepend `noise` to the next reply
    pub fn inject_noise(&self, noise: &[u8]) {
        self.state.lock().noise.extend_from_slice(noise);
    }

    /// Send a corrupted copy ahead of each of the next `n` replies
    pub fn corrupt_next(&self, n: usize) {
        self.state.lock().corrupt_next = n;
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }
}

/// In-memory device implementing [`Transport`]
///
/// # Examples
///
/// ```
/// use gt521_core::Command;
/// use gt521_transport::{SimDevice, SimReply, Transport};
///
/// let mut device = SimDevice::new(9600, |command, _| match command {
///     Command::Open => SimReply::Ack(0),
///     _ => SimReply::Nack(0x1006),
/// });
/// let probe = device.probe();
///
/// device.open(9600).unwrap();
/// device.write(&gt521_core::CommandPacket::new(Command::Open, 0).encode()).unwrap();
/// assert_eq!(probe.count(Command::Open), 1);
/// ```
pub struct SimDevice {
    host_baud: u32,
    open: bool,
    rx: VecDeque<u8>,
    state: Arc<Mutex<SimState>>,
    handler: Handler,
}

impl SimDevice {
    /// Device listening at `device_baud`, answering through `handler`
    pub fn new(
        device_baud: u32,
        handler: impl FnMut(Command, u32) -> SimReply + Send + 'static,
    ) -> Self {
        Self {
            host_baud: 0,
            open: false,
            rx: VecDeque::new(),
            state: Arc::new(Mutex::new(SimState {
                device_baud,
                journal: Vec::new(),
                noise: Vec::new(),
                corrupt_next: 0,
                opens: Vec::new(),
            })),
            handler: Box::new(handler),
        }
    }

    /// Device that acks everything with parameter 0
    pub fn always_ack(device_baud: u32) -> Self {
        Self::new(device_baud, |_, _| SimReply::Ack(0))
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn answer(&mut self, packet: CommandPacket) {
        let reply = (self.handler)(packet.command, packet.parameter);
        let mut state = self.state.lock();
        state.journal.push(packet);

        let (response, data) = match reply {
            SimReply::Silent => return,
            SimReply::Ack(param) => (ResponsePacket::ack(param), None),
            SimReply::Nack(code) => (ResponsePacket::nack(code), None),
            SimReply::AckWithData(param, data) => (ResponsePacket::ack(param), Some(data)),
        };

        self.rx.extend(state.noise.drain(..));

        let frame = response.encode();
        if state.corrupt_next > 0 {
            state.corrupt_next -= 1;
            let mut bad = frame;
            bad[4] ^= 0xFF;
            self.rx.extend(bad);
        }
        self.rx.extend(frame);

        if let Some(data) = data {
            self.rx.extend(DataPacket::encode_wire(&data).iter());
        }

        if packet.command == Command::ChangeBaudrate && response.ack {
            state.device_baud = packet.parameter;
        }
    }
}

impl ByteSource for SimDevice {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.rx.read_bytes(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        Ok(self.rx.len())
    }
}

impl Transport for SimDevice {
    fn open(&mut self, baud: u32) -> Result<()> {
        if self.open {
            return Err(Error::AlreadyConnected);
        }
        self.open = true;
        self.host_baud = baud;
        self.rx.clear();
        self.state.lock().opens.push(baud);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.rx.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn baud_rate(&self) -> u32 {
        self.host_baud
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::NotConnected);
        }

        let device_baud = self.state.lock().device_baud;
        if device_baud != self.host_baud {
            trace!(host = self.host_baud, device = device_baud, "Baud mismatch, frame lost");
            return Ok(data.len());
        }

        match CommandPacket::decode(data) {
            Ok(packet) => self.answer(packet),
            Err(e) => trace!("Device ignored {}: {}", hex::encode(data), e),
        }

        Ok(data.len())
    }

    fn name(&self) -> String {
        "sim".to_string()
    }
}
