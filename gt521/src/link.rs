//! Link bring-up and ownership of the transport
//!
//! [`LinkManager`] owns the only handle to the transport. It finds the
//! device at either supported baud rate, reprograms it to the desired one
//! when needed, and hands out [`CommandDispatcher`]s for the actual
//! command traffic.

use std::io;
use std::sync::Arc;

use gt521_core::{
    ByteSource, CancelToken, Command, CommandPacket, DataPacket, Deadline, FRAME_LEN,
    ResponsePacket, codec, constants::MAX_DATA_PACKET_SIZE,
};
use gt521_transport::Transport;
use gt521_types::BaudRate;
use parking_lot::Mutex;
use tracing::{Span, debug, error, info, info_span, trace, warn};

use crate::config::LinkConfig;
use crate::dispatcher::{CommandDispatcher, WaitPolicy};
use crate::error::{Error, Result};
use crate::retry::pause;

/// Transport shared between the link and its close handles
///
/// The lock is taken per read or write, never across a whole exchange, so
/// a close request waits for at most one read window.
pub(crate) struct Connection {
    transport: Mutex<Box<dyn Transport>>,
    cancel: CancelToken,
}

impl Connection {
    pub(crate) fn new(transport: Box<dyn Transport>, cancel: CancelToken) -> Self {
        Self {
            transport: Mutex::new(transport),
            cancel,
        }
    }

    pub(crate) fn write_packet(&self, packet: &CommandPacket) -> Result<()> {
        self.cancel.check()?;

        let frame = packet.encode();
        trace!(frame = %hex::encode(frame), "Sending {}", packet.command);

        let written = self
            .transport
            .lock()
            .write(&frame)
            .map_err(|e| self.cancelled_or(e.into()))?;
        if written != FRAME_LEN {
            return Err(gt521_transport::Error::ShortWrite {
                written,
                expected: FRAME_LEN,
            }
            .into());
        }

        Ok(())
    }

    pub(crate) fn read_response(&self, deadline: Deadline) -> Result<ResponsePacket> {
        let mut source = LockedSource(&self.transport);
        codec::read_response(&mut source, deadline, &self.cancel)
            .map_err(|e| self.cancelled_or(e.into()))
    }

    pub(crate) fn read_data(&self) -> Result<Option<DataPacket>> {
        let mut transport = self.transport.lock();
        codec::read_data(&mut **transport).map_err(|e| self.cancelled_or(e.into()))
    }

    /// Discard the bytes the transport has buffered
    ///
    /// Stops after `MAX_DATA_PACKET_SIZE` bytes so a line that never goes
    /// quiet cannot keep the lock forever.
    pub(crate) fn flush(&self) -> Result<usize> {
        let mut transport = self.transport.lock();
        let mut discarded = 0;
        let mut buf = [0u8; 64];

        while discarded < MAX_DATA_PACKET_SIZE
            && transport
                .bytes_available()
                .map_err(gt521_core::Error::from)?
                > 0
        {
            let n = transport
                .read_bytes(&mut buf)
                .map_err(gt521_core::Error::from)?;
            if n == 0 {
                break;
            }
            discarded += n;
        }

        if discarded >= MAX_DATA_PACKET_SIZE {
            warn!(discarded, "Line still busy after flush");
        } else if discarded > 0 {
            debug!(discarded, "Flushed stray bytes");
        }
        Ok(discarded)
    }

    /// Close (if open) and open again at `baud`
    pub(crate) fn reopen(&self, baud: u32) -> Result<()> {
        self.cancel.check()?;

        let mut transport = self.transport.lock();
        if transport.is_open() {
            transport.close();
        }
        transport.open(baud)?;
        debug!(baud, port = %transport.name(), "Transport opened");
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.transport.lock().close();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.transport.lock().is_open()
    }

    pub(crate) fn baud_rate(&self) -> u32 {
        self.transport.lock().baud_rate()
    }

    /// Report any failure after a close request as the cancellation it is
    fn cancelled_or(&self, e: Error) -> Error {
        if self.cancel.is_cancelled() {
            gt521_core::Error::Cancelled.into()
        } else {
            e
        }
    }
}

/// Byte source that locks the transport for each read only
struct LockedSource<'a>(&'a Mutex<Box<dyn Transport>>);

impl ByteSource for LockedSource<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read_bytes(buf)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.0.lock().bytes_available()
    }
}

/// Handle that can close the link from another thread
///
/// Closing cancels every blocking wait on the link and then closes the
/// transport. Intended for signal handlers and watchdog threads.
#[derive(Clone)]
pub struct CloseHandle {
    conn: Arc<Connection>,
}

impl CloseHandle {
    pub fn close_serial(&self) {
        info!("Closing serial link on request");
        self.conn.cancel.cancel();
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owner of the serial link to one sensor
pub struct LinkManager {
    conn: Arc<Connection>,
    config: LinkConfig,
    span: Span,
}

impl LinkManager {
    pub fn new(transport: Box<dyn Transport>, config: LinkConfig) -> Self {
        Self::with_cancel_token(transport, config, CancelToken::new())
    }

    /// Link whose blocking waits also stop when `token` is cancelled
    pub fn with_cancel_token(
        transport: Box<dyn Transport>,
        config: LinkConfig,
        token: CancelToken,
    ) -> Self {
        let span = info_span!("link", port = %config.port);
        Self {
            conn: Arc::new(Connection::new(transport, token)),
            config,
            span,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.conn.cancel.clone()
    }

    /// Dispatcher waiting up to the configured response timeout
    pub fn dispatcher(&self) -> CommandDispatcher<'_> {
        CommandDispatcher::new(&self.conn)
            .with_wait(WaitPolicy::Bounded(self.config.response_timeout))
    }

    /// Bring the link up at `desired`
    ///
    /// Tries `desired` first and the other supported rate second. When the
    /// device only answers at the other rate it is told to switch, and the
    /// link is brought up again at `desired`. On success the transport is
    /// left open with no session running on the device.
    ///
    /// # Errors
    ///
    /// `LinkFailed` when no handshake succeeds, transport errors when the
    /// port cannot be opened, `Cancelled` after [`close_serial`](Self::close_serial).
    pub fn init(&mut self, desired: BaudRate) -> Result<()> {
        let _span = self.span.enter();
        self.conn.cancel.reset();

        info!(baud = %desired, "Initializing link");
        self.conn.reopen(desired.as_u32())?;
        pause(self.config.settle_delay, &self.conn.cancel)?;

        if !self.handshake(desired)? {
            let alternate = desired.alternate();
            warn!(baud = %desired, "No answer, trying {}", alternate);

            if !self.handshake(alternate)? {
                return Err(self.fail(vec![desired, alternate]));
            }

            self.reprogram(desired)?;

            if !self.handshake(desired)? {
                return Err(self.fail(vec![desired, alternate, desired]));
            }
        }

        info!(baud = %desired, "Serial connected");

        self.best_effort(Command::Open)?;
        self.conn.flush()?;
        self.best_effort(Command::Close)?;

        self.config.baud = desired;
        Ok(())
    }

    /// Reopen the transport at `baud` and check the device answers there
    ///
    /// Returns `Ok(false)` when the device stays silent or rejects `Open`.
    pub fn handshake(&self, baud: BaudRate) -> Result<bool> {
        self.conn.reopen(baud.as_u32())?;
        pause(self.config.reopen_delay, &self.conn.cancel)?;

        let opened = self
            .dispatcher()
            .with_wait(WaitPolicy::Once)
            .call_ack(Command::Open, 0);

        match opened {
            Ok(true) => {}
            Ok(false) => {
                debug!(%baud, "Open rejected during handshake");
                return Ok(false);
            }
            Err(e) if e.is_recoverable() => {
                debug!(%baud, "No handshake: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        self.best_effort(Command::Close)?;
        Ok(true)
    }

    /// Start a session on the device
    pub fn open(&self) -> Result<()> {
        let _span = self.span.enter();
        self.dispatcher().expect_ack(Command::Open, 0)?;
        debug!("Device session opened");
        Ok(())
    }

    /// End the session on the device; the transport stays open
    pub fn close(&self) -> Result<()> {
        let _span = self.span.enter();
        self.dispatcher().expect_ack(Command::Close, 0)?;
        debug!("Device session closed");
        Ok(())
    }

    /// Switch the device to `baud` and follow it
    ///
    /// Returns `Ok(false)` when the device rejects the new rate; the link
    /// then stays at the current rate.
    pub fn change_baud(&mut self, baud: BaudRate) -> Result<bool> {
        let span = self.span.clone();
        let _span = span.enter();

        if !self
            .dispatcher()
            .call_ack(Command::ChangeBaudrate, baud.as_u32())?
        {
            warn!(%baud, "Baud rate change rejected");
            return Ok(false);
        }

        self.conn.reopen(baud.as_u32())?;
        pause(self.config.reopen_delay, &self.conn.cancel)?;
        self.config.baud = baud;

        info!(%baud, "Baud rate changed");
        Ok(true)
    }

    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        self.conn.is_open()
    }

    /// Baud rate the transport was last opened at
    pub fn baud_rate(&self) -> u32 {
        self.conn.baud_rate()
    }

    /// Discard buffered input, returning how many bytes were dropped
    pub fn flush(&self) -> Result<usize> {
        self.conn.flush()
    }

    /// Cancel pending waits and close the transport
    pub fn close_serial(&self) {
        self.close_handle().close_serial();
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            conn: Arc::clone(&self.conn),
        }
    }

    /// Send Open then ChangeBaudrate at the rate the device answers at
    fn reprogram(&self, desired: BaudRate) -> Result<()> {
        let dispatcher = self.dispatcher();

        if !self.best_effort(Command::Open)? {
            return Ok(());
        }

        match dispatcher.call_ack(Command::ChangeBaudrate, desired.as_u32()) {
            Ok(true) => info!("The baud rate is changed to {}", desired),
            Ok(false) => warn!(baud = %desired, "Device rejected baud rate change"),
            Err(e) if e.is_recoverable() => warn!("Baud rate change unanswered: {}", e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Send an ack-only command whose failure is only worth a warning
    fn best_effort(&self, command: Command) -> Result<bool> {
        match self.dispatcher().call_ack(command, 0) {
            Ok(ack) => {
                if !ack {
                    warn!("{} rejected", command);
                }
                Ok(ack)
            }
            Err(e) if e.is_recoverable() => {
                warn!("{} unanswered: {}", command, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn fail(&self, tried: Vec<BaudRate>) -> Error {
        error!("Failed to connect to the serial");
        self.conn.close();
        Error::LinkFailed {
            port: self.config.port.clone(),
            tried: tried.into_iter().map(BaudRate::as_u32).collect(),
        }
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        if self.conn.is_open() {
            debug!(port = %self.config.port, "Closing transport on drop");
            self.conn.close();
        }
    }
}
