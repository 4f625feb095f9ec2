//! Command/response exchange
//!
//! Every command the driver sends goes through [`CommandDispatcher`]:
//! encode, write, then wait for exactly one response packet.

use std::time::Duration;

use gt521_core::{Command, CommandPacket, DataPacket, Deadline, ResponsePacket};
use tracing::debug;

use crate::error::{Error, Result};
use crate::link::Connection;

/// How long to wait for a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// A single read window; used for the handshake `Open`
    Once,
    /// Keep reading until the duration has passed
    Bounded(Duration),
}

impl WaitPolicy {
    pub fn deadline(self) -> Deadline {
        match self {
            Self::Once => Deadline::immediate(),
            Self::Bounded(budget) => Deadline::after(budget),
        }
    }
}

/// Sends commands over a link and reads their responses
///
/// Borrowed from [`LinkManager::dispatcher`](crate::LinkManager::dispatcher).
pub struct CommandDispatcher<'a> {
    conn: &'a Connection,
    wait: WaitPolicy,
}

impl<'a> CommandDispatcher<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            wait: WaitPolicy::Bounded(gt521_core::constants::DEFAULT_RESPONSE_TIMEOUT),
        }
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn wait(&self) -> WaitPolicy {
        self.wait
    }

    /// Send `command` and return the response, ack or nack
    ///
    /// # Errors
    ///
    /// - Transport error if the command cannot be written
    /// - `Timeout` if no valid response arrives in time
    /// - `Cancelled` if the link is closed while waiting
    pub fn call(&self, command: Command, parameter: u32) -> Result<ResponsePacket> {
        debug!(%command, parameter, "Request");
        self.conn
            .write_packet(&CommandPacket::new(command, parameter))?;

        let response = self.conn.read_response(self.wait.deadline())?;
        match response.nack_code() {
            None => debug!(%command, parameter = response.parameter, "Ack"),
            Some(code) => debug!(%command, %code, "Nack"),
        }

        Ok(response)
    }

    /// Send `command` and report whether it was acked
    pub fn call_ack(&self, command: Command, parameter: u32) -> Result<bool> {
        Ok(self.call(command, parameter)?.ack)
    }

    /// Send `command` and return the ack flag with the response parameter
    pub fn call_value(&self, command: Command, parameter: u32) -> Result<(bool, u32)> {
        let response = self.call(command, parameter)?;
        Ok((response.ack, response.parameter))
    }

    /// Send `command` and collect the data packet that follows an ack
    ///
    /// Only commands with a data phase read past the response; for any
    /// other command the buffer is left as it is.
    pub fn call_data(
        &self,
        command: Command,
        parameter: u32,
    ) -> Result<(ResponsePacket, Option<DataPacket>)> {
        let response = self.call(command, parameter)?;
        if !response.ack || !command.has_data_phase() {
            return Ok((response, None));
        }

        let data = self.conn.read_data()?;
        if data.is_none() {
            debug!(%command, "Ack without data packet");
        }
        Ok((response, data))
    }

    /// Send `command`, turning a nack into [`Error::CommandNack`]
    pub fn expect_ack(&self, command: Command, parameter: u32) -> Result<ResponsePacket> {
        let response = self.call(command, parameter)?;
        match response.nack_code() {
            None => Ok(response),
            Some(code) => Err(Error::CommandNack { command, code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt521_core::{CancelToken, NackCode};
    use gt521_transport::{SimDevice, SimReply, Transport};
    use pretty_assertions::assert_eq;

    fn connect(mut device: SimDevice) -> Connection {
        device.open(9600).unwrap();
        Connection::new(Box::new(device), CancelToken::new())
    }

    fn dispatcher(conn: &Connection) -> CommandDispatcher<'_> {
        CommandDispatcher::new(conn).with_wait(WaitPolicy::Bounded(Duration::from_millis(20)))
    }

    fn enrolled(count: u32) -> SimDevice {
        SimDevice::new(9600, move |command, _| match command {
            Command::GetEnrollCount => SimReply::Ack(count),
            Command::Identify1_N => SimReply::Nack(0x1008),
            Command::GetImage => SimReply::AckWithData(0, vec![0x11, 0x22, 0x33]),
            Command::GetRawImage => SimReply::Nack(0x100F),
            _ => SimReply::Ack(0),
        })
    }

    #[test]
    fn test_call_value() {
        let conn = connect(enrolled(4));
        assert_eq!(
            dispatcher(&conn).call_value(Command::GetEnrollCount, 0).unwrap(),
            (true, 4)
        );
    }

    #[test]
    fn test_call_ack_nack() {
        let conn = connect(enrolled(0));
        assert!(!dispatcher(&conn).call_ack(Command::Identify1_N, 0).unwrap());
    }

    #[test]
    fn test_parameter_reaches_device() {
        let device = enrolled(0);
        let probe = device.probe();
        let conn = connect(device);

        dispatcher(&conn).call_ack(Command::DeleteID, 12).unwrap();
        assert_eq!(
            probe.journal(),
            vec![CommandPacket::new(Command::DeleteID, 12)]
        );
    }

    #[test]
    fn test_call_data_reads_payload() {
        let conn = connect(enrolled(0));
        let (response, data) = dispatcher(&conn).call_data(Command::GetImage, 0).unwrap();

        assert!(response.ack);
        assert_eq!(data.unwrap().payload.as_ref(), &[0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_call_data_skipped_on_nack() {
        let conn = connect(enrolled(0));
        let (response, data) = dispatcher(&conn).call_data(Command::GetRawImage, 0).unwrap();

        assert_eq!(response.nack_code(), Some(NackCode::DevErr));
        assert_eq!(data, None);
    }

    #[test]
    fn test_call_data_without_data_phase() {
        let conn = connect(SimDevice::new(9600, |_, _| {
            SimReply::AckWithData(0, vec![0x01, 0x02])
        }));
        let (response, data) = dispatcher(&conn).call_data(Command::Open, 0).unwrap();

        assert!(response.ack);
        assert_eq!(data, None);
        assert!(conn.flush().unwrap() > 0);
    }

    #[test]
    fn test_call_ack_leaves_data_packet_unread() {
        let conn = connect(enrolled(0));
        assert!(dispatcher(&conn).call_ack(Command::GetImage, 0).unwrap());
        assert!(conn.flush().unwrap() > 0);
    }

    #[test]
    fn test_expect_ack_maps_nack() {
        let conn = connect(enrolled(0));
        match dispatcher(&conn).expect_ack(Command::Identify1_N, 0) {
            Err(Error::CommandNack { command, code }) => {
                assert_eq!(command, Command::Identify1_N);
                assert_eq!(code, NackCode::IdentifyFailed);
            }
            other => panic!("Expected CommandNack, got {:?}", other),
        }
    }

    #[test]
    fn test_noise_before_response() {
        let device = enrolled(9);
        let probe = device.probe();
        let conn = connect(device);

        probe.inject_noise(&[0x00, 0x55, 0x13, 0xAA]);
        assert_eq!(
            dispatcher(&conn).call_value(Command::GetEnrollCount, 0).unwrap(),
            (true, 9)
        );
    }

    #[test]
    fn test_corrupted_response_is_skipped() {
        let device = enrolled(5);
        let probe = device.probe();
        let conn = connect(device);

        probe.corrupt_next(1);
        assert_eq!(
            dispatcher(&conn).call_value(Command::GetEnrollCount, 0).unwrap(),
            (true, 5)
        );
    }

    #[test]
    fn test_silent_device_times_out() {
        let conn = connect(SimDevice::new(9600, |_, _| SimReply::Silent));
        let result = dispatcher(&conn).call(Command::Open, 0);

        assert!(matches!(
            result,
            Err(Error::Core(gt521_core::Error::Timeout { .. }))
        ));
    }

    #[test]
    fn test_once_policy_deadline() {
        assert!(WaitPolicy::Once.deadline().is_expired());
        let bounded = WaitPolicy::Bounded(Duration::from_secs(3)).deadline();
        assert_eq!(bounded.budget(), Duration::from_secs(3));
    }

    #[test]
    fn test_write_on_closed_link_fails() {
        let conn = Connection::new(Box::new(enrolled(0)), CancelToken::new());
        assert!(matches!(
            dispatcher(&conn).call_ack(Command::Open, 0),
            Err(Error::Transport(gt521_transport::Error::NotConnected))
        ));
    }
}
