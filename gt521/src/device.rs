//! High-level device interface

use bytes::Bytes;
use gt521_core::Command;
use gt521_transport::{SerialTransport, Transport};
use gt521_types::{BaudRate, CaptureMode, Identification, Stage};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::link::{CloseHandle, LinkManager};
use crate::retry::{Retry, RetryError};
use crate::workflow::{self, Enrollment};

/// GT-521Fxx fingerprint sensor
///
/// One method per sensor command, plus the enrollment and identification
/// workflows built from them. Methods returning `Result<bool>` report the
/// device's ack; errors are reserved for the link failing.
///
/// # Examples
///
/// ```no_run
/// use gt521::{BaudRate, Device};
///
/// fn main() -> gt521::Result<()> {
///     let mut device = Device::new("/dev/ttyUSB0", BaudRate::B115200);
///
///     device.init()?;
///     device.open()?;
///     println!("Enrolled: {:?}", device.get_enrolled_count()?);
///
///     let id = device.enroll()?;
///     println!("Enrolled as #{}", id);
///
///     device.close()?;
///     Ok(())
/// }
/// ```
pub struct Device {
    link: LinkManager,
    retry: Retry,
}

impl Device {
    /// Sensor on the serial port `port`, to be brought up at `baud`
    pub fn new(port: impl Into<String>, baud: BaudRate) -> Self {
        Self::with_config(LinkConfig::new(port).with_baud(baud))
    }

    /// Sensor on a serial port described by `config`
    pub fn with_config(config: LinkConfig) -> Self {
        let transport =
            SerialTransport::new(config.port.clone()).with_read_timeout(config.read_timeout);
        Self::with_transport(transport, config)
    }

    /// Sensor behind any transport
    pub fn with_transport(transport: impl Transport + 'static, config: LinkConfig) -> Self {
        let link = LinkManager::new(Box::new(transport), config);
        let retry = Retry::default().with_cancel(link.cancel_token());
        Self { link, retry }
    }

    /// Retry policy for workflows and finger polling
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry.with_cancel(self.link.cancel_token());
        self
    }

    pub fn retry(&self) -> &Retry {
        &self.retry
    }

    pub fn link(&self) -> &LinkManager {
        &self.link
    }

    /// Bring the link up at the configured baud rate
    pub fn init(&mut self) -> Result<()> {
        let baud = self.link.config().baud;
        self.link.init(baud)
    }

    /// Start a session on the device
    pub fn open(&mut self) -> Result<()> {
        self.link.open()
    }

    /// End the session on the device
    pub fn close(&mut self) -> Result<()> {
        self.link.close()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Handle for closing the link from another thread
    pub fn close_handle(&self) -> CloseHandle {
        self.link.close_handle()
    }

    /// Cancel pending waits and close the serial port
    pub fn close_serial(&self) {
        self.link.close_serial();
    }

    /// Switch the backlight on or off
    pub fn set_led(&mut self, on: bool) -> Result<bool> {
        self.link
            .dispatcher()
            .call_ack(Command::CmosLed, u32::from(on))
    }

    /// Number of enrolled fingerprints, `None` if the device refuses
    pub fn get_enrolled_count(&mut self) -> Result<Option<u32>> {
        let (ack, count) = self
            .link
            .dispatcher()
            .call_value(Command::GetEnrollCount, 0)?;
        Ok(ack.then_some(count))
    }

    /// Whether a finger is on the sensor, `None` if the device refuses
    pub fn is_finger_pressed(&mut self) -> Result<Option<bool>> {
        self.led_best_effort(true);
        let pressed = self
            .link
            .dispatcher()
            .call_value(Command::IsPressFinger, 0);
        self.led_best_effort(false);

        let (ack, state) = pressed?;
        Ok(ack.then_some(state == 0))
    }

    /// Poll until the finger is `pressed` (or lifted)
    ///
    /// Polls up to the retry policy's attempt count.
    pub fn wait_for_finger(&mut self, pressed: bool) -> Result<()> {
        let retry = self.retry.clone();
        let outcome = retry.run(
            |_| self.is_finger_pressed(),
            |result| match result {
                Ok(state) => *state == Some(pressed),
                Err(e) => !e.is_recoverable(),
            },
        );

        match outcome {
            Ok(result) => result.map(|_| ()),
            Err(RetryError::Exhausted { attempts, .. }) => Err(Error::RetryExhausted {
                command: Command::IsPressFinger,
                attempts,
            }),
            Err(RetryError::Cancelled) => Err(gt521_core::Error::Cancelled.into()),
        }
    }

    /// Switch the device and the link to `baud`
    pub fn change_baud(&mut self, baud: BaudRate) -> Result<bool> {
        self.link.change_baud(baud)
    }

    /// Capture a fingerprint image, with the backlight on while capturing
    pub fn capture_finger(&mut self, mode: CaptureMode) -> Result<bool> {
        self.led_best_effort(true);
        let captured = self
            .link
            .dispatcher()
            .call_ack(Command::CaptureFinger, mode.parameter());
        self.led_best_effort(false);
        captured
    }

    /// Begin enrolling under `id`
    pub fn start_enroll(&mut self, id: u32) -> Result<bool> {
        self.link.dispatcher().call_ack(Command::EnrollStart, id)
    }

    /// Turn the last capture into the template for `stage`
    pub fn enroll_stage(&mut self, stage: Stage) -> Result<bool> {
        let command = match stage {
            Stage::First => Command::Enroll1,
            Stage::Second => Command::Enroll2,
            Stage::Third => Command::Enroll3,
        };
        self.link.dispatcher().call_ack(command, 0)
    }

    /// Whether a template is stored under `id`
    pub fn check_enrolled(&mut self, id: u32) -> Result<bool> {
        self.link.dispatcher().call_ack(Command::CheckEnrolled, id)
    }

    /// Match the last capture against the template stored under `id`
    pub fn verify(&mut self, id: u32) -> Result<bool> {
        self.link.dispatcher().call_ack(Command::Verify1_1, id)
    }

    /// Delete one template, or every template when `id` is `None`
    pub fn delete(&mut self, id: Option<u32>) -> Result<bool> {
        let dispatcher = self.link.dispatcher();
        match id {
            Some(id) => dispatcher.call_ack(Command::DeleteID, id),
            None => {
                warn!("Deleting all fingerprints");
                dispatcher.call_ack(Command::DeleteAll, 0)
            }
        }
    }

    /// Download the last captured image (256x256)
    pub fn get_image(&mut self) -> Result<Option<Bytes>> {
        self.download(Command::GetImage)
    }

    /// Capture and download a raw image (320x240)
    pub fn get_raw_image(&mut self) -> Result<Option<Bytes>> {
        self.download(Command::GetRawImage)
    }

    /// Match the last capture against the whole database
    ///
    /// Does not capture; see [`identify`](Self::identify) for the full pass.
    pub fn identify_captured(&mut self) -> Result<Identification> {
        let (ack, parameter) = self
            .link
            .dispatcher()
            .call_value(Command::Identify1_N, 0)?;

        if !ack || (parameter as i32) < 0 {
            return Ok(Identification::NoMatch);
        }
        Ok(Identification::Match(parameter))
    }

    /// Capture a finger and look it up
    pub fn identify(&mut self) -> Result<Identification> {
        workflow::identify(self)
    }

    /// Enroll a new finger under the next free id
    ///
    /// Fails with [`EnrollFailure::AlreadyEnrolled`](crate::EnrollFailure)
    /// when the finger is already known.
    pub fn enroll(&mut self) -> Result<u32> {
        let retry = self.retry.clone();
        let id = Enrollment::new(retry).run(self)?;
        info!(id, "Enrollment finished");
        Ok(id)
    }

    /// Enroll a new finger under `id`
    pub fn enroll_as(&mut self, id: u32) -> Result<u32> {
        let retry = self.retry.clone();
        Enrollment::new(retry).with_id(id).run(self)
    }

    fn download(&mut self, command: Command) -> Result<Option<Bytes>> {
        let (_, data) = self.link.dispatcher().call_data(command, 0)?;
        Ok(data.map(|packet| {
            debug!(%command, len = packet.len(), "Image downloaded");
            packet.payload
        }))
    }

    fn led_best_effort(&mut self, on: bool) {
        match self.set_led(on) {
            Ok(true) => {}
            Ok(false) => debug!(on, "LED command rejected"),
            Err(e) => debug!(on, "LED command failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gt521_transport::{SimDevice, SimReply};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sim_device(device: SimDevice) -> Device {
        let config = LinkConfig::new("sim")
            .with_baud(BaudRate::B9600)
            .with_settle_delay(Duration::ZERO)
            .with_reopen_delay(Duration::ZERO)
            .with_response_timeout(Duration::from_millis(20));

        let mut device = Device::with_transport(device, config)
            .with_retry(Retry::new(10, Duration::ZERO));
        device.init().unwrap();
        device
    }

    #[test]
    fn test_device_create() {
        let device = Device::new("/dev/ttyUSB0", BaudRate::B115200);
        assert!(!device.is_connected());
        assert_eq!(device.retry().attempts(), 10);
    }

    #[test]
    fn test_init_and_session() {
        let sim = SimDevice::always_ack(9600);
        let probe = sim.probe();
        let mut device = sim_device(sim);

        assert!(device.is_connected());
        probe.clear_journal();

        device.open().unwrap();
        device.close().unwrap();
        assert_eq!(probe.commands(), vec![Command::Open, Command::Close]);
    }

    #[test]
    fn test_enrolled_count() {
        let mut device = sim_device(SimDevice::new(9600, |command, _| match command {
            Command::GetEnrollCount => SimReply::Ack(3),
            _ => SimReply::Ack(0),
        }));
        assert_eq!(device.get_enrolled_count().unwrap(), Some(3));
    }

    #[test]
    fn test_enrolled_count_refused() {
        let mut device = sim_device(SimDevice::new(9600, |command, _| match command {
            Command::GetEnrollCount => SimReply::Nack(0x100F),
            _ => SimReply::Ack(0),
        }));
        assert_eq!(device.get_enrolled_count().unwrap(), None);
    }

    #[test]
    fn test_finger_pressed_wraps_led() {
        let sim = SimDevice::always_ack(9600);
        let probe = sim.probe();
        let mut device = sim_device(sim);
        probe.clear_journal();

        assert_eq!(device.is_finger_pressed().unwrap(), Some(true));

        let journal = probe.journal();
        assert_eq!(
            journal.iter().map(|p| (p.command, p.parameter)).collect::<Vec<_>>(),
            vec![
                (Command::CmosLed, 1),
                (Command::IsPressFinger, 0),
                (Command::CmosLed, 0)
            ]
        );
    }

    #[test]
    fn test_finger_not_pressed() {
        let mut device = sim_device(SimDevice::new(9600, |command, _| match command {
            Command::IsPressFinger => SimReply::Ack(1),
            _ => SimReply::Ack(0),
        }));
        assert_eq!(device.is_finger_pressed().unwrap(), Some(false));
    }

    #[test]
    fn test_wait_for_finger_exhausted() {
        let sim = SimDevice::new(9600, |command, _| match command {
            Command::IsPressFinger => SimReply::Ack(1),
            _ => SimReply::Ack(0),
        });
        let probe = sim.probe();
        let mut device = sim_device(sim).with_retry(Retry::new(4, Duration::ZERO));

        match device.wait_for_finger(true) {
            Err(Error::RetryExhausted { command, attempts }) => {
                assert_eq!(command, Command::IsPressFinger);
                assert_eq!(attempts, 4);
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(probe.count(Command::IsPressFinger), 4);
    }

    #[test]
    fn test_wait_for_finger_lifted() {
        let mut device = sim_device(SimDevice::new(9600, |command, _| match command {
            Command::IsPressFinger => SimReply::Ack(1),
            _ => SimReply::Ack(0),
        }));
        device.wait_for_finger(false).unwrap();
    }

    #[test]
    fn test_capture_ignores_led_failure() {
        let sim = SimDevice::new(9600, |command, _| match command {
            Command::CmosLed => SimReply::Nack(0x100E),
            _ => SimReply::Ack(0),
        });
        let probe = sim.probe();
        let mut device = sim_device(sim);

        assert!(device.capture_finger(CaptureMode::Best).unwrap());
        let capture = probe
            .journal()
            .into_iter()
            .find(|p| p.command == Command::CaptureFinger)
            .unwrap();
        assert_eq!(capture.parameter, 1);
    }

    #[test]
    fn test_enroll_stage_commands() {
        let sim = SimDevice::always_ack(9600);
        let probe = sim.probe();
        let mut device = sim_device(sim);
        probe.clear_journal();

        for stage in Stage::ALL {
            assert!(device.enroll_stage(stage).unwrap());
        }
        assert_eq!(
            probe.commands(),
            vec![Command::Enroll1, Command::Enroll2, Command::Enroll3]
        );
    }

    #[test]
    fn test_delete_one_and_all() {
        let sim = SimDevice::always_ack(9600);
        let probe = sim.probe();
        let mut device = sim_device(sim);
        probe.clear_journal();

        assert!(device.delete(Some(0)).unwrap());
        assert!(device.delete(None).unwrap());

        let journal = probe.journal();
        assert_eq!(journal[0].command, Command::DeleteID);
        assert_eq!(journal[0].parameter, 0);
        assert_eq!(journal[1].command, Command::DeleteAll);
    }

    #[test]
    fn test_check_enrolled_and_verify() {
        let mut device = sim_device(SimDevice::new(9600, |command, id| match command {
            Command::CheckEnrolled if id == 2 => SimReply::Ack(0),
            Command::CheckEnrolled => SimReply::Nack(0x1004),
            Command::Verify1_1 if id == 2 => SimReply::Ack(0),
            Command::Verify1_1 => SimReply::Nack(0x1007),
            _ => SimReply::Ack(0),
        }));

        assert!(device.check_enrolled(2).unwrap());
        assert!(!device.check_enrolled(3).unwrap());
        assert!(device.verify(2).unwrap());
        assert!(!device.verify(5).unwrap());
    }

    #[test]
    fn test_get_image() {
        let image: Vec<u8> = (0..=255).collect();
        let expected = image.clone();
        let mut device = sim_device(SimDevice::new(9600, move |command, _| match command {
            Command::GetImage => SimReply::AckWithData(0, image.clone()),
            Command::GetRawImage => SimReply::Nack(0x1010),
            _ => SimReply::Ack(0),
        }));

        let data = device.get_image().unwrap().unwrap();
        assert_eq!(data.as_ref(), expected.as_slice());
        assert_eq!(device.get_raw_image().unwrap(), None);
    }

    #[test]
    fn test_identify_captured_negative_parameter() {
        let mut device = sim_device(SimDevice::new(9600, |command, _| match command {
            Command::Identify1_N => SimReply::Ack(u32::MAX),
            _ => SimReply::Ack(0),
        }));
        assert_eq!(device.identify_captured().unwrap(), Identification::NoMatch);
    }

    #[test]
    fn test_change_baud() {
        let sim = SimDevice::always_ack(9600);
        let probe = sim.probe();
        let mut device = sim_device(sim);

        assert!(device.change_baud(BaudRate::B115200).unwrap());
        assert_eq!(probe.device_baud(), 115200);
        device.open().unwrap();
    }

    #[test]
    fn test_commands_after_close_serial() {
        let mut device = sim_device(SimDevice::always_ack(9600));
        device.close_handle().close_serial();

        assert!(!device.is_connected());
        assert!(device.set_led(true).unwrap_err().is_cancelled());
    }

    #[test]
    #[ignore] // Only run with real device
    fn test_device_init_hardware() {
        let mut device = Device::with_config(LinkConfig::from_env().unwrap());
        device.init().unwrap();
        device.open().unwrap();
        println!("Enrolled: {:?}", device.get_enrolled_count().unwrap());
        device.close().unwrap();
    }
}
