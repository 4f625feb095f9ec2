//! Enrollment state machine
//!
//! ```text
//! CheckExistence -> AssignId -> Starting -> Capture(1) -> Template(1)
//!                                        -> Capture(2) -> Template(2)
//!                                        -> Capture(3) -> Template(3) -> Done(id)
//! ```
//!
//! Any state can move to `Failed`. Every step retries up to the policy's
//! attempt count and a step that runs out of attempts fails the whole
//! enrollment; nothing carries on with a partial template.

use gt521_core::Command;
use gt521_types::{CaptureMode, Identification, Stage};
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::retry::{AckOutcome, Retry, RetryError};
use crate::workflow::identify;

/// Why an enrollment stopped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrollFailure {
    #[error("finger is already enrolled as #{0}")]
    AlreadyEnrolled(u32),

    #[error("enrolled count unavailable")]
    CountUnavailable,

    #[error("EnrollStart rejected {attempts} times")]
    StartRejected { attempts: usize },

    #[error("stage {stage} failed after {attempts} attempts")]
    StageFailed { stage: Stage, attempts: usize },
}

/// Where an enrollment is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollState {
    /// Make sure the finger is not enrolled yet
    CheckExistence,
    /// Pick the id to enroll under
    AssignId,
    /// Send `EnrollStart`
    Starting,
    /// Capture the finger for a stage
    Capture(Stage),
    /// Build the template for a stage from the capture
    Template(Stage),
    /// Enrolled under this id
    Done(u32),
    Failed(EnrollFailure),
}

impl EnrollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

/// One enrollment, driven step by step or to completion
///
/// # Examples
///
/// ```no_run
/// use gt521::{Device, BaudRate, Enrollment, EnrollState};
///
/// # fn main() -> gt521::Result<()> {
/// let mut device = Device::new("/dev/ttyUSB0", BaudRate::B115200);
/// device.init()?;
/// device.open()?;
///
/// let mut enrollment = Enrollment::new(device.retry().clone());
/// while !enrollment.is_finished() {
///     if let EnrollState::Capture(stage) = enrollment.state() {
///         println!("Place finger ({}/3)", stage);
///     }
///     enrollment.step(&mut device)?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Enrollment {
    retry: Retry,
    state: EnrollState,
    id: Option<u32>,
}

impl Enrollment {
    pub fn new(retry: Retry) -> Self {
        Self {
            retry,
            state: EnrollState::CheckExistence,
            id: None,
        }
    }

    /// Enroll under `id` instead of the next free one
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn state(&self) -> &EnrollState {
        &self.state
    }

    /// Id being enrolled, once assigned
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Perform one transition and return the new state
    ///
    /// Terminal states are left unchanged.
    ///
    /// # Errors
    ///
    /// Errors that end the workflow outright: transport failures and
    /// cancellation. Nacks and timeouts only use up attempts.
    pub fn step(&mut self, device: &mut Device) -> Result<&EnrollState> {
        let next = match self.state {
            EnrollState::CheckExistence => self.check_existence(device)?,
            EnrollState::AssignId => self.assign_id(device)?,
            EnrollState::Starting => self.start(device)?,
            EnrollState::Capture(stage) => self.capture(device, stage)?,
            EnrollState::Template(stage) => self.template(device, stage)?,
            EnrollState::Done(_) | EnrollState::Failed(_) => return Ok(&self.state),
        };

        match &next {
            EnrollState::Failed(reason) => warn!("Enrollment failed: {}", reason),
            state => debug!(?state, "Enrollment step"),
        }
        self.state = next;
        Ok(&self.state)
    }

    /// Step until done, returning the enrolled id
    pub fn run(&mut self, device: &mut Device) -> Result<u32> {
        loop {
            match self.step(device)? {
                EnrollState::Done(id) => return Ok(*id),
                EnrollState::Failed(reason) => return Err(Error::Enroll(reason.clone())),
                _ => {}
            }
        }
    }

    fn check_existence(&self, device: &mut Device) -> Result<EnrollState> {
        let outcome = self.retry.run(
            |attempt| {
                debug!(attempt, "Checking existence");
                identify(device)
            },
            |result| match result {
                Ok(found) => found.is_captured(),
                Err(e) => !e.is_recoverable(),
            },
        );

        let found = match outcome {
            Ok(result) => result?,
            Err(RetryError::Exhausted { .. }) => Identification::NoCapture,
            Err(RetryError::Cancelled) => return Err(gt521_core::Error::Cancelled.into()),
        };

        Ok(match found.matched_id() {
            Some(id) => EnrollState::Failed(EnrollFailure::AlreadyEnrolled(id)),
            None => EnrollState::AssignId,
        })
    }

    fn assign_id(&mut self, device: &mut Device) -> Result<EnrollState> {
        match device.link().dispatcher().call_ack(Command::Open, 0) {
            Ok(true) => {}
            Ok(false) => debug!("Open rejected before enrolling"),
            Err(e) if e.is_recoverable() => debug!("Open unanswered before enrolling: {}", e),
            Err(e) => return Err(e),
        }

        if let Some(id) = self.id {
            info!(id, "Enroll with the requested ID");
            return Ok(EnrollState::Starting);
        }

        let count = match device.get_enrolled_count() {
            Ok(count) => count,
            Err(e) if e.is_recoverable() => None,
            Err(e) => return Err(e),
        };

        Ok(match count {
            Some(id) => {
                info!(id, "Enroll with the ID");
                self.id = Some(id);
                EnrollState::Starting
            }
            None => EnrollState::Failed(EnrollFailure::CountUnavailable),
        })
    }

    fn start(&self, device: &mut Device) -> Result<EnrollState> {
        let Some(id) = self.id else {
            return Ok(EnrollState::AssignId);
        };

        info!(id, "Start enrolling");
        Ok(match self.retry.until_ack(|| device.start_enroll(id))? {
            AckOutcome::Acked { .. } => EnrollState::Capture(Stage::First),
            AckOutcome::Exhausted { attempts } => {
                EnrollState::Failed(EnrollFailure::StartRejected { attempts })
            }
        })
    }

    fn capture(&self, device: &mut Device, stage: Stage) -> Result<EnrollState> {
        info!(%stage, "Capturing a fingerprint");
        let outcome = self
            .retry
            .until_ack(|| device.capture_finger(CaptureMode::Fast))?;

        Ok(match outcome {
            AckOutcome::Acked { .. } => EnrollState::Template(stage),
            AckOutcome::Exhausted { attempts } => {
                EnrollState::Failed(EnrollFailure::StageFailed { stage, attempts })
            }
        })
    }

    fn template(&self, device: &mut Device, stage: Stage) -> Result<EnrollState> {
        Ok(match self.retry.until_ack(|| device.enroll_stage(stage))? {
            AckOutcome::Acked { .. } => match (stage.next(), self.id) {
                (Some(next), _) => EnrollState::Capture(next),
                (None, Some(id)) => EnrollState::Done(id),
                (None, None) => EnrollState::AssignId,
            },
            AckOutcome::Exhausted { attempts } => {
                EnrollState::Failed(EnrollFailure::StageFailed { stage, attempts })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkConfig;
    use gt521_transport::{SimDevice, SimProbe, SimReply};
    use gt521_types::BaudRate;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const TRY_CNT: usize = 5;

    fn retry() -> Retry {
        Retry::new(TRY_CNT, Duration::ZERO)
    }

    fn device(sim: SimDevice) -> (Device, SimProbe) {
        let probe = sim.probe();
        let config = LinkConfig::new("sim")
            .with_baud(BaudRate::B9600)
            .with_settle_delay(Duration::ZERO)
            .with_reopen_delay(Duration::ZERO)
            .with_response_timeout(Duration::from_millis(20));

        let mut device = Device::with_transport(sim, config).with_retry(retry());
        device.init().unwrap();
        probe.clear_journal();
        (device, probe)
    }

    /// Unknown finger, empty database, every step acked
    fn happy(command: Command) -> SimReply {
        match command {
            Command::Identify1_N => SimReply::Nack(0x1008),
            Command::GetEnrollCount => SimReply::Ack(4),
            _ => SimReply::Ack(0),
        }
    }

    #[test]
    fn test_happy_path() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| happy(command)));

        assert_eq!(Enrollment::new(retry()).run(&mut device).unwrap(), 4);

        let start = probe
            .journal()
            .into_iter()
            .find(|p| p.command == Command::EnrollStart)
            .unwrap();
        assert_eq!(start.parameter, 4);
        assert_eq!(probe.count(Command::Enroll1), 1);
        assert_eq!(probe.count(Command::Enroll2), 1);
        assert_eq!(probe.count(Command::Enroll3), 1);
    }

    #[test]
    fn test_step_sequence() {
        let (mut device, _) = device(SimDevice::new(9600, |command, _| happy(command)));
        let mut enrollment = Enrollment::new(retry());

        let mut states = vec![enrollment.state().clone()];
        while !enrollment.is_finished() {
            states.push(enrollment.step(&mut device).unwrap().clone());
        }

        assert_eq!(
            states,
            vec![
                EnrollState::CheckExistence,
                EnrollState::AssignId,
                EnrollState::Starting,
                EnrollState::Capture(Stage::First),
                EnrollState::Template(Stage::First),
                EnrollState::Capture(Stage::Second),
                EnrollState::Template(Stage::Second),
                EnrollState::Capture(Stage::Third),
                EnrollState::Template(Stage::Third),
                EnrollState::Done(4),
            ]
        );
        assert_eq!(enrollment.id(), Some(4));
    }

    #[test]
    fn test_terminal_step_is_noop() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| happy(command)));
        let mut enrollment = Enrollment::new(retry());
        enrollment.run(&mut device).unwrap();
        probe.clear_journal();

        assert_eq!(enrollment.step(&mut device).unwrap(), &EnrollState::Done(4));
        assert!(probe.journal().is_empty());
    }

    #[test]
    fn test_already_enrolled() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| match command {
            Command::Identify1_N => SimReply::Ack(2),
            other => happy(other),
        }));

        match Enrollment::new(retry()).run(&mut device) {
            Err(Error::Enroll(EnrollFailure::AlreadyEnrolled(id))) => assert_eq!(id, 2),
            other => panic!("Expected AlreadyEnrolled, got {:?}", other),
        }
        assert_eq!(probe.count(Command::Identify1_N), 1);
        assert_eq!(probe.count(Command::EnrollStart), 0);
    }

    #[test]
    fn test_existence_check_gives_up_without_finger() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| match command {
            Command::CaptureFinger => SimReply::Nack(0x1012),
            other => happy(other),
        }));
        let mut enrollment = Enrollment::new(retry());

        assert_eq!(enrollment.step(&mut device).unwrap(), &EnrollState::AssignId);
        assert_eq!(probe.count(Command::CaptureFinger), TRY_CNT);
        assert_eq!(probe.count(Command::Identify1_N), 0);
    }

    #[test]
    fn test_enroll1_acked_on_last_attempt() {
        let mut nacks = 0;
        let (mut device, probe) = device(SimDevice::new(9600, move |command, _| match command {
            Command::Enroll1 if nacks < TRY_CNT - 1 => {
                nacks += 1;
                SimReply::Nack(0x100C)
            }
            other => happy(other),
        }));

        assert_eq!(Enrollment::new(retry()).run(&mut device).unwrap(), 4);
        assert_eq!(probe.count(Command::Enroll1), TRY_CNT);
        assert_eq!(probe.count(Command::Enroll3), 1);
    }

    #[test]
    fn test_enroll1_never_acked() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| match command {
            Command::Enroll1 => SimReply::Nack(0x100C),
            other => happy(other),
        }));

        match Enrollment::new(retry()).run(&mut device) {
            Err(Error::Enroll(EnrollFailure::StageFailed { stage, attempts })) => {
                assert_eq!(stage, Stage::First);
                assert_eq!(attempts, TRY_CNT);
            }
            other => panic!("Expected StageFailed, got {:?}", other),
        }
        assert_eq!(probe.count(Command::Enroll1), TRY_CNT);
        assert_eq!(probe.count(Command::Enroll2), 0);
    }

    #[test]
    fn test_start_rejected() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| match command {
            Command::EnrollStart => SimReply::Nack(0x1005),
            other => happy(other),
        }));

        match Enrollment::new(retry()).run(&mut device) {
            Err(Error::Enroll(EnrollFailure::StartRejected { attempts })) => {
                assert_eq!(attempts, TRY_CNT)
            }
            other => panic!("Expected StartRejected, got {:?}", other),
        }
        assert_eq!(probe.count(Command::CaptureFinger), 1);
    }

    #[test]
    fn test_count_unavailable() {
        let (mut device, _) = device(SimDevice::new(9600, |command, _| match command {
            Command::GetEnrollCount => SimReply::Nack(0x100F),
            other => happy(other),
        }));

        assert!(matches!(
            Enrollment::new(retry()).run(&mut device),
            Err(Error::Enroll(EnrollFailure::CountUnavailable))
        ));
    }

    #[test]
    fn test_second_capture_exhausted() {
        let mut captures = 0;
        let (mut device, probe) = device(SimDevice::new(9600, move |command, _| match command {
            Command::CaptureFinger => {
                captures += 1;
                // existence check and stage one succeed, then the finger is gone
                if captures <= 2 {
                    SimReply::Ack(0)
                } else {
                    SimReply::Nack(0x1012)
                }
            }
            other => happy(other),
        }));

        match Enrollment::new(retry()).run(&mut device) {
            Err(Error::Enroll(EnrollFailure::StageFailed { stage, attempts })) => {
                assert_eq!(stage, Stage::Second);
                assert_eq!(attempts, TRY_CNT);
            }
            other => panic!("Expected StageFailed, got {:?}", other),
        }
        assert_eq!(probe.count(Command::Enroll2), 0);
    }

    #[test]
    fn test_requested_id() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| happy(command)));

        assert_eq!(device.enroll_as(17).unwrap(), 17);
        assert_eq!(probe.count(Command::GetEnrollCount), 0);
    }

    #[test]
    fn test_recovers_from_corrupted_frame() {
        let (mut device, probe) = device(SimDevice::new(9600, |command, _| happy(command)));
        probe.corrupt_next(3);

        assert_eq!(device.enroll().unwrap(), 4);
    }

    #[test]
    fn test_cancelled_enrollment() {
        let (mut device, _) = device(SimDevice::new(9600, |command, _| happy(command)));
        device.close_serial();

        let err = Enrollment::new(retry()).run(&mut device).unwrap_err();
        assert!(err.is_cancelled());
    }
}
