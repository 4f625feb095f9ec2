//! High-level error types

use gt521_core::{Command, NackCode};

use crate::workflow::EnrollFailure;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] gt521_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] gt521_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] gt521_types::Error),

    #[error("No handshake on {port} at any of {tried:?} baud")]
    LinkFailed {
        port: String,
        tried: Vec<u32>,
    },

    #[error("Device rejected {command}: {code}")]
    CommandNack {
        command: Command,
        code: NackCode,
    },

    #[error("{command} not satisfied after {attempts} attempts")]
    RetryExhausted {
        command: Command,
        attempts: usize,
    },

    #[error("Enrollment failed: {0}")]
    Enroll(#[from] EnrollFailure),
}

impl Error {
    /// Whether a retry loop may keep going after this error
    ///
    /// Timeouts, discarded frames and nacks consume retry budget; transport
    /// failures and cancellation end the operation.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::CommandNack { .. } => true,
            _ => false,
        }
    }

    /// Whether the link was closed on request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(gt521_core::Error::Cancelled))
    }
}
