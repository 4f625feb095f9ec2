//! Type definitions for gt521

pub mod baud_rate;
pub mod error;
pub mod finger;

pub use baud_rate::BaudRate;
pub use error::{Error, Result};
pub use finger::{CaptureMode, Identification, Stage};
