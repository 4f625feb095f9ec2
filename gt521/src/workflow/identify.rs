//! One identification pass

use gt521_types::{CaptureMode, Identification};
use tracing::debug;

use crate::device::Device;
use crate::error::Result;

/// Capture a finger and look it up in the device database
///
/// Makes a single attempt. A failed capture yields
/// [`Identification::NoCapture`], whether the device rejected it or its
/// answer was lost to a timeout or a bad frame. A nack or a negative id from
/// the lookup both yield [`Identification::NoMatch`].
///
/// Transport failures and cancellation are still returned as errors.
pub fn identify(device: &mut Device) -> Result<Identification> {
    let captured = match device.capture_finger(CaptureMode::Fast) {
        Ok(captured) => captured,
        Err(e) if e.is_recoverable() => {
            debug!("Capture unanswered: {}", e);
            false
        }
        Err(e) => return Err(e),
    };
    if !captured {
        debug!("No finger captured");
        return Ok(Identification::NoCapture);
    }

    let result = device.identify_captured()?;
    debug!(%result, "Identified");
    Ok(result)
}
