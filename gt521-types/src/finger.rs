//! Capture, enrollment and identification values

use std::fmt;

/// Image quality requested from `CaptureFinger`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Fast capture, good enough for identification
    #[default]
    Fast,
    /// Slower, higher-quality capture
    Best,
}

impl CaptureMode {
    /// Value sent as the command parameter
    pub fn parameter(self) -> u32 {
        match self {
            Self::Fast => 0,
            Self::Best => 1,
        }
    }
}

/// One of the three enrollment stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    First = 1,
    Second = 2,
    Third = 3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::First, Stage::Second, Stage::Third];

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Stage after this one, `None` after the third
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::First => Some(Self::Second),
            Self::Second => Some(Self::Third),
            Self::Third => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Outcome of one identification pass
///
/// The device reports "no match" either as a nack or as an ack whose
/// parameter is negative; both map to [`Identification::NoMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    /// No finger image could be captured
    NoCapture,
    /// A finger was captured but matches no enrolled template
    NoMatch,
    /// The finger matches the template stored under this id
    Match(u32),
}

impl Identification {
    /// Encoding used by callers that expect `None`, `-1` or an id
    pub fn legacy(self) -> Option<i64> {
        match self {
            Self::NoCapture => None,
            Self::NoMatch => Some(-1),
            Self::Match(id) => Some(i64::from(id)),
        }
    }

    /// Whether a finger was captured at all
    pub fn is_captured(self) -> bool {
        !matches!(self, Self::NoCapture)
    }

    pub fn matched_id(self) -> Option<u32> {
        match self {
            Self::Match(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCapture => write!(f, "no capture"),
            Self::NoMatch => write!(f, "no match"),
            Self::Match(id) => write!(f, "match #{}", id),
        }
    }
}
