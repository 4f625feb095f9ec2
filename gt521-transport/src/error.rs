//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Failed to open {port} at {baud} baud: {source}")]
    Open {
        port: String,
        baud: u32,
        #[source]
        source: serialport::Error,
    },

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        written: usize,
        expected: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
