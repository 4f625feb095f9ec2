//! GT-521 checksum algorithm
//!
//! The checksum is the plain byte sum of the first ten bytes of a frame,
//! truncated to 16 bits and stored little-endian in bytes 10–11.

use tracing::trace;

/// Offset of the checksum field inside a 12-byte frame
pub const CHECKSUM_OFFSET: usize = 10;

/// Calculate the 16-bit truncated sum of `bytes`
///
/// # Examples
///
/// ```
/// use gt521_core::checksum;
///
/// // Open command: 55 AA 01 00 00 00 00 00 01 00
/// let sum = checksum::calculate(&[0x55, 0xAA, 0x01, 0x00, 0, 0, 0, 0, 0x01, 0x00]);
/// assert_eq!(sum, 0x0101);
/// ```
pub fn calculate(bytes: &[u8]) -> u16 {
    let checksum = bytes
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)));

    trace!(
        len = bytes.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify the checksum of a complete frame
pub fn verify(frame: &[u8; 12]) -> bool {
    let received = u16::from_le_bytes([frame[CHECKSUM_OFFSET], frame[CHECKSUM_OFFSET + 1]]);
    calculate(&frame[..CHECKSUM_OFFSET]) == received
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: [u8; 12] = [0x55, 0xAA, 0x01, 0x00, 0, 0, 0, 0, 0x01, 0x00, 0x01, 0x01];

    #[test]
    fn test_checksum_open_frame() {
        assert_eq!(calculate(&OPEN[..10]), 0x0101);
        assert!(verify(&OPEN));
    }

    #[test]
    fn test_checksum_truncates_to_16_bits() {
        let bytes = vec![0xFF; 300];
        // 300 * 255 = 76500 = 0x12AD4
        assert_eq!(calculate(&bytes), 0x2AD4);
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(calculate(&[]), 0);
    }

    #[test]
    fn test_verify_rejects_corrupt_checksum() {
        let mut frame = OPEN;
        frame[11] ^= 0x01;
        assert!(!verify(&frame));
    }
}
