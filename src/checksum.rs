//! Single-byte XOR frame check.
//!
//! The module documentation calls this byte a "CRC" but it is a plain XOR
//! fold over every byte preceding it. Keep the algorithm as-is for wire
//! compatibility.

use crate::error::FrameError;
use crate::frame::MIN_COMMAND_FRAME_LEN;

/// XOR-fold of all input bytes
pub fn compute(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Write the checksum of `frame[..len - 1]` into the final byte
pub fn append(frame: &mut [u8]) -> Result<(), FrameError> {
    if frame.len() < MIN_COMMAND_FRAME_LEN {
        return Err(FrameError::InvalidLength(frame.len()));
    }
    let last = frame.len() - 1;
    frame[last] = compute(&frame[..last]);
    Ok(())
}

/// Check the trailing byte against the fold of everything before it
pub(crate) fn verify(frame: &[u8]) -> Result<(), FrameError> {
    let Some((&actual, body)) = frame.split_last() else {
        return Err(FrameError::InvalidLength(0));
    };
    let expected = compute(body);
    if expected != actual {
        return Err(FrameError::InvalidChecksum { expected, actual });
    }
    Ok(())
}
