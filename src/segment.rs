//! Segmented firmware download status.
//!
//! Byte layout (10 bytes):
//!
//! ```text
//! 0      low nibble: binary type (high nibble unused)
//! 1..=3  firmware version major, minor, patch
//! 4..=6  package size, 24-bit big-endian
//! 7      low nibble: segment size code, high nibble: next segment id
//! 8..=9  pending-segment bitmap, little-endian (bit set = still missing)
//! ```

use crate::error::FrameError;
use crate::types::FirmwareVersion;

pub const SEGMENTED_FILE_STATUS_LEN: usize = 10;
const KIB: u32 = 1024;

/// Which image a segmented download carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryType {
    Mcm,
    Host,
    Other(u8),
}

impl BinaryType {
    fn from_nibble(value: u8) -> Self {
        match value {
            0 => Self::Mcm,
            1 => Self::Host,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentedFileStatus {
    pub binary_type: BinaryType,
    pub firmware_version: FirmwareVersion,
    pub package_size: u32,
    pub segment_size_code: u8,
    pub next_segment_id: u8,
    pub segment_bitmap: u16,
}

impl SegmentedFileStatus {
    /// Decode the 10-byte status block; any other length is rejected
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let bytes: &[u8; SEGMENTED_FILE_STATUS_LEN] =
            data.try_into().map_err(|_| FrameError::InvalidSerialData {
                expected: SEGMENTED_FILE_STATUS_LEN,
                actual: data.len(),
            })?;

        Ok(Self {
            binary_type: BinaryType::from_nibble(bytes[0] & 0x0F),
            firmware_version: FirmwareVersion::new(bytes[1], bytes[2], bytes[3]),
            package_size: u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]]),
            segment_size_code: bytes[7] & 0x0F,
            next_segment_id: bytes[7] >> 4,
            segment_bitmap: u16::from_le_bytes([bytes[8], bytes[9]]),
        })
    }

    /// Segment size in bytes, 0 when the code is unknown
    pub fn segment_size(&self) -> u32 {
        segment_size_bytes(self.segment_size_code)
    }

    /// Number of segments the package spans, `None` when the segment size is unknown
    pub fn total_segments(&self) -> Option<u32> {
        match self.segment_size() {
            0 => None,
            size => Some(self.package_size.div_ceil(size)),
        }
    }

    pub fn is_complete(&self) -> bool {
        is_complete(self)
    }
}

/// Map a segment size code to bytes: 0..=3 are 64, 128, 256 and 512 KiB
pub fn segment_size_bytes(code: u8) -> u32 {
    match code {
        0 => 64 * KIB,
        1 => 128 * KIB,
        2 => 256 * KIB,
        3 => 512 * KIB,
        _ => 0,
    }
}

/// True when no segment in `0..total_segments` is still pending.
///
/// An unknown segment size can't be evaluated and reads as incomplete.
pub fn is_complete(status: &SegmentedFileStatus) -> bool {
    let Some(total) = status.total_segments() else {
        return false;
    };
    (0..total.min(u16::BITS)).all(|bit| status.segment_bitmap & (1 << bit) == 0)
}
