//! Frame layout, outbound encoding and inbound validation.
//!
//! ```text
//! command:      | category | code_hi | code_lo | len_hi | len_lo | payload.. | xor |
//! response:     | result | category | code_hi | code_lo | len_hi | len_lo | payload.. | xor |
//! notification: | 0x20 | 0x00 | 0x01 | pending | xor |
//! ```
//!
//! The module may deliver a notification and a response back to back in
//! one read. [`classify`] and [`split_combined`] separate them using the
//! same fixed-order heuristic the module firmware expects: at most one
//! notification and one response per buffer.

use bytes::BufMut;

use crate::checksum;
use crate::error::FrameError;
use crate::types::{CommandCategory, CommandCode, ResultCode};

pub const COMMAND_HEADER_LEN: usize = 5;
pub const RESPONSE_HEADER_LEN: usize = 6;
/// Header plus trailing checksum of a response frame
pub const RESPONSE_OVERHEAD: usize = RESPONSE_HEADER_LEN + 1;
pub const MIN_COMMAND_FRAME_LEN: usize = COMMAND_HEADER_LEN + 1;
pub const NOTIFICATION_LEN: usize = 5;
pub const MAX_PAYLOAD_LEN: usize = 300;
pub const MAX_COMMAND_FRAME_LEN: usize = MIN_COMMAND_FRAME_LEN + MAX_PAYLOAD_LEN;
pub const MAX_RESPONSE_FRAME_LEN: usize = RESPONSE_OVERHEAD + MAX_PAYLOAD_LEN;
/// The module queues at most this many events
pub const MAX_PENDING_EVENTS: u8 = 10;

/// Whether an inbound buffer holds exactly one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Single,
    Combined,
}

/// Build a command frame. `payload` must already satisfy the catalog rules
/// for `code` and fit in [`MAX_PAYLOAD_LEN`].
pub fn encode_command(category: CommandCategory, code: CommandCode, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MIN_COMMAND_FRAME_LEN + payload.len());
    frame.put_u8(category as u8);
    frame.put_u16(code.as_u16());
    frame.put_u16(payload.len() as u16);
    frame.put_slice(payload);
    let xor = checksum::compute(&frame);
    frame.put_u8(xor);
    frame
}

pub(crate) fn declared_len(hi: u8, lo: u8) -> usize {
    u16::from_be_bytes([hi, lo]) as usize
}

/// Decide whether `buffer` is one frame or a notification/response pair
pub fn classify(buffer: &[u8]) -> Result<FrameKind, FrameError> {
    let Some(&first) = buffer.first() else {
        return Err(FrameError::InvalidLength(0));
    };

    if first == ResultCode::NotifyEvents as u8 {
        return Ok(if buffer.len() > NOTIFICATION_LEN {
            FrameKind::Combined
        } else {
            FrameKind::Single
        });
    }

    if buffer.len() < RESPONSE_HEADER_LEN {
        return Err(FrameError::InvalidLength(buffer.len()));
    }
    let expected = RESPONSE_OVERHEAD + declared_len(buffer[4], buffer[5]);
    Ok(if expected == buffer.len() {
        FrameKind::Single
    } else {
        FrameKind::Combined
    })
}

/// Split a combined buffer into its first frame and an optional second one.
///
/// Leading notification: the first 5 bytes are the notification and the
/// rest is a response only if more than 5 bytes remain. Otherwise the
/// trailing 5 bytes are the notification and everything before them is the
/// response; the notification is only taken when at least 5 bytes precede it.
pub fn split_combined(buffer: &[u8]) -> Result<(&[u8], Option<&[u8]>), FrameError> {
    if buffer.len() < NOTIFICATION_LEN {
        return Err(FrameError::InvalidLength(buffer.len()));
    }

    let rest = buffer.len() - NOTIFICATION_LEN;
    if buffer[0] == ResultCode::NotifyEvents as u8 {
        let (notification, response) = buffer.split_at(NOTIFICATION_LEN);
        let response = (rest > NOTIFICATION_LEN).then_some(response);
        Ok((notification, response))
    } else {
        let (response, notification) = buffer.split_at(rest);
        let notification = (rest >= NOTIFICATION_LEN).then_some(notification);
        Ok((response, notification))
    }
}

/// Break an inbound buffer into the frames it carries, in wire order
pub fn frames(buffer: &[u8]) -> Result<Vec<&[u8]>, FrameError> {
    match classify(buffer)? {
        FrameKind::Single => Ok(vec![buffer]),
        FrameKind::Combined => {
            let (first, second) = split_combined(buffer)?;
            Ok(std::iter::once(first).chain(second).collect())
        }
    }
}

/// True when the frame leads with the notification result code
pub fn is_notification(frame: &[u8]) -> bool {
    frame.first() == Some(&(ResultCode::NotifyEvents as u8))
}

/// Validate a response frame header and checksum.
///
/// Checks run in priority order: result code, category, command code,
/// checksum, then the declared payload length against the frame size.
pub fn validate_response(buffer: &[u8]) -> Result<(), FrameError> {
    if buffer.len() < RESPONSE_OVERHEAD {
        return Err(FrameError::InvalidLength(buffer.len()));
    }
    if ResultCode::from_u8(buffer[0]).is_none() {
        return Err(FrameError::InvalidResult(buffer[0]));
    }
    if CommandCategory::from_u8(buffer[1]).is_none() {
        return Err(FrameError::InvalidCategory(buffer[1]));
    }
    let code = u16::from_be_bytes([buffer[2], buffer[3]]);
    if CommandCode::from_u16(code).is_none() {
        return Err(FrameError::InvalidCommand(code));
    }
    checksum::verify(buffer)?;
    if RESPONSE_OVERHEAD + declared_len(buffer[4], buffer[5]) != buffer.len() {
        return Err(FrameError::InvalidLength(buffer.len()));
    }
    Ok(())
}

/// Validate a notification frame
pub fn validate_notification(buffer: &[u8]) -> Result<(), FrameError> {
    if buffer.len() != NOTIFICATION_LEN {
        return Err(FrameError::InvalidLength(buffer.len()));
    }
    checksum::verify(buffer)?;
    if declared_len(buffer[1], buffer[2]) != 1 {
        return Err(FrameError::InvalidPayload("notification length must be 1"));
    }
    if buffer[3] > MAX_PENDING_EVENTS {
        return Err(FrameError::InvalidPayload("pending event count above 10"));
    }
    Ok(())
}

/// Pending event count announced by a notification
pub fn pending_count(buffer: &[u8]) -> Result<u8, FrameError> {
    validate_notification(buffer)?;
    Ok(buffer[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(result: u8, category: u8, code: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![result, category];
        frame.extend_from_slice(&code.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        frame.push(checksum::compute(&frame));
        frame
    }

    fn notification(pending: u8) -> Vec<u8> {
        let mut frame = vec![0x20, 0x00, 0x01, pending];
        frame.push(checksum::compute(&frame));
        frame
    }

    // ===================
    // encode_command tests
    // ===================

    #[test]
    fn test_encode_command_no_payload() {
        let frame = encode_command(CommandCategory::General, CommandCode::GetVersion, &[]);
        assert_eq!(frame, vec![0x01, 0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_command_with_payload() {
        let frame = encode_command(CommandCategory::LoRaWan, CommandCode::SetLoRaWanClass, &[0x02]);
        assert_eq!(frame[..6], [0x02, 0x00, 0x16, 0x00, 0x01, 0x02]);
        assert_eq!(frame[6], 0x02 ^ 0x16 ^ 0x01 ^ 0x02);
    }

    #[test]
    fn test_encode_command_two_byte_code() {
        let frame = encode_command(CommandCategory::General, CommandCode::SwitchNetwork, &[]);
        assert_eq!(frame[1], 0x01);
        assert_eq!(frame[2], 0x00);
        assert_eq!(frame[5], 0x01 ^ 0x01);
    }

    // ===================
    // classify / split tests
    // ===================

    #[test]
    fn test_classify_single_response() {
        let frame = response(0x00, 0x02, 0x0012, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frame.len(), 15);
        assert_eq!(classify(&frame), Ok(FrameKind::Single));
    }

    #[test]
    fn test_classify_single_notification() {
        assert_eq!(classify(&notification(3)), Ok(FrameKind::Single));
    }

    #[test]
    fn test_classify_combined() {
        let mut buf = notification(1);
        buf.extend(response(0x00, 0x01, 0x0002, &[]));
        assert_eq!(classify(&buf), Ok(FrameKind::Combined));

        let mut buf = response(0x00, 0x01, 0x0002, &[]);
        buf.extend(notification(1));
        assert_eq!(classify(&buf), Ok(FrameKind::Combined));
    }

    #[test]
    fn test_classify_bounds() {
        assert_eq!(classify(&[]), Err(FrameError::InvalidLength(0)));
        assert_eq!(classify(&[0x00, 0x01, 0x00]), Err(FrameError::InvalidLength(3)));
    }

    #[test]
    fn test_split_notification_first() {
        let note = notification(2);
        let resp = response(0x00, 0x01, 0x0002, &[]);
        let mut buf = note.clone();
        buf.extend(&resp);

        let (first, second) = split_combined(&buf).unwrap();
        assert_eq!(first, &note[..]);
        assert_eq!(second, Some(&resp[..]));
    }

    #[test]
    fn test_split_notification_first_short_remainder_dropped() {
        let mut buf = notification(2);
        buf.extend([0x00, 0x01, 0x00]);
        let (first, second) = split_combined(&buf).unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(second, None);
    }

    #[test]
    fn test_split_response_first() {
        let resp = response(0x00, 0x02, 0x0025, &[]);
        let note = notification(1);
        let mut buf = resp.clone();
        buf.extend(&note);

        let (first, second) = split_combined(&buf).unwrap();
        assert_eq!(first, &resp[..]);
        assert_eq!(second, Some(&note[..]));
    }

    #[test]
    fn test_frames_in_wire_order() {
        let resp = response(0x00, 0x01, 0x0000, &[0x02, 0x00]);
        let note = notification(4);
        let mut buf = resp.clone();
        buf.extend(&note);

        let parts = frames(&buf).unwrap();
        assert_eq!(parts, vec![&resp[..], &note[..]]);
        assert!(!is_notification(parts[0]));
        assert!(is_notification(parts[1]));
    }

    // ===================
    // validation tests
    // ===================

    #[test]
    fn test_validate_response_ok() {
        let frame = response(0x00, 0x03, 0x00FA, &[]);
        assert_eq!(validate_response(&frame), Ok(()));
    }

    #[test]
    fn test_validate_response_priority() {
        // bad result, bad category, bad code and bad checksum at once: result wins
        let frame = [0x05, 0x09, 0x12, 0x34, 0x00, 0x00, 0xEE];
        assert_eq!(validate_response(&frame), Err(FrameError::InvalidResult(0x05)));

        let frame = [0x00, 0x09, 0x12, 0x34, 0x00, 0x00, 0xEE];
        assert_eq!(validate_response(&frame), Err(FrameError::InvalidCategory(0x09)));

        let frame = [0x00, 0x01, 0x12, 0x34, 0x00, 0x00, 0xEE];
        assert_eq!(validate_response(&frame), Err(FrameError::InvalidCommand(0x1234)));

        let frame = [0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0xEE];
        assert_eq!(
            validate_response(&frame),
            Err(FrameError::InvalidChecksum { expected: 0x00, actual: 0xEE })
        );
    }

    #[test]
    fn test_validate_response_declared_length_mismatch() {
        let mut frame = vec![0x00, 0x01, 0x00, 0x01, 0x00, 0x04, 0xAA];
        let xor = checksum::compute(&frame[..6]);
        frame[6] = xor;
        assert_eq!(validate_response(&frame), Err(FrameError::InvalidLength(7)));
    }

    #[test]
    fn test_validate_response_echo_of_every_command() {
        for code in CommandCode::ALL {
            let categories =
                [CommandCategory::General, CommandCategory::LoRaWan, CommandCategory::Sidewalk];
            for category in categories {
                let cmd = encode_command(category, code, &[]);
                let mut echo = vec![ResultCode::Ok as u8];
                echo.extend_from_slice(&cmd[..cmd.len() - 1]);
                echo.push(checksum::compute(&echo));
                assert_eq!(validate_response(&echo), Ok(()), "{:?}", code);
            }
        }
    }

    #[test]
    fn test_validate_notification() {
        assert_eq!(validate_notification(&notification(10)), Ok(()));
        assert_eq!(pending_count(&notification(7)), Ok(7));
        assert_eq!(
            validate_notification(&notification(11)),
            Err(FrameError::InvalidPayload("pending event count above 10"))
        );

        let mut bad_len = vec![0x20, 0x00, 0x02, 0x01];
        bad_len.push(checksum::compute(&bad_len));
        assert_eq!(
            validate_notification(&bad_len),
            Err(FrameError::InvalidPayload("notification length must be 1"))
        );

        let mut bad_sum = notification(1);
        bad_sum[4] ^= 0xFF;
        assert!(matches!(
            validate_notification(&bad_sum),
            Err(FrameError::InvalidChecksum { .. })
        ));
    }
}
