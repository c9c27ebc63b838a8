//! Response and GetEvent payload decoding

use crate::error::FrameError;
use crate::frame::{self, RESPONSE_HEADER_LEN};
use crate::segment::SegmentedFileStatus;
use crate::types::{
    CommandCategory, CommandCode, EUI_SIZE, Eui, EventCode, FirmwareVersion, LoRaWanClass,
    ResultCode, TxStatus, WideVersion,
};

pub const VERSION_PAYLOAD_LEN: usize = 17;

/// Versions reported by GetVersion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub bootloader: WideVersion,
    pub modem_firmware: WideVersion,
    pub modem_hardware: FirmwareVersion,
    pub sidewalk: FirmwareVersion,
    pub lorawan: FirmwareVersion,
}

impl VersionInfo {
    fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let Ok(d) = <&[u8; VERSION_PAYLOAD_LEN]>::try_from(data) else {
            return Err(FrameError::InvalidPayload("version block must be 17 bytes"));
        };
        let wide = |at: usize| WideVersion {
            major: d[at],
            minor: d[at + 1],
            patch: u16::from_be_bytes([d[at + 2], d[at + 3]]),
        };
        let short = |at: usize| FirmwareVersion::new(d[at], d[at + 1], d[at + 2]);

        Ok(Self {
            bootloader: wide(0),
            modem_firmware: wide(4),
            modem_hardware: short(8),
            sidewalk: short(11),
            lorawan: short(14),
        })
    }
}

/// Identifies a downlink within its network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkTag {
    /// LoRaWAN application port
    Port(u8),
    /// Sidewalk message sequence number
    Sequence(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    pub rssi: i8,
    pub snr: i8,
    pub tag: DownlinkTag,
    pub data: Vec<u8>,
}

/// Event-specific data following the event code and pending count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    None,
    ResetCount(u16),
    TxDone(TxStatus),
    Downlink(Downlink),
    ClassSwitched(LoRaWanClass),
    SegmentedFile(SegmentedFileStatus),
    /// Bytes of an event kind with no fixed layout, passed through untouched
    Raw(Vec<u8>),
}

/// One event drained by GetEvent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: EventCode,
    /// Events still queued on the module after this one
    pub pending: u8,
    pub data: EventData,
}

/// Decoded, command-specific response content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    /// Result was not Ok; nothing beyond the header is decoded
    None,
    Ack,
    DevEui(Eui),
    JoinEui(Eui),
    Version(VersionInfo),
    Class(LoRaWanClass),
    Event(Event),
    FileStatus(SegmentedFileStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub result: ResultCode,
    pub category: CommandCategory,
    pub code: CommandCode,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }
}

/// Validate and decode a single response frame
pub fn decode(frame: &[u8]) -> Result<Response, FrameError> {
    frame::validate_response(frame)?;

    let result = ResultCode::from_u8(frame[0]).ok_or(FrameError::InvalidResult(frame[0]))?;
    let category = CommandCategory::from_u8(frame[1]).ok_or(FrameError::InvalidCategory(frame[1]))?;
    let raw_code = u16::from_be_bytes([frame[2], frame[3]]);
    let code = CommandCode::from_u16(raw_code).ok_or(FrameError::InvalidCommand(raw_code))?;

    let payload = if result == ResultCode::Ok {
        decode_payload(category, code, &frame[RESPONSE_HEADER_LEN..frame.len() - 1])?
    } else {
        ResponsePayload::None
    };

    Ok(Response { result, category, code, payload })
}

/// Command code of a frame that passes header and checksum validation
pub fn response_code(frame: &[u8]) -> Option<CommandCode> {
    frame::validate_response(frame).ok()?;
    CommandCode::from_u16(u16::from_be_bytes([frame[2], frame[3]]))
}

fn decode_payload(
    category: CommandCategory,
    code: CommandCode,
    data: &[u8],
) -> Result<ResponsePayload, FrameError> {
    match code {
        CommandCode::GetEvent => decode_event(category, data).map(ResponsePayload::Event),
        CommandCode::GetVersion => VersionInfo::decode(data).map(ResponsePayload::Version),
        CommandCode::GetDevEui => decode_eui(data).map(ResponsePayload::DevEui),
        CommandCode::GetJoinEui => decode_eui(data).map(ResponsePayload::JoinEui),
        CommandCode::GetLoRaWanClass => decode_class(data).map(ResponsePayload::Class),
        CommandCode::FileStatus => {
            SegmentedFileStatus::decode(data).map(ResponsePayload::FileStatus)
        }
        // uplink acknowledgements may carry module-specific bytes
        CommandCode::RequestUplink => Ok(ResponsePayload::Ack),
        _ if data.is_empty() => Ok(ResponsePayload::Ack),
        _ => Err(FrameError::InvalidPayload("acknowledgement must be empty")),
    }
}

fn decode_eui(data: &[u8]) -> Result<Eui, FrameError> {
    if data.len() != EUI_SIZE {
        return Err(FrameError::InvalidPayload("EUI must be 8 bytes"));
    }
    Eui::from_slice(data).ok_or(FrameError::InvalidPayload("EUI must be 8 bytes"))
}

fn decode_class(data: &[u8]) -> Result<LoRaWanClass, FrameError> {
    match data {
        [class] => LoRaWanClass::from_u8(*class)
            .ok_or(FrameError::InvalidPayload("unknown LoRaWAN class")),
        _ => Err(FrameError::InvalidPayload("class payload must be 1 byte")),
    }
}

/// Decode a GetEvent payload: event code, pending count, event data.
///
/// An empty payload means the module had nothing queued.
pub fn decode_event(category: CommandCategory, data: &[u8]) -> Result<Event, FrameError> {
    let (code, pending, rest) = match data {
        [] => {
            return Ok(Event { code: EventCode::None, pending: 0, data: EventData::None });
        }
        [code, pending, rest @ ..] => (*code, *pending, rest),
        [_] => return Err(FrameError::InvalidPayload("event header needs 2 bytes")),
    };
    let code = EventCode::from_u8(code).ok_or(FrameError::InvalidPayload("unknown event code"))?;

    let data = match code {
        EventCode::Reset => match rest {
            [hi, lo] => EventData::ResetCount(u16::from_be_bytes([*hi, *lo])),
            _ => return Err(FrameError::InvalidPayload("reset event needs 2 bytes")),
        },
        EventCode::TxDone => match rest {
            [status] => EventData::TxDone(
                TxStatus::from_u8(*status).ok_or(FrameError::InvalidPayload("unknown tx status"))?,
            ),
            _ => return Err(FrameError::InvalidPayload("tx done event needs 1 byte")),
        },
        EventCode::DownData => EventData::Downlink(decode_downlink(category, rest)?),
        EventCode::ClassSwitched => match rest {
            [class] => EventData::ClassSwitched(
                LoRaWanClass::from_u8(*class)
                    .ok_or(FrameError::InvalidPayload("unknown LoRaWAN class"))?,
            ),
            _ => return Err(FrameError::InvalidPayload("class switch event needs 1 byte")),
        },
        EventCode::SegmentedFileDownload => {
            EventData::SegmentedFile(SegmentedFileStatus::decode(rest)?)
        }
        _ if rest.is_empty() => EventData::None,
        _ => EventData::Raw(rest.to_vec()),
    };

    Ok(Event { code, pending, data })
}

fn decode_downlink(category: CommandCategory, data: &[u8]) -> Result<Downlink, FrameError> {
    if data.len() < 3 {
        return Err(FrameError::InvalidPayload("downlink needs at least 3 bytes"));
    }
    match (category, data) {
        (CommandCategory::Sidewalk, [seq_hi, seq_lo, rssi, snr, rest @ ..]) => Ok(Downlink {
            rssi: *rssi as i8,
            snr: *snr as i8,
            tag: DownlinkTag::Sequence(u16::from_be_bytes([*seq_hi, *seq_lo])),
            data: rest.to_vec(),
        }),
        (CommandCategory::Sidewalk, _) => {
            Err(FrameError::InvalidPayload("sidewalk downlink needs 4 bytes"))
        }
        (_, [rssi, snr, port, rest @ ..]) => Ok(Downlink {
            rssi: *rssi as i8,
            snr: *snr as i8,
            tag: DownlinkTag::Port(*port),
            data: rest.to_vec(),
        }),
        _ => Err(FrameError::InvalidPayload("downlink needs at least 3 bytes")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::segment::BinaryType;

    fn response(result: u8, category: u8, code: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![result, category];
        frame.extend_from_slice(&code.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        frame.push(checksum::compute(&frame));
        frame
    }

    // ===================
    // header / dispatch tests
    // ===================

    #[test]
    fn test_non_ok_result_skips_payload() {
        // payload would be invalid for GetVersion, but a failed result is never decoded
        let frame = response(0x06, 0x01, 0x0001, &[1, 2, 3]);
        let resp = decode(&frame).unwrap();
        assert_eq!(resp.result, ResultCode::Fail);
        assert_eq!(resp.category, CommandCategory::General);
        assert_eq!(resp.code, CommandCode::GetVersion);
        assert_eq!(resp.payload, ResponsePayload::None);
        assert!(!resp.is_ok());
    }

    #[test]
    fn test_zero_length_ack() {
        let resp = decode(&response(0x00, 0x02, 0x0025, &[])).unwrap();
        assert_eq!(resp.payload, ResponsePayload::Ack);

        let err = decode(&response(0x00, 0x02, 0x0025, &[0x00])).unwrap_err();
        assert_eq!(err, FrameError::InvalidPayload("acknowledgement must be empty"));
    }

    #[test]
    fn test_uplink_ack_tolerates_payload() {
        let resp = decode(&response(0x00, 0x03, 0x0029, &[0x01])).unwrap();
        assert_eq!(resp.payload, ResponsePayload::Ack);
    }

    #[test]
    fn test_eui_echo() {
        let eui = [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x05, 0x12, 0x34];
        let resp = decode(&response(0x00, 0x02, 0x0012, &eui)).unwrap();
        assert_eq!(resp.payload, ResponsePayload::DevEui(Eui(eui)));

        let resp = decode(&response(0x00, 0x02, 0x0010, &eui)).unwrap();
        assert_eq!(resp.payload, ResponsePayload::JoinEui(Eui(eui)));

        assert!(decode(&response(0x00, 0x02, 0x0012, &eui[..7])).is_err());
    }

    #[test]
    fn test_version_block() {
        let payload = [1, 2, 0x01, 0x02, 3, 4, 0x00, 0x05, 9, 8, 7, 1, 0, 0, 1, 0, 4];
        let resp = decode(&response(0x00, 0x01, 0x0001, &payload)).unwrap();
        let ResponsePayload::Version(info) = resp.payload else {
            panic!("expected version payload");
        };
        assert_eq!(info.bootloader, WideVersion { major: 1, minor: 2, patch: 0x0102 });
        assert_eq!(info.modem_firmware, WideVersion { major: 3, minor: 4, patch: 5 });
        assert_eq!(info.modem_hardware, FirmwareVersion::new(9, 8, 7));
        assert_eq!(info.sidewalk, FirmwareVersion::new(1, 0, 0));
        assert_eq!(info.lorawan, FirmwareVersion::new(1, 0, 4));

        assert_eq!(
            decode(&response(0x00, 0x01, 0x0001, &payload[..16])),
            Err(FrameError::InvalidPayload("version block must be 17 bytes"))
        );
    }

    #[test]
    fn test_class_response() {
        let resp = decode(&response(0x00, 0x02, 0x0015, &[0x02])).unwrap();
        assert_eq!(resp.payload, ResponsePayload::Class(LoRaWanClass::C));
        assert!(decode(&response(0x00, 0x02, 0x0015, &[0x03])).is_err());
        assert!(decode(&response(0x00, 0x02, 0x0015, &[])).is_err());
    }

    #[test]
    fn test_file_status_response() {
        let block = [0x01, 2, 0, 0, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00];
        let resp = decode(&response(0x00, 0x01, 0x00D4, &block)).unwrap();
        let ResponsePayload::FileStatus(status) = resp.payload else {
            panic!("expected file status");
        };
        assert_eq!(status.binary_type, BinaryType::Host);
        assert!(status.is_complete());

        assert_eq!(
            decode(&response(0x00, 0x01, 0x00D4, &block[..9])),
            Err(FrameError::InvalidSerialData { expected: 10, actual: 9 })
        );
    }

    #[test]
    fn test_decode_rejects_invalid_frame() {
        let mut frame = response(0x00, 0x01, 0x0002, &[]);
        frame[6] ^= 0x55;
        assert!(matches!(decode(&frame), Err(FrameError::InvalidChecksum { .. })));
    }

    #[test]
    fn test_response_code_survives_bad_payload() {
        let frame = response(0x00, 0x01, 0x0001, &[0; 16]);
        assert!(matches!(decode(&frame), Err(FrameError::InvalidPayload(_))));
        assert_eq!(response_code(&frame), Some(CommandCode::GetVersion));

        let mut corrupt = frame.clone();
        corrupt[22] ^= 0x01;
        assert_eq!(response_code(&corrupt), None);
    }

    // ===================
    // GetEvent sub-decoder tests
    // ===================

    #[test]
    fn test_event_reset_counter() {
        let event = decode_event(CommandCategory::General, &[0x00, 0x02, 0x00, 0x05]).unwrap();
        assert_eq!(event.code, EventCode::Reset);
        assert_eq!(event.pending, 2);
        assert_eq!(event.data, EventData::ResetCount(5));

        assert_eq!(
            decode_event(CommandCategory::General, &[0x00, 0x00, 0x05]),
            Err(FrameError::InvalidPayload("reset event needs 2 bytes"))
        );
    }

    #[test]
    fn test_event_tx_done() {
        let event = decode_event(CommandCategory::LoRaWan, &[0x03, 0x00, 0x02]).unwrap();
        assert_eq!(event.data, EventData::TxDone(TxStatus::DoneWithAck));
        assert_eq!(
            decode_event(CommandCategory::LoRaWan, &[0x03, 0x00, 0x03]),
            Err(FrameError::InvalidPayload("unknown tx status"))
        );
        assert!(decode_event(CommandCategory::LoRaWan, &[0x03, 0x00]).is_err());
    }

    #[test]
    fn test_event_lorawan_downlink() {
        let data = [0x04, 0x00, 0xFE, 0x0A, 0x07, 0x01, 0x02, 0x03];
        let event = decode_event(CommandCategory::LoRaWan, &data).unwrap();
        assert_eq!(
            event.data,
            EventData::Downlink(Downlink {
                rssi: -2,
                snr: 10,
                tag: DownlinkTag::Port(7),
                data: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_event_sidewalk_downlink() {
        let data = [0x04, 0x01, 0x01, 0x00, 0xB0, 0x05, 0xAA];
        let event = decode_event(CommandCategory::Sidewalk, &data).unwrap();
        assert_eq!(event.pending, 1);
        assert_eq!(
            event.data,
            EventData::Downlink(Downlink {
                rssi: -80,
                snr: 5,
                tag: DownlinkTag::Sequence(256),
                data: vec![0xAA],
            })
        );
        assert!(decode_event(CommandCategory::Sidewalk, &[0x04, 0x00, 0x00, 0x01, 0xB0]).is_err());
    }

    #[test]
    fn test_event_downlink_too_short() {
        assert_eq!(
            decode_event(CommandCategory::LoRaWan, &[0x04, 0x00, 0xFE, 0x0A]),
            Err(FrameError::InvalidPayload("downlink needs at least 3 bytes"))
        );
    }

    #[test]
    fn test_event_class_switched() {
        let event = decode_event(CommandCategory::LoRaWan, &[0xF0, 0x00, 0x01]).unwrap();
        assert_eq!(event.data, EventData::ClassSwitched(LoRaWanClass::B));
        assert!(decode_event(CommandCategory::LoRaWan, &[0xF0, 0x00, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_event_segmented_file() {
        let data = [0xD0, 0x00, 0x00, 1, 2, 3, 0x00, 0x10, 0x00, 0x11, 0x05, 0x00];
        let event = decode_event(CommandCategory::General, &data).unwrap();
        let EventData::SegmentedFile(status) = event.data else {
            panic!("expected segmented file status");
        };
        assert_eq!(status.segment_bitmap, 0x0005);

        assert_eq!(
            decode_event(CommandCategory::General, &data[..11]),
            Err(FrameError::InvalidSerialData { expected: 10, actual: 9 })
        );
    }

    #[test]
    fn test_event_without_layout() {
        let event = decode_event(CommandCategory::LoRaWan, &[0x02, 0x03]).unwrap();
        assert_eq!(event.code, EventCode::Joined);
        assert_eq!(event.pending, 3);
        assert_eq!(event.data, EventData::None);

        let event = decode_event(CommandCategory::LoRaWan, &[0x10, 0x00, 0x07, 0x02]).unwrap();
        assert_eq!(event.data, EventData::Raw(vec![0x07, 0x02]));
    }

    #[test]
    fn test_event_header_bounds() {
        let event = decode_event(CommandCategory::General, &[]).unwrap();
        assert_eq!(event.code, EventCode::None);
        assert_eq!(
            decode_event(CommandCategory::General, &[0x02]),
            Err(FrameError::InvalidPayload("event header needs 2 bytes"))
        );
        assert_eq!(
            decode_event(CommandCategory::General, &[0x09, 0x00]),
            Err(FrameError::InvalidPayload("unknown event code"))
        );
    }

    #[test]
    fn test_get_event_through_frame() {
        let frame = response(0x00, 0x02, 0x0000, &[0x03, 0x01, 0x01]);
        let resp = decode(&frame).unwrap();
        let ResponsePayload::Event(event) = resp.payload else {
            panic!("expected event");
        };
        assert_eq!(event.code, EventCode::TxDone);
        assert_eq!(event.pending, 1);
        assert_eq!(event.data, EventData::TxDone(TxStatus::DoneNoAck));
    }
}
