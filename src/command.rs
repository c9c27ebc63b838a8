//! Command catalog and typed command builders

use crate::error::CommandError;
use crate::frame::{self, MAX_PAYLOAD_LEN};
use crate::types::{
    CommandCategory, CommandCode, CssProfile, DownlinkFilter, Eui, FirmwareVersion, LoRaWanClass,
    NETWORK_KEY_SIZE, SidewalkLink, UplinkType, EUI_SIZE,
};

pub const LORAWAN_MAX_UPLINK_LEN: usize = 350;
pub const SIDEWALK_MAX_UPLINK_LEN: usize = 255;
/// LoRaWAN application ports run 1..=224
pub const LORAWAN_MAX_PORT: u8 = 224;
const STOP_NETWORK_ARG: u8 = 0x01;

/// Payload shape a command code requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRule {
    Empty,
    Fixed(usize),
    Uplink,
}

/// One row of the command catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: CommandCode,
    pub categories: &'static [CommandCategory],
    pub payload: PayloadRule,
}

const GENERAL: &[CommandCategory] = &[CommandCategory::General];
const LORAWAN: &[CommandCategory] = &[CommandCategory::LoRaWan];
const SIDEWALK: &[CommandCategory] = &[CommandCategory::Sidewalk];
const NETWORK: &[CommandCategory] = &[CommandCategory::LoRaWan, CommandCategory::Sidewalk];

/// Catalog row for a command code
pub fn entry(code: CommandCode) -> CatalogEntry {
    use CommandCode::*;
    use PayloadRule::*;

    let (categories, payload) = match code {
        GetEvent | GetVersion | Reset | FactoryReset | SwitchNetwork | FileStatus => {
            (GENERAL, Empty)
        }
        StartFileTransfer | TriggerFwUpdate => (GENERAL, Fixed(3)),
        InitLoRaWan | GetJoinEui | GetDevEui | GetLoRaWanClass | JoinLoRaWan | LeaveLoRaWan => {
            (LORAWAN, Empty)
        }
        SetJoinEui | SetDevEui => (LORAWAN, Fixed(EUI_SIZE)),
        SetNwKey => (LORAWAN, Fixed(NETWORK_KEY_SIZE)),
        SetLoRaWanClass => (LORAWAN, Fixed(1)),
        FskLinkRequest | CssLinkRequest | BleLinkRequest | BleConnRequest => (SIDEWALK, Empty),
        SetDownlinkFilter | SetCssProfile => (SIDEWALK, Fixed(1)),
        RequestUplink => (NETWORK, Uplink),
        StopNetwork => (NETWORK, Fixed(1)),
    };

    CatalogEntry { code, categories, payload }
}

/// Every catalog row, in command-code table order
pub fn catalog() -> impl Iterator<Item = CatalogEntry> {
    CommandCode::ALL.into_iter().map(entry)
}

fn invalid(msg: impl Into<String>) -> CommandError {
    CommandError::InvalidParameters(msg.into())
}

/// Check a raw payload against the catalog rules for `code` sent under `category`
pub fn check_payload(
    category: CommandCategory,
    code: CommandCode,
    payload: &[u8],
) -> Result<(), CommandError> {
    let entry = entry(code);
    if !entry.categories.contains(&category) {
        return Err(invalid(format!("{:?} is not a {:?} command", code, category)));
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(invalid(format!(
            "payload of {} bytes exceeds frame limit of {}",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    match entry.payload {
        PayloadRule::Empty if !payload.is_empty() => {
            return Err(invalid(format!("{:?} takes no payload", code)));
        }
        PayloadRule::Fixed(len) if payload.len() != len => {
            return Err(invalid(format!(
                "{:?} requires {} payload bytes, got {}",
                code,
                len,
                payload.len()
            )));
        }
        PayloadRule::Uplink => return check_uplink(category, payload),
        _ => {}
    }

    match code {
        CommandCode::SetLoRaWanClass if LoRaWanClass::from_u8(payload[0]).is_none() => {
            Err(invalid(format!("LoRaWAN class must be 0..=2, got {}", payload[0])))
        }
        CommandCode::SetCssProfile | CommandCode::SetDownlinkFilter if payload[0] > 1 => {
            Err(invalid(format!("{:?} value must be 0 or 1, got {}", code, payload[0])))
        }
        CommandCode::StopNetwork if payload[0] != STOP_NETWORK_ARG => {
            Err(invalid("StopNetwork argument must be 0x01"))
        }
        _ => Ok(()),
    }
}

fn check_uplink_type(raw: u8) -> Result<(), CommandError> {
    if raw > UplinkType::Confirmed as u8 {
        return Err(invalid(format!("uplink type must be 0 or 1, got {}", raw)));
    }
    Ok(())
}

fn check_uplink(category: CommandCategory, payload: &[u8]) -> Result<(), CommandError> {
    match category {
        CommandCategory::LoRaWan => {
            let [port, uplink_type, data @ ..] = payload else {
                return Err(invalid("LoRaWAN uplink needs port and type"));
            };
            if *port == 0 || *port > LORAWAN_MAX_PORT {
                return Err(invalid(format!("LoRaWAN port must be 1..=224, got {}", port)));
            }
            check_uplink_type(*uplink_type)?;
            if data.len() > LORAWAN_MAX_UPLINK_LEN {
                return Err(invalid(format!("LoRaWAN uplink of {} bytes too long", data.len())));
            }
            Ok(())
        }
        _ => {
            let [uplink_type, data @ ..] = payload else {
                return Err(invalid("Sidewalk uplink needs a type"));
            };
            check_uplink_type(*uplink_type)?;
            if data.is_empty() || data.len() > SIDEWALK_MAX_UPLINK_LEN {
                return Err(invalid(format!(
                    "Sidewalk uplink must carry 1..=255 bytes, got {}",
                    data.len()
                )));
            }
            Ok(())
        }
    }
}

/// Validate and frame a raw command, for callers that build payloads by hand
pub fn encode_raw(
    category: CommandCategory,
    code: CommandCode,
    payload: &[u8],
) -> Result<Vec<u8>, CommandError> {
    check_payload(category, code, payload)?;
    Ok(frame::encode_command(category, code, payload))
}

/// A command the host can send to the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetEvent,
    GetVersion,
    Reset,
    FactoryReset,
    SwitchNetwork,
    InitLoRaWan,
    GetJoinEui,
    SetJoinEui(Eui),
    GetDevEui,
    SetDevEui(Eui),
    SetNwKey([u8; NETWORK_KEY_SIZE]),
    GetLoRaWanClass,
    SetLoRaWanClass(LoRaWanClass),
    JoinLoRaWan,
    LeaveLoRaWan,
    LoRaWanUplink {
        port: u8,
        uplink_type: UplinkType,
        data: Vec<u8>,
    },
    StopLoRaWan,
    SidewalkUplink {
        link: SidewalkLink,
        uplink_type: UplinkType,
        data: Vec<u8>,
    },
    StopSidewalk,
    FskLinkRequest,
    CssLinkRequest,
    BleLinkRequest,
    BleConnRequest,
    SetDownlinkFilter(DownlinkFilter),
    SetCssProfile(CssProfile),
    StartFileTransfer(FirmwareVersion),
    FileStatus,
    TriggerFwUpdate(FirmwareVersion),
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Self::GetEvent => CommandCode::GetEvent,
            Self::GetVersion => CommandCode::GetVersion,
            Self::Reset => CommandCode::Reset,
            Self::FactoryReset => CommandCode::FactoryReset,
            Self::SwitchNetwork => CommandCode::SwitchNetwork,
            Self::InitLoRaWan => CommandCode::InitLoRaWan,
            Self::GetJoinEui => CommandCode::GetJoinEui,
            Self::SetJoinEui(_) => CommandCode::SetJoinEui,
            Self::GetDevEui => CommandCode::GetDevEui,
            Self::SetDevEui(_) => CommandCode::SetDevEui,
            Self::SetNwKey(_) => CommandCode::SetNwKey,
            Self::GetLoRaWanClass => CommandCode::GetLoRaWanClass,
            Self::SetLoRaWanClass(_) => CommandCode::SetLoRaWanClass,
            Self::JoinLoRaWan => CommandCode::JoinLoRaWan,
            Self::LeaveLoRaWan => CommandCode::LeaveLoRaWan,
            Self::LoRaWanUplink { .. } | Self::SidewalkUplink { .. } => CommandCode::RequestUplink,
            Self::StopLoRaWan | Self::StopSidewalk => CommandCode::StopNetwork,
            Self::FskLinkRequest => CommandCode::FskLinkRequest,
            Self::CssLinkRequest => CommandCode::CssLinkRequest,
            Self::BleLinkRequest => CommandCode::BleLinkRequest,
            Self::BleConnRequest => CommandCode::BleConnRequest,
            Self::SetDownlinkFilter(_) => CommandCode::SetDownlinkFilter,
            Self::SetCssProfile(_) => CommandCode::SetCssProfile,
            Self::StartFileTransfer(_) => CommandCode::StartFileTransfer,
            Self::FileStatus => CommandCode::FileStatus,
            Self::TriggerFwUpdate(_) => CommandCode::TriggerFwUpdate,
        }
    }

    pub fn category(&self) -> CommandCategory {
        match self {
            Self::LoRaWanUplink { .. } | Self::StopLoRaWan => CommandCategory::LoRaWan,
            Self::SidewalkUplink { .. } | Self::StopSidewalk => CommandCategory::Sidewalk,
            other => entry(other.code()).categories[0],
        }
    }

    /// Payload bytes as laid out on the wire
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::SetJoinEui(eui) | Self::SetDevEui(eui) => eui.as_bytes().to_vec(),
            Self::SetNwKey(key) => key.to_vec(),
            Self::SetLoRaWanClass(class) => vec![*class as u8],
            Self::LoRaWanUplink { port, uplink_type, data } => {
                let mut payload = Vec::with_capacity(2 + data.len());
                payload.push(*port);
                payload.push(*uplink_type as u8);
                payload.extend_from_slice(data);
                payload
            }
            Self::SidewalkUplink { uplink_type, data, .. } => {
                let mut payload = Vec::with_capacity(1 + data.len());
                payload.push(*uplink_type as u8);
                payload.extend_from_slice(data);
                payload
            }
            Self::StopLoRaWan | Self::StopSidewalk => vec![STOP_NETWORK_ARG],
            Self::SetDownlinkFilter(filter) => vec![*filter as u8],
            Self::SetCssProfile(profile) => vec![*profile as u8],
            Self::StartFileTransfer(version) | Self::TriggerFwUpdate(version) => {
                version.to_bytes().to_vec()
            }
            _ => Vec::new(),
        }
    }

    /// Validate parameters and build the complete frame
    pub fn encode(&self) -> Result<Vec<u8>, CommandError> {
        if let Self::SidewalkUplink { link, data, .. } = self {
            if data.len() > link.max_uplink_len() {
                return Err(invalid(format!(
                    "{:?} uplink limited to {} bytes, got {}",
                    link,
                    link.max_uplink_len(),
                    data.len()
                )));
            }
        }
        encode_raw(self.category(), self.code(), &self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;

    fn lorawan(port: u8, uplink_type: UplinkType, len: usize) -> Command {
        Command::LoRaWanUplink { port, uplink_type, data: vec![0xAB; len] }
    }

    fn sidewalk(link: SidewalkLink, uplink_type: UplinkType, len: usize) -> Command {
        Command::SidewalkUplink { link, uplink_type, data: vec![0x01; len] }
    }

    fn all_commands() -> Vec<Command> {
        let version = FirmwareVersion::new(1, 2, 3);
        vec![
            Command::GetEvent,
            Command::GetVersion,
            Command::Reset,
            Command::FactoryReset,
            Command::SwitchNetwork,
            Command::InitLoRaWan,
            Command::GetJoinEui,
            Command::SetJoinEui(Eui([1; 8])),
            Command::GetDevEui,
            Command::SetDevEui(Eui([2; 8])),
            Command::SetNwKey([3; 16]),
            Command::GetLoRaWanClass,
            Command::SetLoRaWanClass(LoRaWanClass::C),
            Command::JoinLoRaWan,
            Command::LeaveLoRaWan,
            lorawan(10, UplinkType::Confirmed, 12),
            Command::StopLoRaWan,
            sidewalk(SidewalkLink::Ble, UplinkType::Unconfirmed, 1),
            Command::StopSidewalk,
            Command::FskLinkRequest,
            Command::CssLinkRequest,
            Command::BleLinkRequest,
            Command::BleConnRequest,
            Command::SetDownlinkFilter(DownlinkFilter::Disable),
            Command::SetCssProfile(CssProfile::B),
            Command::StartFileTransfer(version),
            Command::FileStatus,
            Command::TriggerFwUpdate(version),
        ]
    }

    #[test]
    fn test_catalog_covers_every_code() {
        assert_eq!(catalog().count(), CommandCode::ALL.len());
        assert_eq!(entry(CommandCode::SetNwKey).payload, PayloadRule::Fixed(16));
        assert_eq!(entry(CommandCode::RequestUplink).categories.len(), 2);
    }

    #[test]
    fn test_checksum_round_trip_for_every_command() {
        for cmd in all_commands() {
            let frame = cmd.encode().unwrap();
            let last = frame.len() - 1;
            assert_eq!(checksum::compute(&frame[..last]), frame[last], "{:?}", cmd);
            assert_eq!(frame[0], cmd.category() as u8);
            assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), cmd.code().as_u16());
            assert_eq!(u16::from_be_bytes([frame[3], frame[4]]) as usize, frame.len() - 6);
        }
    }

    #[test]
    fn test_set_dev_eui_layout() {
        let eui = Eui([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x05, 0x00, 0x01]);
        let frame = Command::SetDevEui(eui).encode().unwrap();
        assert_eq!(frame[..5], [0x02, 0x00, 0x13, 0x00, 0x08]);
        assert_eq!(frame[5..13], eui.0);
    }

    #[test]
    fn test_lorawan_uplink_layout() {
        let cmd = Command::LoRaWanUplink {
            port: 2,
            uplink_type: UplinkType::Confirmed,
            data: vec![9, 8],
        };
        let frame = cmd.encode().unwrap();
        assert_eq!(frame[..9], [0x02, 0x00, 0x29, 0x00, 0x04, 0x02, 0x01, 0x09, 0x08]);
    }

    #[test]
    fn test_sidewalk_uplink_layout() {
        let cmd = Command::SidewalkUplink {
            link: SidewalkLink::Fsk,
            uplink_type: UplinkType::Unconfirmed,
            data: vec![7],
        };
        let frame = cmd.encode().unwrap();
        assert_eq!(frame[..7], [0x03, 0x00, 0x29, 0x00, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn test_stop_network_carries_one() {
        let frame = Command::StopSidewalk.encode().unwrap();
        assert_eq!(frame[..6], [0x03, 0x00, 0xFE, 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_lorawan_port_out_of_range() {
        for port in [0u8, 225, 255] {
            let cmd = lorawan(port, UplinkType::Unconfirmed, 1);
            assert!(
                matches!(cmd.encode(), Err(CommandError::InvalidParameters(_))),
                "port {}",
                port
            );
        }
        assert!(lorawan(224, UplinkType::Unconfirmed, 1).encode().is_ok());
    }

    #[test]
    fn test_lorawan_uplink_bounded_by_frame() {
        assert!(lorawan(1, UplinkType::Unconfirmed, 298).encode().is_ok());
        let too_long = lorawan(1, UplinkType::Unconfirmed, 299);
        assert!(matches!(too_long.encode(), Err(CommandError::InvalidParameters(_))));
    }

    #[test]
    fn test_sidewalk_uplink_link_limits() {
        let css = |len| sidewalk(SidewalkLink::Css, UplinkType::Unconfirmed, len);
        assert!(css(19).encode().is_ok());
        assert!(css(20).encode().is_err());
        assert!(css(0).encode().is_err());

        assert!(sidewalk(SidewalkLink::Fsk, UplinkType::Confirmed, 201).encode().is_err());
        assert!(sidewalk(SidewalkLink::Ble, UplinkType::Confirmed, 255).encode().is_ok());
    }

    #[test]
    fn test_raw_range_checks() {
        assert!(encode_raw(CommandCategory::LoRaWan, CommandCode::SetLoRaWanClass, &[3]).is_err());
        assert!(encode_raw(CommandCategory::LoRaWan, CommandCode::SetLoRaWanClass, &[2]).is_ok());
        assert!(encode_raw(CommandCategory::Sidewalk, CommandCode::SetCssProfile, &[2]).is_err());
        assert!(
            encode_raw(CommandCategory::Sidewalk, CommandCode::SetDownlinkFilter, &[1]).is_ok()
        );
        assert!(encode_raw(CommandCategory::LoRaWan, CommandCode::StopNetwork, &[0]).is_err());
        assert!(
            encode_raw(CommandCategory::LoRaWan, CommandCode::RequestUplink, &[1, 2, 0]).is_err()
        );
        assert!(encode_raw(CommandCategory::Sidewalk, CommandCode::RequestUplink, &[0]).is_err());
    }

    #[test]
    fn test_raw_shape_checks() {
        assert!(encode_raw(CommandCategory::General, CommandCode::GetVersion, &[0]).is_err());
        assert!(encode_raw(CommandCategory::LoRaWan, CommandCode::SetDevEui, &[0; 7]).is_err());
        assert!(encode_raw(CommandCategory::General, CommandCode::JoinLoRaWan, &[]).is_err());
        assert!(
            encode_raw(CommandCategory::General, CommandCode::RequestUplink, &[1, 0, 0]).is_err()
        );
    }
}
