//! Wire-level enumerations and small value types shared by the codec and engine

use std::fmt;

/// Result byte leading every inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0x00,
    Unknown = 0x01,
    NotImplemented = 0x02,
    Fail = 0x06,
    BadChecksum = 0x08,
    BadSize = 0x0A,
    NotifyEvents = 0x20,
}

impl ResultCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Ok),
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::NotImplemented),
            0x06 => Some(Self::Fail),
            0x08 => Some(Self::BadChecksum),
            0x0A => Some(Self::BadSize),
            0x20 => Some(Self::NotifyEvents),
            _ => None,
        }
    }
}

/// Command category byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    General = 0x01,
    LoRaWan = 0x02,
    Sidewalk = 0x03,
}

impl CommandCategory {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::General),
            0x02 => Some(Self::LoRaWan),
            0x03 => Some(Self::Sidewalk),
            _ => None,
        }
    }
}

/// 16-bit command codes understood by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    GetEvent = 0x0000,
    GetVersion = 0x0001,
    Reset = 0x0002,
    FactoryReset = 0x0003,
    SwitchNetwork = 0x0100,
    InitLoRaWan = 0x00FF,
    GetJoinEui = 0x0010,
    SetJoinEui = 0x0011,
    GetDevEui = 0x0012,
    SetDevEui = 0x0013,
    SetNwKey = 0x0014,
    GetLoRaWanClass = 0x0015,
    SetLoRaWanClass = 0x0016,
    JoinLoRaWan = 0x0025,
    LeaveLoRaWan = 0x0026,
    RequestUplink = 0x0029,
    StartFileTransfer = 0x00D3,
    FileStatus = 0x00D4,
    TriggerFwUpdate = 0x00D5,
    FskLinkRequest = 0x00F8,
    CssLinkRequest = 0x00F9,
    BleLinkRequest = 0x00FA,
    BleConnRequest = 0x00FB,
    SetDownlinkFilter = 0x00FC,
    SetCssProfile = 0x00FD,
    StopNetwork = 0x00FE,
}

impl CommandCode {
    pub const ALL: [CommandCode; 26] = [
        Self::GetEvent,
        Self::GetVersion,
        Self::Reset,
        Self::FactoryReset,
        Self::SwitchNetwork,
        Self::InitLoRaWan,
        Self::GetJoinEui,
        Self::SetJoinEui,
        Self::GetDevEui,
        Self::SetDevEui,
        Self::SetNwKey,
        Self::GetLoRaWanClass,
        Self::SetLoRaWanClass,
        Self::JoinLoRaWan,
        Self::LeaveLoRaWan,
        Self::RequestUplink,
        Self::StartFileTransfer,
        Self::FileStatus,
        Self::TriggerFwUpdate,
        Self::FskLinkRequest,
        Self::CssLinkRequest,
        Self::BleLinkRequest,
        Self::BleConnRequest,
        Self::SetDownlinkFilter,
        Self::SetCssProfile,
        Self::StopNetwork,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| *code as u16 == value)
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Asynchronous event kinds reported through GetEvent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Reset = 0x00,
    Alarm = 0x01,
    Joined = 0x02,
    TxDone = 0x03,
    DownData = 0x04,
    UploadDone = 0x05,
    SetConf = 0x06,
    Mute = 0x07,
    StreamDone = 0x08,
    JoinFail = 0x0A,
    Time = 0x0D,
    AdrTimeoutChanged = 0x0E,
    NewLinkAdr = 0x0F,
    LinkCheck = 0x10,
    AlmanacUpdate = 0x11,
    UserRadioAccess = 0x12,
    ClassBPingSlotInfo = 0x13,
    ClassBStatus = 0x14,
    MacTime = 0x15,
    SegmentedFileDownload = 0xD0,
    ClassSwitched = 0xF0,
    None = 0xFF,
}

impl EventCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let code = match value {
            0x00 => Self::Reset,
            0x01 => Self::Alarm,
            0x02 => Self::Joined,
            0x03 => Self::TxDone,
            0x04 => Self::DownData,
            0x05 => Self::UploadDone,
            0x06 => Self::SetConf,
            0x07 => Self::Mute,
            0x08 => Self::StreamDone,
            0x0A => Self::JoinFail,
            0x0D => Self::Time,
            0x0E => Self::AdrTimeoutChanged,
            0x0F => Self::NewLinkAdr,
            0x10 => Self::LinkCheck,
            0x11 => Self::AlmanacUpdate,
            0x12 => Self::UserRadioAccess,
            0x13 => Self::ClassBPingSlotInfo,
            0x14 => Self::ClassBStatus,
            0x15 => Self::MacTime,
            0xD0 => Self::SegmentedFileDownload,
            0xF0 => Self::ClassSwitched,
            0xFF => Self::None,
            _ => return None,
        };
        Some(code)
    }
}

/// LoRaWAN device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoRaWanClass {
    A = 0,
    B = 1,
    C = 2,
}

impl LoRaWanClass {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            _ => None,
        }
    }
}

/// Uplink acknowledgement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UplinkType {
    Unconfirmed = 0,
    Confirmed = 1,
}

/// Outcome reported by a TxDone event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    NotSent = 0,
    DoneNoAck = 1,
    DoneWithAck = 2,
}

impl TxStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotSent),
            1 => Some(Self::DoneNoAck),
            2 => Some(Self::DoneWithAck),
            _ => None,
        }
    }
}

/// Sidewalk CSS power profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CssProfile {
    A = 0,
    B = 1,
}

/// Sidewalk downlink filtering switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownlinkFilter {
    Enable = 0,
    Disable = 1,
}

/// Sidewalk physical link, which bounds the uplink payload size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SidewalkLink {
    Ble,
    Fsk,
    Css,
}

impl SidewalkLink {
    pub fn max_uplink_len(self) -> usize {
        match self {
            Self::Ble => 255,
            Self::Fsk => 200,
            Self::Css => 19,
        }
    }
}

/// Network the engine asks the module to attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    LoRaWan,
    Sidewalk(SidewalkLink),
}

/// Three-byte firmware version as carried in transfer and status frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version with a 16-bit patch number (bootloader and modem firmware)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WideVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
}

impl fmt::Display for WideVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub const EUI_SIZE: usize = 8;
pub const NETWORK_KEY_SIZE: usize = 16;

/// 64-bit LoRaWAN identifier (DevEUI or JoinEUI)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Eui(pub [u8; EUI_SIZE]);

impl Eui {
    /// Create from a slice. Returns None if slice is wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; EUI_SIZE] = slice.try_into().ok()?;
        Some(Eui(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; EUI_SIZE] {
        &self.0
    }
}

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_hex(&self.0))
    }
}

/// Convert bytes to uppercase hex string
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
