//! Error types for framing, command building and firmware transfer

use thiserror::Error;

use crate::types::ResultCode;

/// Inbound frame or payload rejected by validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    InvalidLength(usize),
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    InvalidChecksum { expected: u8, actual: u8 },
    #[error("invalid result code {0:#04x}")]
    InvalidResult(u8),
    #[error("invalid command category {0:#04x}")]
    InvalidCategory(u8),
    #[error("invalid command code {0:#06x}")]
    InvalidCommand(u16),
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error("invalid serial data: expected {expected} bytes, got {actual}")]
    InvalidSerialData { expected: usize, actual: usize },
}

/// Outbound command refused before or while it was sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("short write: {written} of {expected} bytes")]
    PortError { expected: usize, written: usize },
}

/// Block transfer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Recovered by NAK; the sender retransmits
    #[error("packet crc mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
    #[error("block number {seq:#04x} does not match complement {complement:#04x}")]
    SequenceMismatch { seq: u8, complement: u8 },
    #[error("packet too short: {0} bytes")]
    ShortPacket(usize),
    #[error("malformed header packet: {0}")]
    MalformedHeader(String),
    #[error("transfer idle for {idle_ms} ms")]
    Timeout { idle_ms: u64 },
    #[error("firmware sink error: {0}")]
    Sink(String),
}

/// Errors surfaced by the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McmError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Transport layer error (UART, serial, etc.)
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no response to command {code:#06x}")]
    ResponseTimeout { code: u16 },
    #[error("command {code:#06x} rejected by module: {result:?}")]
    Rejected { code: u16, result: ResultCode },
    #[error("a firmware transfer owns the serial link")]
    TransferActive,
    #[error("unexpected response payload for command {code:#06x}")]
    UnexpectedResponse { code: u16 },
    #[error("no completed firmware download is waiting")]
    NoFirmwarePending,
}
