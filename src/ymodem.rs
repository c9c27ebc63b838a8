//! Receiver side of the YMODEM-style block transfer used to pull firmware
//! images off the module.
//!
//! Packet layout:
//!
//! ```text
//! | SOH/STX | seq | !seq | block (128 or 1024 bytes) | crc_hi | crc_lo |
//! ```
//!
//! Block 0 carries `name\0size\0` and opens the transfer. Once the header
//! is accepted every data packet spans a 1024-byte block whichever lead byte
//! it carries, with a CRC-16/XMODEM trailer over the full block. The receiver answers every
//! packet with ACK or NAK and never retries on its own; retransmission is
//! the sender's job. EOT closes the image.

use log::{debug, error, info, warn};

use crate::error::TransferError;
use crate::sink::FirmwareSink;

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CRC_REQUEST: u8 = b'C';

pub const HEADER_BLOCK_LEN: usize = 128;
pub const DATA_BLOCK_LEN: usize = 1024;
const PACKET_HEADER_LEN: usize = 3;
const PACKET_OVERHEAD: usize = PACKET_HEADER_LEN + 2;

/// Largest image a header may announce; package sizes are 24-bit
pub const MAX_FILE_SIZE: u64 = 0xFF_FFFF;

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0, MSB first
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (crc << 8) ^ CRC16_TABLE[((crc >> 8) ^ byte as u16) as usize]
    })
}

/// Block size a header packet carries for its lead byte
fn header_block_len(lead: u8) -> Option<usize> {
    match lead {
        SOH => Some(HEADER_BLOCK_LEN),
        STX => Some(DATA_BLOCK_LEN),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    AwaitingHeader,
    ReceivingData,
    AwaitingEot,
    Complete,
}

/// What a packet did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Started { file_name: String, size: u64 },
    BlockWritten { remaining: u64 },
    BlockRejected(TransferError),
    /// Retransmission of the block already written; acknowledged only
    Duplicate { seq: u8 },
    Complete { bytes: u64 },
    Ignored,
}

/// Bytes to send back plus what happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub reply: Vec<u8>,
    pub event: TransferEvent,
}

impl Step {
    fn ignored() -> Self {
        Self { reply: Vec::new(), event: TransferEvent::Ignored }
    }
}

#[derive(Debug)]
pub struct TransferSession {
    state: TransferState,
    file_name: String,
    file_size: u64,
    remaining: u64,
    last_seq: Option<u8>,
    last_activity_ms: u64,
    idle_timeout_ms: u64,
    sink_open: bool,
}

impl TransferSession {
    pub fn new(idle_timeout_ms: u64) -> Self {
        Self {
            state: TransferState::Idle,
            file_name: String::new(),
            file_size: 0,
            remaining: 0,
            last_seq: None,
            last_activity_ms: 0,
            idle_timeout_ms,
            sink_open: false,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != TransferState::Idle
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Full size of the packet a lead byte opens in the current state
    pub fn packet_len(&self, lead: u8) -> Option<usize> {
        match (self.state, lead) {
            (_, EOT) => Some(1),
            (TransferState::AwaitingHeader, _) => {
                header_block_len(lead).map(|len| PACKET_OVERHEAD + len)
            }
            (_, SOH | STX) => Some(PACKET_OVERHEAD + DATA_BLOCK_LEN),
            _ => None,
        }
    }

    fn set_state(&mut self, state: TransferState) {
        if self.state != state {
            debug!("Transfer state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn reply(&mut self, bytes: &[u8], now_ms: u64) -> Vec<u8> {
        self.last_activity_ms = now_ms;
        bytes.to_vec()
    }

    fn reset(&mut self) {
        self.set_state(TransferState::Idle);
        self.file_name.clear();
        self.file_size = 0;
        self.remaining = 0;
        self.last_seq = None;
        self.sink_open = false;
    }

    /// Start waiting for a header. Returns the CRC request to send.
    pub fn begin(&mut self, now_ms: u64) -> Vec<u8> {
        if self.is_active() {
            warn!("Restarting transfer from {:?}", self.state);
        }
        self.reset();
        self.set_state(TransferState::AwaitingHeader);
        self.reply(&[CRC_REQUEST], now_ms)
    }

    /// Drop back to Idle before any header was accepted
    pub fn cancel(&mut self) {
        if self.sink_open {
            warn!("Cancelling transfer of {} with the image open", self.file_name);
        }
        self.reset();
    }

    /// Abandon the session if it has been idle too long.
    ///
    /// The sink is told to discard its partial image but is never finished.
    pub fn check_timeout<S: FirmwareSink>(
        &mut self,
        now_ms: u64,
        sink: &mut S,
    ) -> Option<TransferError> {
        if !self.is_active() {
            return None;
        }
        let idle_ms = now_ms.saturating_sub(self.last_activity_ms);
        if idle_ms <= self.idle_timeout_ms {
            return None;
        }

        error!("Transfer idle for {} ms in {:?}, aborting", idle_ms, self.state);
        if self.sink_open {
            sink.abort();
        }
        self.reset();
        Some(TransferError::Timeout { idle_ms })
    }

    /// Process one complete packet (or a lone EOT byte)
    pub fn handle_packet<S: FirmwareSink>(
        &mut self,
        packet: &[u8],
        now_ms: u64,
        sink: &mut S,
    ) -> Result<Step, TransferError> {
        let Some(&lead) = packet.first() else {
            return Ok(Step::ignored());
        };

        match (self.state, lead) {
            (TransferState::AwaitingHeader, SOH | STX) => self.handle_header(packet, now_ms, sink),
            (TransferState::ReceivingData | TransferState::AwaitingEot, SOH | STX) => {
                self.handle_data(packet, now_ms, sink)
            }
            (TransferState::ReceivingData | TransferState::AwaitingEot, EOT) => {
                self.handle_eot(now_ms, sink)
            }
            (state, lead) => {
                debug!("Ignoring {:#04x} in {:?}", lead, state);
                Ok(Step::ignored())
            }
        }
    }

    fn handle_header<S: FirmwareSink>(
        &mut self,
        packet: &[u8],
        now_ms: u64,
        sink: &mut S,
    ) -> Result<Step, TransferError> {
        let block_len = header_block_len(packet[0]).unwrap_or(HEADER_BLOCK_LEN);
        let parsed = check_packet(packet, block_len).and_then(parse_header);
        let (file_name, size) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Bad header packet: {}", e);
                let reply = self.reply(&[NAK], now_ms);
                return Ok(Step { reply, event: TransferEvent::BlockRejected(e) });
            }
        };

        sink.open(&file_name, size)
            .map_err(|e| TransferError::Sink(format!("{:?}", e)))?;
        self.sink_open = true;

        info!("Receiving {} ({} bytes)", file_name, size);
        self.file_name = file_name.clone();
        self.file_size = size;
        self.remaining = size;
        self.set_state(TransferState::ReceivingData);

        let reply = self.reply(&[ACK, CRC_REQUEST], now_ms);
        Ok(Step { reply, event: TransferEvent::Started { file_name, size } })
    }

    fn handle_data<S: FirmwareSink>(
        &mut self,
        packet: &[u8],
        now_ms: u64,
        sink: &mut S,
    ) -> Result<Step, TransferError> {
        if let Err(e) = check_packet(packet, DATA_BLOCK_LEN) {
            warn!("Rejecting data packet: {}", e);
            let reply = self.reply(&[NAK], now_ms);
            return Ok(Step { reply, event: TransferEvent::BlockRejected(e) });
        }

        let seq = packet[1];
        if self.last_seq == Some(seq) {
            debug!("Block {} repeated, acknowledging without writing", seq);
            let reply = self.reply(&[ACK], now_ms);
            return Ok(Step { reply, event: TransferEvent::Duplicate { seq } });
        }

        if self.remaining == 0 {
            // sender padding past the declared size
            self.set_state(TransferState::AwaitingEot);
        } else {
            let len = (self.remaining as usize).min(DATA_BLOCK_LEN);
            let block = &packet[PACKET_HEADER_LEN..PACKET_HEADER_LEN + len];
            if let Err(e) = sink.write(block) {
                error!("Sink write failed, aborting transfer: {:?}", e);
                sink.abort();
                self.reset();
                return Err(TransferError::Sink(format!("{:?}", e)));
            }
            self.remaining -= len as u64;
            debug!("Block {} written, {} bytes remaining", seq, self.remaining);
        }
        self.last_seq = Some(seq);

        let reply = self.reply(&[ACK], now_ms);
        Ok(Step { reply, event: TransferEvent::BlockWritten { remaining: self.remaining } })
    }

    fn handle_eot<S: FirmwareSink>(
        &mut self,
        now_ms: u64,
        sink: &mut S,
    ) -> Result<Step, TransferError> {
        let reply = self.reply(&[ACK], now_ms);
        if self.remaining > 0 {
            warn!("EOT with {} bytes still outstanding", self.remaining);
        }

        self.sink_open = false;
        let finished = sink.finish();
        let bytes = self.file_size - self.remaining;
        self.set_state(TransferState::Complete);
        self.reset();

        finished.map_err(|e| TransferError::Sink(format!("{:?}", e)))?;
        info!("Transfer complete, {} bytes", bytes);
        Ok(Step { reply, event: TransferEvent::Complete { bytes } })
    }
}

/// Check sequence complement and the CRC trailer over the `block_len`-byte
/// block that follows the 3-byte packet header
fn check_packet(packet: &[u8], block_len: usize) -> Result<&[u8], TransferError> {
    if packet.len() < PACKET_OVERHEAD + block_len {
        return Err(TransferError::ShortPacket(packet.len()));
    }
    if packet[1] != !packet[2] {
        return Err(TransferError::SequenceMismatch { seq: packet[1], complement: packet[2] });
    }

    let block = &packet[PACKET_HEADER_LEN..PACKET_HEADER_LEN + block_len];
    let trailer = &packet[PACKET_HEADER_LEN + block_len..PACKET_OVERHEAD + block_len];
    let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
    let actual = crc16(block);
    if expected != actual {
        return Err(TransferError::ChecksumMismatch { expected, actual });
    }
    Ok(block)
}

/// Parse `name\0size` from a header block
fn parse_header(block: &[u8]) -> Result<(String, u64), TransferError> {
    let name_end = block
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| TransferError::MalformedHeader("no NUL after file name".into()))?;
    if name_end == 0 {
        return Err(TransferError::MalformedHeader("empty file name".into()));
    }
    let file_name = String::from_utf8_lossy(&block[..name_end]).to_string();

    let size_field: Vec<u8> = block[name_end + 1..]
        .iter()
        .copied()
        .take_while(|b| b.is_ascii_digit())
        .collect();
    let size = std::str::from_utf8(&size_field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| TransferError::MalformedHeader(format!("no size for {}", file_name)))?;
    if size > MAX_FILE_SIZE {
        return Err(TransferError::MalformedHeader(format!(
            "{} announces {} bytes, limit is {}",
            file_name,
            size,
            MAX_FILE_SIZE
        )));
    }

    Ok((file_name, size))
}
