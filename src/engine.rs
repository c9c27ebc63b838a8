//! `McmEngine`: drives one module over one serial link

use log::{debug, error, info, warn};
use std::collections::VecDeque;

use crate::clock::Clock;
use crate::command::Command;
use crate::config::EngineConfig;
use crate::error::{CommandError, FrameError, McmError, TransferError};
use crate::frame::{
    self, MAX_PAYLOAD_LEN, MAX_PENDING_EVENTS, NOTIFICATION_LEN, RESPONSE_HEADER_LEN,
    RESPONSE_OVERHEAD,
};
use crate::response::{self, Event, Response, ResponsePayload, VersionInfo};
use crate::segment::{BinaryType, SegmentedFileStatus};
use crate::sink::FirmwareSink;
use crate::transport::McmTransport;
use crate::types::{
    CommandCode, ConnectionMode, Eui, EventCode, FirmwareVersion, LoRaWanClass, NETWORK_KEY_SIZE,
    ResultCode, SidewalkLink, UplinkType,
};
use crate::ymodem::{TransferEvent, TransferSession, TransferState};

const READ_CHUNK_LEN: usize = 1100;

/// A firmware image the module has finished downloading and the host should act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareUpdate {
    pub target: BinaryType,
    pub version: FirmwareVersion,
    pub status: SegmentedFileStatus,
}

/// Something the engine observed while polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Notification { pending: u8 },
    Response(Response),
    /// `code` is set when the frame was a well-formed response whose payload failed to decode
    FrameRejected { code: Option<CommandCode>, error: FrameError },
    FirmwareReady(FirmwareUpdate),
    TransferStarted { file_name: String, size: u64 },
    PacketRejected(TransferError),
    TransferComplete { bytes: u64 },
    TransferFailed(TransferError),
    TransferTimeout,
}

/// Drives one MCM module over one serial link
pub struct McmEngine<T: McmTransport, C: Clock, S: FirmwareSink> {
    transport: T,
    clock: C,
    sink: S,
    config: EngineConfig,
    rx_buffer: Vec<u8>,
    rx_since_ms: Option<u64>,
    pending_events: u8,
    session: TransferSession,
    events: VecDeque<EngineEvent>,
    firmware: Option<FirmwareUpdate>,
}

impl<T: McmTransport, C: Clock, S: FirmwareSink> McmEngine<T, C, S> {
    pub fn new(transport: T, clock: C, sink: S, config: EngineConfig) -> Self {
        let session = TransferSession::new(config.transfer_idle_timeout.as_millis() as u64);
        Self {
            transport,
            clock,
            sink,
            events: VecDeque::with_capacity(config.event_queue_capacity),
            config,
            rx_buffer: Vec::with_capacity(READ_CHUNK_LEN),
            rx_since_ms: None,
            pending_events: 0,
            session,
            firmware: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Events the module reported as still queued
    pub fn pending_events(&self) -> u8 {
        self.pending_events
    }

    pub fn transfer_state(&self) -> TransferState {
        self.session.state()
    }

    /// Completed download waiting for `process_firmware_update`
    pub fn firmware_available(&self) -> Option<&FirmwareUpdate> {
        self.firmware.as_ref()
    }

    /// Hand over bytes from a receive callback. Only buffers; `poll` decodes.
    pub fn on_bytes_received(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.rx_buffer.is_empty() {
            self.rx_since_ms = Some(self.clock.now_ms());
        }
        self.rx_buffer.extend_from_slice(data);
    }

    /// Pull input, run timeouts and decode; returns everything observed since the last poll
    pub fn poll(&mut self) -> Result<Vec<EngineEvent>, McmError> {
        self.service()?;
        Ok(self.events.drain(..).collect())
    }

    fn service(&mut self) -> Result<(), McmError> {
        let mut chunk = [0u8; READ_CHUNK_LEN];
        let read = self
            .transport
            .read(&mut chunk, self.config.read_timeout_ms)
            .map_err(|e| McmError::Transport(format!("{:?}", e)))?;
        if read > 0 {
            debug!("Received {} bytes: {:02X?}", read, &chunk[..read]);
            self.on_bytes_received(&chunk[..read]);
        }

        let now = self.clock.now_ms();
        if let Some(e) = self.session.check_timeout(now, &mut self.sink) {
            error!("Firmware transfer abandoned: {}", e);
            self.rx_buffer.clear();
            self.rx_since_ms = None;
            self.push_event(EngineEvent::TransferTimeout);
        }

        if self.rx_buffer.is_empty() {
            return Ok(());
        }
        if self.session.is_active() {
            self.route_transfer(now)
        } else {
            self.route_frames(now)
        }
    }

    fn push_event(&mut self, event: EngineEvent) {
        if self.events.len() >= self.config.event_queue_capacity {
            if let Some(dropped) = self.events.pop_front() {
                warn!("Event queue full, dropping {:?}", dropped);
            }
        }
        self.events.push_back(event);
    }

    fn take_rx(&mut self) -> Vec<u8> {
        self.rx_since_ms = None;
        std::mem::take(&mut self.rx_buffer)
    }

    /// True while the buffer holds the start of a frame whose tail has not arrived
    fn frame_incomplete(buffer: &[u8]) -> bool {
        match buffer.first() {
            None => false,
            Some(&lead) if lead == ResultCode::NotifyEvents as u8 => {
                buffer.len() < NOTIFICATION_LEN
                    || Self::frame_incomplete(&buffer[NOTIFICATION_LEN..])
            }
            Some(_) if buffer.len() < RESPONSE_HEADER_LEN => true,
            Some(_) => {
                let declared = frame::declared_len(buffer[4], buffer[5]);
                declared <= MAX_PAYLOAD_LEN && buffer.len() < RESPONSE_OVERHEAD + declared
            }
        }
    }

    fn route_frames(&mut self, now: u64) -> Result<(), McmError> {
        if Self::frame_incomplete(&self.rx_buffer) {
            let waited = now.saturating_sub(self.rx_since_ms.unwrap_or(now));
            if waited <= self.config.response_timeout.as_millis() as u64 {
                return Ok(());
            }
            warn!("Discarding partial frame after {} ms", waited);
        }

        let buffer = self.take_rx();
        let frames = match frame::frames(&buffer) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Rejected inbound data {:02X?}: {}", buffer, e);
                self.push_event(EngineEvent::FrameRejected { code: None, error: e });
                return Ok(());
            }
        };

        let mut outcome = Ok(());
        for raw in frames {
            if frame::is_notification(raw) {
                self.handle_notification(raw);
                continue;
            }
            match response::decode(raw) {
                Ok(response) => {
                    if let Err(e) = self.handle_response(response, now) {
                        outcome = Err(e);
                    }
                }
                Err(error) => {
                    warn!("Rejected response {:02X?}: {}", raw, error);
                    let code = response::response_code(raw);
                    self.push_event(EngineEvent::FrameRejected { code, error });
                }
            }
        }
        outcome
    }

    fn handle_notification(&mut self, raw: &[u8]) {
        match frame::pending_count(raw) {
            Ok(pending) => {
                debug!("Notification: {} pending events", pending);
                self.pending_events = pending;
                self.push_event(EngineEvent::Notification { pending });
            }
            Err(e) => {
                warn!("Rejected notification {:02X?}: {}", raw, e);
                self.push_event(EngineEvent::FrameRejected { code: None, error: e });
            }
        }
    }

    fn handle_response(&mut self, response: Response, now: u64) -> Result<(), McmError> {
        debug!("Response {:?} result {:?}", response.code, response.result);

        match &response.payload {
            ResponsePayload::Event(event) => {
                self.pending_events = event.pending;
                if let response::EventData::SegmentedFile(status) = event.data {
                    self.note_file_status(status);
                }
            }
            ResponsePayload::FileStatus(status) => self.note_file_status(*status),
            _ => {}
        }

        if response.code == CommandCode::StartFileTransfer && response.is_ok() {
            self.start_session(now)?;
        }
        self.push_event(EngineEvent::Response(response));
        Ok(())
    }

    /// Enter AwaitingHeader and send the CRC request; the session is dropped
    /// again if the request can't be written
    fn start_session(&mut self, now: u64) -> Result<(), McmError> {
        let request = self.session.begin(now);
        if let Err(e) = self.write_all(&request) {
            error!("Failed to request transfer header: {}", e);
            self.session.cancel();
            return Err(e);
        }
        Ok(())
    }

    fn note_file_status(&mut self, status: SegmentedFileStatus) {
        if !status.is_complete() {
            debug!(
                "Segmented download in progress: next segment {}, bitmap {:#06x}",
                status.next_segment_id, status.segment_bitmap
            );
            return;
        }

        match status.binary_type {
            BinaryType::Host if status.firmware_version == self.config.host_version => {
                info!("Host image {} already running, ignoring download", status.firmware_version);
            }
            BinaryType::Host | BinaryType::Mcm => {
                info!("{:?} firmware {} ready", status.binary_type, status.firmware_version);
                let update = FirmwareUpdate {
                    target: status.binary_type,
                    version: status.firmware_version,
                    status,
                };
                self.firmware = Some(update);
                self.push_event(EngineEvent::FirmwareReady(update));
            }
            BinaryType::Other(kind) => {
                warn!("Ignoring download of unknown binary type {}", kind);
            }
        }
    }

    fn route_transfer(&mut self, now: u64) -> Result<(), McmError> {
        while let Some(&lead) = self.rx_buffer.first() {
            let packet: Vec<u8> = match self.session.packet_len(lead) {
                Some(len) if self.rx_buffer.len() >= len => self.rx_buffer.drain(..len).collect(),
                Some(_) => break,
                None => self.take_rx(),
            };

            match self.session.handle_packet(&packet, now, &mut self.sink) {
                Ok(step) => {
                    if !step.reply.is_empty() {
                        self.write_all(&step.reply)?;
                    }
                    match step.event {
                        TransferEvent::Started { file_name, size } => {
                            self.push_event(EngineEvent::TransferStarted { file_name, size });
                        }
                        TransferEvent::BlockRejected(e) => {
                            self.push_event(EngineEvent::PacketRejected(e));
                        }
                        TransferEvent::Complete { bytes } => {
                            self.firmware = None;
                            self.push_event(EngineEvent::TransferComplete { bytes });
                        }
                        TransferEvent::BlockWritten { .. }
                        | TransferEvent::Duplicate { .. }
                        | TransferEvent::Ignored => {}
                    }
                }
                Err(e) => {
                    error!("Firmware transfer failed: {}", e);
                    self.push_event(EngineEvent::TransferFailed(e));
                }
            }

            if !self.session.is_active() {
                self.rx_buffer.clear();
            }
        }

        if self.rx_buffer.is_empty() {
            self.rx_since_ms = None;
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), McmError> {
        let written = self
            .transport
            .write(data)
            .map_err(|e| McmError::Transport(format!("{:?}", e)))?;
        if written != data.len() {
            error!("Short write: {} of {} bytes", written, data.len());
            return Err(CommandError::PortError { expected: data.len(), written }.into());
        }
        Ok(())
    }

    /// Frame and send a command without waiting for its response
    pub fn send(&mut self, command: &Command) -> Result<(), McmError> {
        if self.session.is_active() {
            return Err(McmError::TransferActive);
        }
        let frame = command.encode()?;

        self.transport
            .clear_input()
            .map_err(|e| McmError::Transport(format!("{:?}", e)))?;
        debug!("Sending command: {:02X?}", frame);
        self.write_all(&frame)
    }

    /// Send a command and wait for the response carrying the same code.
    /// Other events seen meanwhile stay queued for the next `poll`.
    pub fn execute(&mut self, command: &Command) -> Result<Response, McmError> {
        self.send(command)?;

        let code = command.code();
        let deadline = self.clock.now_ms() + self.config.response_timeout.as_millis() as u64;
        loop {
            self.service()?;

            let matched = self.events.iter().position(|e| match e {
                EngineEvent::Response(r) => r.code == code,
                EngineEvent::FrameRejected { code: rejected, .. } => *rejected == Some(code),
                _ => false,
            });
            match matched.and_then(|i| self.events.remove(i)) {
                Some(EngineEvent::Response(response)) => return Ok(response),
                Some(EngineEvent::FrameRejected { error, .. }) => return Err(error.into()),
                _ => {}
            }

            if self.clock.now_ms() >= deadline {
                warn!("No response to {:?} within {:?}", code, self.config.response_timeout);
                return Err(McmError::ResponseTimeout { code: code.as_u16() });
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// `execute`, treating any result other than Ok as an error
    pub fn execute_ok(&mut self, command: &Command) -> Result<Response, McmError> {
        let response = self.execute(command)?;
        if !response.is_ok() {
            return Err(McmError::Rejected {
                code: response.code.as_u16(),
                result: response.result,
            });
        }
        Ok(response)
    }

    fn unexpected(response: &Response) -> McmError {
        McmError::UnexpectedResponse { code: response.code.as_u16() }
    }

    pub fn get_version(&mut self) -> Result<VersionInfo, McmError> {
        let response = self.execute_ok(&Command::GetVersion)?;
        match response.payload {
            ResponsePayload::Version(info) => Ok(info),
            _ => Err(Self::unexpected(&response)),
        }
    }

    pub fn get_dev_eui(&mut self) -> Result<Eui, McmError> {
        let response = self.execute_ok(&Command::GetDevEui)?;
        match response.payload {
            ResponsePayload::DevEui(eui) => Ok(eui),
            _ => Err(Self::unexpected(&response)),
        }
    }

    pub fn get_join_eui(&mut self) -> Result<Eui, McmError> {
        let response = self.execute_ok(&Command::GetJoinEui)?;
        match response.payload {
            ResponsePayload::JoinEui(eui) => Ok(eui),
            _ => Err(Self::unexpected(&response)),
        }
    }

    pub fn get_lorawan_class(&mut self) -> Result<LoRaWanClass, McmError> {
        let response = self.execute_ok(&Command::GetLoRaWanClass)?;
        match response.payload {
            ResponsePayload::Class(class) => Ok(class),
            _ => Err(Self::unexpected(&response)),
        }
    }

    /// Ask the module for its segmented download status
    pub fn file_status(&mut self) -> Result<SegmentedFileStatus, McmError> {
        let response = self.execute_ok(&Command::FileStatus)?;
        match response.payload {
            ResponsePayload::FileStatus(status) => Ok(status),
            _ => Err(Self::unexpected(&response)),
        }
    }

    /// Drain one event from the module's queue
    pub fn get_event(&mut self) -> Result<Event, McmError> {
        let response = self.execute_ok(&Command::GetEvent)?;
        match response.payload {
            ResponsePayload::Event(event) => Ok(event),
            _ => Err(Self::unexpected(&response)),
        }
    }

    /// Issue GetEvent until the module reports nothing pending
    pub fn drain_events(&mut self) -> Result<Vec<Event>, McmError> {
        let mut drained = Vec::new();
        while self.pending_events > 0 && drained.len() < MAX_PENDING_EVENTS as usize {
            let event = self.get_event()?;
            if event.code == EventCode::None {
                self.pending_events = 0;
                break;
            }
            debug!("Event {:?}, {} still pending", event.code, event.pending);
            drained.push(event);
        }
        Ok(drained)
    }

    /// Load LoRaWAN credentials: init, DevEUI, JoinEUI, network key
    pub fn provision_lorawan(
        &mut self,
        dev_eui: Eui,
        join_eui: Eui,
        network_key: [u8; NETWORK_KEY_SIZE],
    ) -> Result<(), McmError> {
        info!("Provisioning LoRaWAN DevEUI {} JoinEUI {}", dev_eui, join_eui);
        for command in [
            Command::InitLoRaWan,
            Command::SetDevEui(dev_eui),
            Command::SetJoinEui(join_eui),
            Command::SetNwKey(network_key),
        ] {
            self.execute_ok(&command)?;
        }
        Ok(())
    }

    /// Start joining the network selected by `mode`
    pub fn connect(&mut self, mode: ConnectionMode) -> Result<(), McmError> {
        let command = match mode {
            ConnectionMode::LoRaWan => Command::JoinLoRaWan,
            ConnectionMode::Sidewalk(SidewalkLink::Ble) => Command::BleLinkRequest,
            ConnectionMode::Sidewalk(SidewalkLink::Fsk) => Command::FskLinkRequest,
            ConnectionMode::Sidewalk(SidewalkLink::Css) => Command::CssLinkRequest,
        };
        self.execute_ok(&command).map(|_| ())
    }

    pub fn send_lorawan_uplink(
        &mut self,
        port: u8,
        uplink_type: UplinkType,
        data: &[u8],
    ) -> Result<(), McmError> {
        let command = Command::LoRaWanUplink { port, uplink_type, data: data.to_vec() };
        self.execute_ok(&command).map(|_| ())
    }

    pub fn send_sidewalk_uplink(
        &mut self,
        link: SidewalkLink,
        uplink_type: UplinkType,
        data: &[u8],
    ) -> Result<(), McmError> {
        let command = Command::SidewalkUplink { link, uplink_type, data: data.to_vec() };
        self.execute_ok(&command).map(|_| ())
    }

    /// Act on the completed download: the module flashes its own image,
    /// a host image is pulled over the block transfer.
    pub fn process_firmware_update(&mut self) -> Result<(), McmError> {
        let update = self.firmware.ok_or(McmError::NoFirmwarePending)?;
        let command = match update.target {
            BinaryType::Mcm => Command::TriggerFwUpdate(update.version),
            BinaryType::Host => Command::StartFileTransfer(update.version),
            BinaryType::Other(_) => return Err(McmError::NoFirmwarePending),
        };

        info!("Processing {:?} firmware update to {}", update.target, update.version);
        self.execute_ok(&command)?;
        if update.target == BinaryType::Mcm {
            self.firmware = None;
        }
        Ok(())
    }

    /// Open a transfer session and request the header packet
    pub fn begin_transfer(&mut self) -> Result<(), McmError> {
        self.rx_buffer.clear();
        self.rx_since_ms = None;
        let now = self.clock.now_ms();
        self.start_session(now)
    }

    /// Install the image received by the last completed transfer
    pub fn install_firmware(&mut self) -> Result<(), McmError> {
        if self.session.is_active() {
            return Err(McmError::TransferActive);
        }
        self.sink
            .install()
            .map_err(|e| TransferError::Sink(format!("{:?}", e)))?;
        info!("Firmware installed");
        Ok(())
    }
}
