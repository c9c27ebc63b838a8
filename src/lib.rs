//! Host-side driver for LoRaWAN/Sidewalk MCM connectivity modules.
//!
//! Covers the serial command/response/notification protocol, the command
//! catalog, GetEvent decoding, segmented firmware download status, and the
//! YMODEM-style block transfer used to pull firmware images off the module.
//!
//! # Features
//!
//! - `uart-esp32` - UART transport for ESP32 using esp-idf-svc
//! - `serial` - Serial port transport for desktop using serialport crate
//!
//! # Example
//!
//! ```ignore
//! use mcm_rover::{
//!     EngineConfig, EngineEvent, McmEngine, MemorySink, MonotonicClock, SerialTransport,
//! };
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0")?;
//! let clock = MonotonicClock::new();
//! let mut mcm = McmEngine::new(transport, clock, MemorySink::new(), EngineConfig::default());
//!
//! println!("modem firmware {}", mcm.get_version()?.modem_firmware);
//! loop {
//!     for event in mcm.poll()? {
//!         if let EngineEvent::Notification { .. } = event {
//!             for e in mcm.drain_events()? {
//!                 println!("{:?}", e);
//!             }
//!         }
//!     }
//! }
//! ```

pub mod checksum;
pub mod command;
pub mod frame;
pub mod response;
pub mod segment;
pub mod ymodem;

mod clock;
mod config;
mod engine;
mod error;
mod sink;
mod transport;
mod types;

#[cfg(feature = "uart-esp32")]
mod uart;

#[cfg(feature = "serial")]
mod serial;

// Re-exports
pub use clock::{Clock, MonotonicClock};
pub use command::Command;
pub use config::EngineConfig;
pub use engine::{EngineEvent, FirmwareUpdate, McmEngine};
pub use error::{CommandError, FrameError, McmError, TransferError};
pub use response::{Downlink, DownlinkTag, Event, EventData, Response, ResponsePayload, VersionInfo};
pub use segment::{BinaryType, SegmentedFileStatus};
pub use sink::{FirmwareSink, MemorySink, MemorySinkError};
pub use transport::McmTransport;
pub use types::{
    CommandCategory, CommandCode, ConnectionMode, CssProfile, DownlinkFilter, Eui, EventCode,
    FirmwareVersion, LoRaWanClass, ResultCode, SidewalkLink, TxStatus, UplinkType, WideVersion,
};
pub use ymodem::TransferState;

#[cfg(feature = "uart-esp32")]
pub use uart::UartTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Version of this protocol library
pub const LIBRARY_VERSION: FirmwareVersion = FirmwareVersion::new(0, 2, 0);

pub fn library_version() -> FirmwareVersion {
    LIBRARY_VERSION
}
