//! Desktop serial-port transport using the serialport crate

use crate::transport::McmTransport;
use std::io::ErrorKind;
use std::time::Duration;

/// Factory baud rate of the module's host UART
pub const MCM_BAUD_RATE: u32 = 9600;

pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at the module's default 9600 8N1
    pub fn open(port_name: &str) -> Result<Self, serialport::Error> {
        Self::new(port_name, MCM_BAUD_RATE)
    }

    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;

        Ok(Self { port })
    }
}

impl McmTransport for SerialTransport {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let written = std::io::Write::write(&mut self.port, data)?;
        std::io::Write::flush(&mut self.port)?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms as u64))
            .map_err(std::io::Error::other)?;
        match std::io::Read::read(&mut self.port, buf) {
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        assert!(SerialTransport::open("/dev/does-not-exist-mcm").is_err());
    }
}
