//! ESP32 UART transport using esp-idf-svc

use crate::transport::McmTransport;
use esp_idf_svc::hal::gpio::{self, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::{self, UartDriver};
use esp_idf_svc::hal::units::Hertz;

use crate::frame::MAX_RESPONSE_FRAME_LEN;
use crate::ymodem::DATA_BLOCK_LEN;

/// Factory baud rate of the module's host UART
pub const MCM_BAUD_RATE: u32 = 9600;

/// Room for a full transfer packet plus a trailing notification
const RX_FIFO_LEN: usize = 2 * (DATA_BLOCK_LEN + MAX_RESPONSE_FRAME_LEN);

pub struct UartTransport<'a> {
    uart: UartDriver<'a>,
}

impl<'a> UartTransport<'a> {
    pub fn new(
        uart: impl Peripheral<P = impl uart::Uart> + 'a,
        tx: impl Peripheral<P = impl OutputPin> + 'a,
        rx: impl Peripheral<P = impl InputPin> + 'a,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        Self::with_baud_rate(uart, tx, rx, MCM_BAUD_RATE)
    }

    pub fn with_baud_rate(
        uart: impl Peripheral<P = impl uart::Uart> + 'a,
        tx: impl Peripheral<P = impl OutputPin> + 'a,
        rx: impl Peripheral<P = impl InputPin> + 'a,
        baud_rate: u32,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let config = uart::config::Config::default()
            .baudrate(Hertz(baud_rate))
            .data_bits(uart::config::DataBits::DataBits8)
            .parity_none()
            .stop_bits(uart::config::StopBits::STOP1)
            .rx_fifo_size(RX_FIFO_LEN);
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<gpio::Gpio0>::None,
            Option::<gpio::Gpio0>::None,
            &config,
        )?;
        uart.clear_rx()?;

        Ok(Self { uart })
    }
}

impl McmTransport for UartTransport<'_> {
    type Error = esp_idf_svc::sys::EspError;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let written = self.uart.write(data)?;
        self.uart.wait_tx_done(esp_idf_svc::hal::delay::BLOCK)?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        let ticks = esp_idf_svc::hal::delay::TickType::new_millis(timeout_ms as u64).ticks();
        self.uart.read(buf, ticks)
    }

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.uart.clear_rx()
    }
}
