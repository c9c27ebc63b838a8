/// Byte pipe to the MCM module.
/// Implement this trait for each serial backend (ESP32 UART, desktop serial port, test doubles).
pub trait McmTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Write bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read whatever arrives within `timeout_ms`; `Ok(0)` when nothing did
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Drop stale bytes still sitting in the receive buffer
    fn clear_input(&mut self) -> Result<(), Self::Error>;
}
