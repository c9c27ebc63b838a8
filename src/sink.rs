//! Destination for firmware images received over the block transfer

use thiserror::Error;

/// Persists a received firmware image and later installs it.
/// Implement this for flash partitions, files, or anything else that can hold an image.
pub trait FirmwareSink {
    /// Error type for sink operations
    type Error: std::fmt::Debug;

    /// Prepare to receive `size` bytes for `file_name`
    fn open(&mut self, file_name: &str, size: u64) -> Result<(), Self::Error>;

    /// Append the next chunk of the image
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Close the image after the last chunk
    fn finish(&mut self) -> Result<(), Self::Error>;

    /// Activate a finished image
    fn install(&mut self) -> Result<(), Self::Error>;

    /// Discard a partially received image after the transfer was abandoned
    fn abort(&mut self) {}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemorySinkError {
    #[error("no image is open")]
    NotOpen,
    #[error("image exceeds declared size of {declared} bytes")]
    Overflow { declared: u64 },
    #[error("image is not finished")]
    NotFinished,
}

/// Upper bound on the buffer reserved up front; the image grows past it as blocks arrive
const PREALLOC_LIMIT: u64 = 64 * 1024;

/// Keeps the image in RAM
#[derive(Debug, Default)]
pub struct MemorySink {
    image: Vec<u8>,
    file_name: Option<String>,
    declared_size: u64,
    open: bool,
    finished: bool,
    installed: bool,
    finish_calls: usize,
    abort_calls: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls
    }
}

impl FirmwareSink for MemorySink {
    type Error = MemorySinkError;

    fn open(&mut self, file_name: &str, size: u64) -> Result<(), Self::Error> {
        self.image = Vec::with_capacity(size.min(PREALLOC_LIMIT) as usize);
        self.file_name = Some(file_name.to_string());
        self.declared_size = size;
        self.open = true;
        self.finished = false;
        self.installed = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if !self.open {
            return Err(MemorySinkError::NotOpen);
        }
        if (self.image.len() + data.len()) as u64 > self.declared_size {
            return Err(MemorySinkError::Overflow { declared: self.declared_size });
        }
        self.image.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        self.finish_calls += 1;
        if !self.open {
            return Err(MemorySinkError::NotOpen);
        }
        self.open = false;
        self.finished = true;
        Ok(())
    }

    fn install(&mut self) -> Result<(), Self::Error> {
        if !self.finished {
            return Err(MemorySinkError::NotFinished);
        }
        self.installed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.abort_calls += 1;
        self.open = false;
        self.image.clear();
    }
}
