//! Backend traits
//!
//! A transport opens device nodes; a device is one open node that accepts
//! the spidev requests. The Linux backend talks to the kernel, the dummy
//! backend emulates it in memory.

use core::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::transfer::Segment;

/// The six setup-time spidev requests, in the order setup issues them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigRequest {
    /// SPI_IOC_WR_MODE
    WriteMode,
    /// SPI_IOC_RD_MODE
    ReadMode,
    /// SPI_IOC_WR_BITS_PER_WORD
    WriteBitsPerWord,
    /// SPI_IOC_RD_BITS_PER_WORD
    ReadBitsPerWord,
    /// SPI_IOC_WR_MAX_SPEED_HZ
    WriteMaxSpeed,
    /// SPI_IOC_RD_MAX_SPEED_HZ
    ReadMaxSpeed,
}

impl ConfigRequest {
    /// All requests in setup order
    pub const SETUP_ORDER: [ConfigRequest; 6] = [
        ConfigRequest::WriteMode,
        ConfigRequest::ReadMode,
        ConfigRequest::WriteBitsPerWord,
        ConfigRequest::ReadBitsPerWord,
        ConfigRequest::WriteMaxSpeed,
        ConfigRequest::ReadMaxSpeed,
    ];

    /// Kernel name of the request
    pub const fn name(self) -> &'static str {
        match self {
            ConfigRequest::WriteMode => "SPI_IOC_WR_MODE",
            ConfigRequest::ReadMode => "SPI_IOC_RD_MODE",
            ConfigRequest::WriteBitsPerWord => "SPI_IOC_WR_BITS_PER_WORD",
            ConfigRequest::ReadBitsPerWord => "SPI_IOC_RD_BITS_PER_WORD",
            ConfigRequest::WriteMaxSpeed => "SPI_IOC_WR_MAX_SPEED_HZ",
            ConfigRequest::ReadMaxSpeed => "SPI_IOC_RD_MAX_SPEED_HZ",
        }
    }
}

impl fmt::Display for ConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opens spidev nodes
pub trait SpiTransport {
    /// Handle to one open node. Dropping it closes the node.
    type Device: SpiDevice;

    /// Open `path` for reading and writing
    fn open(&mut self, path: &Path) -> io::Result<Self::Device>;
}

/// One open spidev node
///
/// Every method maps to exactly one ioctl request.
pub trait SpiDevice {
    /// Underlying file descriptor
    fn raw_fd(&self) -> RawFd;

    /// SPI_IOC_WR_MODE
    fn write_mode(&mut self, mode: u8) -> io::Result<()>;

    /// SPI_IOC_RD_MODE
    fn read_mode(&mut self) -> io::Result<u8>;

    /// SPI_IOC_WR_BITS_PER_WORD
    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()>;

    /// SPI_IOC_RD_BITS_PER_WORD
    fn read_bits_per_word(&mut self) -> io::Result<u8>;

    /// SPI_IOC_WR_MAX_SPEED_HZ
    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;

    /// SPI_IOC_RD_MAX_SPEED_HZ
    fn read_max_speed_hz(&mut self) -> io::Result<u32>;

    /// SPI_IOC_MESSAGE(n) with `segments.len()` records
    ///
    /// Returns the kernel's (non-negative) result, the number of bytes
    /// transferred.
    fn message(&mut self, segments: &mut [Segment<'_>]) -> io::Result<usize>;

    /// Largest number of bytes one message may carry, if known
    fn max_transfer_len(&self) -> Option<usize> {
        None
    }
}
