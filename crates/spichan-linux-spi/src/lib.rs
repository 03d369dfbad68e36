//! spichan-linux-spi - Linux spidev backend
//!
//! This crate provides the [`Spidev`] transport, which drives SPI
//! controllers through the `/dev/spidevX.Y` device interface.
//!
//! # Overview
//!
//! The Linux SPI driver exposes SPI controllers through character devices
//! at `/dev/spidevX.Y` where X is the bus number and Y is the chip select.
//! Mode, word size and clock speed are set with dedicated ioctl requests;
//! data moves through `SPI_IOC_MESSAGE(n)`, which takes an array of `n`
//! transfer descriptors.
//!
//! # Example
//!
//! ```no_run
//! use spichan_core::{SpiChannels, SpiMode};
//! use spichan_linux_spi::Spidev;
//!
//! let mut spi = SpiChannels::new(Spidev::new());
//! let fd = spi.setup(0, 1_000_000, SpiMode::Mode0)?;
//! println!("channel 0 open as fd {}", fd);
//!
//! let mut buf = [0x9F, 0x00, 0x00, 0x00];
//! spi.transfer(0, &mut buf)?;
//! println!("received {:02X?}", &buf[1..]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - May require adding user to `spi` group or using udev rules

pub mod device;

// Re-exports
pub use device::{Spidev, SpidevDevice};
