//! spichan - Userspace SPI channel control
//!
//! Open one of two SPI channels, configure its mode and clock speed, and run
//! full-duplex transfers through the Linux spidev ioctl interface.
//!
//! # Architecture
//!
//! - `spichan-core` holds the [`SpiChannels`] controller and the spidev data
//!   structures. It talks to hardware only through the [`SpiTransport`] and
//!   [`SpiDevice`] traits.
//! - `spichan-linux-spi` (feature `linux-spi`, on by default) implements
//!   those traits on `/dev/spidevX.Y`.
//! - `spichan-dummy` (feature `dummy`) emulates spidev in memory.
//!
//! # Example
//!
//! ```no_run
//! use spichan::{open_linux_spi, SpiMode};
//!
//! let mut spi = open_linux_spi(&[("layout", "per-byte")])?;
//! spi.setup(0, 500_000, SpiMode::Mode0)?;
//!
//! let mut buf = [0x01, 0x80, 0x00];
//! let n = spi.transfer(0, &mut buf)?;
//! println!("{} bytes exchanged, got {:02X?}", n, buf);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use spichan_core::*;

#[cfg(feature = "linux-spi")]
pub use spichan_linux_spi::{Spidev, SpidevDevice};

#[cfg(feature = "dummy")]
pub use spichan_dummy::{DummyDevice, DummyTransport, FdTracker, Responder, SegmentRecord};

/// Controller backed by real spidev nodes
#[cfg(feature = "linux-spi")]
pub type LinuxSpiChannels = SpiChannels<Spidev>;

/// Create a spidev-backed controller from key/value options
///
/// See [`parse_options`] for the accepted keys. No device is opened until
/// [`SpiChannels::setup`] is called.
#[cfg(feature = "linux-spi")]
pub fn open_linux_spi(options: &[(&str, &str)]) -> Result<LinuxSpiChannels> {
    let config = parse_options(options)?;
    log::debug!(
        "spichan: Using {} and {}",
        config.device(Channel::CH0).display(),
        config.device(Channel::CH1).display()
    );
    Ok(SpiChannels::with_config(Spidev::new(), config))
}
