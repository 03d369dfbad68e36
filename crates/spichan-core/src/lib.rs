//! spichan-core - SPI channel control over the spidev ioctl protocol
//!
//! This crate holds everything that does not depend on a particular
//! backend: channel folding, the SPI mode encoding, the
//! `struct spi_ioc_transfer` descriptor, and the [`SpiChannels`]
//! controller that sequences setup and transfer requests.
//!
//! Backends implement [`SpiTransport`] and [`SpiDevice`]. The
//! `spichan-linux-spi` crate provides the real `/dev/spidevX.Y` backend,
//! `spichan-dummy` an in-memory emulator for tests.
//!
//! # Channels
//!
//! A controller manages two channels. Any integer names a channel; only
//! bit 0 is kept, so `2` is channel 0 and `-1` is channel 1.
//!
//! # Transfers
//!
//! Transfers are full duplex and in place: each byte of the buffer is sent
//! and then replaced by the byte received at the same position. By default
//! every byte travels in its own single-byte segment
//! ([`TransferLayout::PerByte`]), so the configured delay is applied between
//! bytes. [`TransferLayout::Bulk`] sends the buffer as one segment instead.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod mode;
pub mod transfer;
pub mod transport;

pub use channel::{Channel, CHANNEL_COUNT};
pub use config::{parse_options, SpiChannelsConfig, DEFAULT_DEVICE_CH0, DEFAULT_DEVICE_CH1};
pub use controller::SpiChannels;
pub use error::{Result, SpiError};
pub use mode::{ModeFlags, SpiMode};
pub use transfer::{
    build_segments, Segment, SegmentParams, TransferLayout, BITS_PER_WORD, MAX_SEGMENTS,
    MAX_SEGMENT_LEN, SEGMENT_SIZE,
};
pub use transport::{ConfigRequest, SpiDevice, SpiTransport};
