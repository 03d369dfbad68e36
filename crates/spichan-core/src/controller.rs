//! The SPI channel controller
//!
//! `SpiChannels` owns one open device per channel together with the speed
//! and mode it was configured with. Setting up a channel opens its node,
//! runs the six configuration requests and only then installs the new
//! handle, closing whatever handle the channel held before.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::channel::{Channel, CHANNEL_COUNT};
use crate::config::SpiChannelsConfig;
use crate::error::{Result, SpiError};
use crate::mode::{ModeFlags, SpiMode};
use crate::transfer::{build_segments, SegmentParams, TransferLayout, BITS_PER_WORD};
use crate::transport::{ConfigRequest, SpiDevice, SpiTransport};

/// State of a configured channel
struct ChannelSlot<D> {
    device: D,
    speed_hz: u32,
    mode: SpiMode,
}

/// Controller for the two SPI channels
///
/// # Example
///
/// ```ignore
/// use spichan_core::{SpiChannels, SpiMode};
///
/// let mut spi = SpiChannels::new(transport);
/// spi.setup(0, 1_000_000, SpiMode::Mode0)?;
///
/// let mut buf = [0x9F, 0x00, 0x00, 0x00];
/// spi.transfer(0, &mut buf)?;
/// // buf now holds the bytes clocked in from the device
/// ```
pub struct SpiChannels<T: SpiTransport> {
    transport: T,
    config: SpiChannelsConfig,
    slots: [Option<ChannelSlot<T::Device>>; CHANNEL_COUNT],
}

impl<T: SpiTransport> SpiChannels<T> {
    /// Create a controller with the default device paths
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SpiChannelsConfig::default())
    }

    /// Create a controller with an explicit configuration
    pub fn with_config(transport: T, config: SpiChannelsConfig) -> Self {
        Self {
            transport,
            config,
            slots: [None, None],
        }
    }

    /// Open and configure a channel, returning its file descriptor
    ///
    /// If any step fails the newly opened node is closed again and the
    /// channel keeps whatever state it had before.
    pub fn setup(
        &mut self,
        channel: impl Into<Channel>,
        speed_hz: u32,
        mode: SpiMode,
    ) -> Result<RawFd> {
        let channel = channel.into();
        if speed_hz == 0 {
            return Err(SpiError::InvalidSpeed(speed_hz));
        }

        let path = self.config.devices[channel.index()].clone();
        log::debug!("spichan: Opening {} for {}", path.display(), channel);

        let mut device = self
            .transport
            .open(&path)
            .map_err(|source| SpiError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        configure(&mut device, &path, speed_hz, mode)?;

        let fd = device.raw_fd();
        let previous = self.slots[channel.index()].replace(ChannelSlot {
            device,
            speed_hz,
            mode,
        });
        if let Some(previous) = previous {
            log::debug!(
                "spichan: Closing previous descriptor {} of {}",
                previous.device.raw_fd(),
                channel
            );
        }

        log::info!(
            "spichan: {} ready on {} (fd={}, mode={}, speed={} kHz)",
            channel,
            path.display(),
            fd,
            mode.number(),
            speed_hz / 1000
        );

        Ok(fd)
    }

    /// File descriptor currently held by a channel
    pub fn descriptor(&self, channel: impl Into<Channel>) -> Option<RawFd> {
        self.slot(channel.into()).map(|slot| slot.device.raw_fd())
    }

    /// Full-duplex transfer
    ///
    /// Every byte of `buf` is sent and then overwritten with the byte
    /// received in the same position. Returns the kernel's result, the
    /// number of bytes transferred.
    pub fn transfer(&mut self, channel: impl Into<Channel>, buf: &mut [u8]) -> Result<usize> {
        let channel = channel.into();
        let layout = self.config.layout;
        let delay_usecs = self.config.delay_usecs;

        let slot = self.slots[channel.index()]
            .as_mut()
            .ok_or(SpiError::NotConfigured(channel))?;

        let params = SegmentParams {
            speed_hz: slot.speed_hz,
            delay_usecs,
            bits_per_word: BITS_PER_WORD,
        };
        let mut segments = build_segments(buf, layout, params)?;

        log::trace!(
            "spichan: {} transfer of {} segment(s) at {} Hz",
            channel,
            segments.len(),
            params.speed_hz
        );

        slot.device
            .message(&mut segments)
            .map_err(|source| SpiError::TransferFailed { channel, source })
    }

    /// Close a channel's device, returning it to the unconfigured state
    ///
    /// Returns whether the channel had an open device.
    pub fn release(&mut self, channel: impl Into<Channel>) -> bool {
        let channel = channel.into();
        match self.slots[channel.index()].take() {
            Some(slot) => {
                log::debug!(
                    "spichan: Releasing {} (fd={})",
                    channel,
                    slot.device.raw_fd()
                );
                true
            }
            None => false,
        }
    }

    /// Whether a channel has been set up
    pub fn is_configured(&self, channel: impl Into<Channel>) -> bool {
        self.slot(channel.into()).is_some()
    }

    /// Clock speed recorded for a channel
    pub fn speed_hz(&self, channel: impl Into<Channel>) -> Option<u32> {
        self.slot(channel.into()).map(|slot| slot.speed_hz)
    }

    /// SPI mode recorded for a channel
    pub fn mode(&self, channel: impl Into<Channel>) -> Option<SpiMode> {
        self.slot(channel.into()).map(|slot| slot.mode)
    }

    /// Device node a channel opens
    pub fn path(&self, channel: impl Into<Channel>) -> &Path {
        self.config.device(channel)
    }

    /// Largest transfer the channel's device accepts, if the backend knows
    pub fn max_transfer_len(&self, channel: impl Into<Channel>) -> Option<usize> {
        self.slot(channel.into())
            .and_then(|slot| slot.device.max_transfer_len())
    }

    /// Current transfer layout
    pub fn layout(&self) -> TransferLayout {
        self.config.layout
    }

    /// Switch the transfer layout used by both channels
    pub fn set_layout(&mut self, layout: TransferLayout) {
        self.config.layout = layout;
    }

    /// Delay after each segment in microseconds
    pub fn delay_usecs(&self) -> u16 {
        self.config.delay_usecs
    }

    /// Controller configuration
    pub fn config(&self) -> &SpiChannelsConfig {
        &self.config
    }

    /// The transport used to open devices
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The open device behind a channel
    pub fn device(&self, channel: impl Into<Channel>) -> Option<&T::Device> {
        self.slot(channel.into()).map(|slot| &slot.device)
    }

    /// Mutable access to the open device behind a channel
    pub fn device_mut(&mut self, channel: impl Into<Channel>) -> Option<&mut T::Device> {
        self.slots[channel.into().index()]
            .as_mut()
            .map(|slot| &mut slot.device)
    }

    /// Release both channels and hand back the transport
    pub fn into_transport(self) -> T {
        let Self {
            transport, slots, ..
        } = self;
        drop(slots);
        transport
    }

    fn slot(&self, channel: Channel) -> Option<&ChannelSlot<T::Device>> {
        self.slots[channel.index()].as_ref()
    }
}

/// Run the six configuration requests in order
///
/// Each write is followed by a read-back. A read-back that disagrees with
/// what was written is logged, not treated as a failure.
fn configure<D: SpiDevice>(
    device: &mut D,
    path: &Path,
    speed_hz: u32,
    mode: SpiMode,
) -> Result<()> {
    let failed = |request: ConfigRequest| {
        move |source: io::Error| SpiError::ConfigFailed {
            request,
            path: path.to_path_buf(),
            source,
        }
    };

    let mode_bits = mode.flags().bits();
    device
        .write_mode(mode_bits)
        .map_err(failed(ConfigRequest::WriteMode))?;
    let read_mode = device
        .read_mode()
        .map_err(failed(ConfigRequest::ReadMode))?;
    if SpiMode::from_flags(ModeFlags::from_bits_retain(read_mode)) != mode {
        log::warn!(
            "spichan: {} reports mode {:#04x} after setting {:#04x}",
            path.display(),
            read_mode,
            mode_bits
        );
    }

    device
        .write_bits_per_word(BITS_PER_WORD)
        .map_err(failed(ConfigRequest::WriteBitsPerWord))?;
    let read_bits = device
        .read_bits_per_word()
        .map_err(failed(ConfigRequest::ReadBitsPerWord))?;
    // The kernel reports 0 for the default word size of 8
    if read_bits != BITS_PER_WORD && read_bits != 0 {
        log::warn!(
            "spichan: {} reports {} bits per word after setting {}",
            path.display(),
            read_bits,
            BITS_PER_WORD
        );
    }

    device
        .write_max_speed_hz(speed_hz)
        .map_err(failed(ConfigRequest::WriteMaxSpeed))?;
    let read_speed = device
        .read_max_speed_hz()
        .map_err(failed(ConfigRequest::ReadMaxSpeed))?;
    if read_speed != speed_hz {
        log::warn!(
            "spichan: {} reports {} Hz after setting {} Hz",
            path.display(),
            read_speed,
            speed_hz
        );
    }

    log::trace!(
        "spichan: {} configured (mode={:#04x}, bits={}, speed={} Hz)",
        path.display(),
        read_mode,
        read_bits,
        read_speed
    );

    Ok(())
}
