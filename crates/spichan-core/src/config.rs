//! Controller configuration

use std::path::{Path, PathBuf};

use crate::channel::{Channel, CHANNEL_COUNT};
use crate::error::{Result, SpiError};
use crate::transfer::TransferLayout;

/// Device node for channel 0
pub const DEFAULT_DEVICE_CH0: &str = "/dev/spidev0.0";
/// Device node for channel 1
pub const DEFAULT_DEVICE_CH1: &str = "/dev/spidev0.1";

/// Configuration for a [`SpiChannels`](crate::SpiChannels) controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiChannelsConfig {
    /// Device path per channel
    pub devices: [PathBuf; CHANNEL_COUNT],
    /// How transfers are split into segments
    pub layout: TransferLayout,
    /// Delay after each segment in microseconds
    pub delay_usecs: u16,
}

impl Default for SpiChannelsConfig {
    fn default() -> Self {
        Self {
            devices: [
                PathBuf::from(DEFAULT_DEVICE_CH0),
                PathBuf::from(DEFAULT_DEVICE_CH1),
            ],
            layout: TransferLayout::PerByte,
            delay_usecs: 0,
        }
    }
}

impl SpiChannelsConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` as the device node for `channel`
    pub fn with_device(mut self, channel: impl Into<Channel>, path: impl Into<PathBuf>) -> Self {
        self.devices[channel.into().index()] = path.into();
        self
    }

    /// Set the transfer layout
    pub fn with_layout(mut self, layout: TransferLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the delay applied after each segment
    pub fn with_delay_usecs(mut self, delay_usecs: u16) -> Self {
        self.delay_usecs = delay_usecs;
        self
    }

    /// Device path for `channel`
    pub fn device(&self, channel: impl Into<Channel>) -> &Path {
        &self.devices[channel.into().index()]
    }
}

/// Build a configuration from key/value pairs
///
/// Recognised keys:
///
/// - `dev0=/dev/spidevX.Y` - device node for channel 0
/// - `dev1=/dev/spidevX.Y` - device node for channel 1
/// - `layout=per-byte|bulk` - transfer layout (default: per-byte)
/// - `delay=N` - delay after each segment in microseconds (default: 0)
pub fn parse_options(options: &[(&str, &str)]) -> Result<SpiChannelsConfig> {
    let mut config = SpiChannelsConfig::default();

    for (key, value) in options {
        match *key {
            "dev0" | "dev1" => {
                if value.is_empty() {
                    return Err(SpiError::InvalidParameter(format!("Empty {} value", key)));
                }
                let channel = if *key == "dev0" { Channel::CH0 } else { Channel::CH1 };
                config.devices[channel.index()] = PathBuf::from(value);
            }
            "layout" => {
                config.layout = match *value {
                    "per-byte" | "perbyte" => TransferLayout::PerByte,
                    "bulk" => TransferLayout::Bulk,
                    _ => {
                        return Err(SpiError::InvalidParameter(format!(
                            "Invalid layout value: {} (expected per-byte or bulk)",
                            value
                        )))
                    }
                };
            }
            "delay" => {
                config.delay_usecs = value.parse().map_err(|_| {
                    SpiError::InvalidParameter(format!("Invalid delay value: {}", value))
                })?;
            }
            _ => {
                log::warn!("spichan: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}
