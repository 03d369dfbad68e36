//! Error types for channel control
//!
//! Every failure is handed straight back to the caller. Kernel errors keep
//! their `std::io::Error` (and therefore their errno) as the source.

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::Channel;
use crate::transport::ConfigRequest;

/// Errors returned by [`SpiChannels`](crate::SpiChannels)
#[derive(Debug, Error)]
pub enum SpiError {
    /// The device node could not be opened
    #[error("Failed to open {}: {source}", .path.display())]
    OpenFailed {
        /// Node that was opened
        path: PathBuf,
        /// OS error from open(2)
        #[source]
        source: std::io::Error,
    },

    /// One of the setup-time ioctl requests failed
    #[error("{request} failed on {}: {source}", .path.display())]
    ConfigFailed {
        /// Request that failed
        request: ConfigRequest,
        /// Node the request was issued on
        path: PathBuf,
        /// OS error from ioctl(2)
        #[source]
        source: std::io::Error,
    },

    /// The batched SPI_IOC_MESSAGE request failed
    #[error("SPI transfer on {channel} failed: {source}")]
    TransferFailed {
        /// Channel the transfer ran on
        channel: Channel,
        /// OS error from ioctl(2)
        #[source]
        source: std::io::Error,
    },

    /// Transfer requested on a channel that was never set up
    #[error("{0} is not configured")]
    NotConfigured(Channel),

    /// More descriptors than one SPI_IOC_MESSAGE can carry
    #[error("Message needs {segments} transfer segments, at most {max} fit in one request")]
    MessageTooLong {
        /// Segments the buffer needs
        segments: usize,
        /// Segments one request can carry
        max: usize,
    },

    /// Buffer longer than one transfer segment can describe
    #[error("Transfer of {len} bytes exceeds the {max} byte segment limit")]
    SegmentTooLong {
        /// Bytes requested
        len: usize,
        /// Bytes one segment can carry
        max: usize,
    },

    /// SPI mode outside 0-3
    #[error("Invalid SPI mode: {0} (must be 0-3)")]
    InvalidMode(i64),

    /// Clock speed of zero
    #[error("Invalid SPI clock speed: {0} Hz")]
    InvalidSpeed(u32),

    /// Invalid option value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SpiError {
    /// The OS error code behind this failure, if the kernel produced one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SpiError::OpenFailed { source, .. }
            | SpiError::ConfigFailed { source, .. }
            | SpiError::TransferFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, SpiError>;

#[cfg(test)]
mod tests {
    use super::*;

    const ENOTTY: i32 = 25;

    #[test]
    fn test_raw_os_error_passthrough() {
        let err = SpiError::TransferFailed {
            channel: Channel::from(1),
            source: std::io::Error::from_raw_os_error(ENOTTY),
        };
        assert_eq!(err.raw_os_error(), Some(ENOTTY));
        assert_eq!(SpiError::InvalidMode(7).raw_os_error(), None);
    }

    #[test]
    fn test_display() {
        let err = SpiError::ConfigFailed {
            request: ConfigRequest::WriteMaxSpeed,
            path: PathBuf::from("/dev/spidev0.1"),
            source: std::io::Error::from_raw_os_error(22),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("SPI_IOC_WR_MAX_SPEED_HZ failed on /dev/spidev0.1"));
        assert_eq!(
            SpiError::NotConfigured(Channel::from(0)).to_string(),
            "channel 0 is not configured"
        );
    }
}
