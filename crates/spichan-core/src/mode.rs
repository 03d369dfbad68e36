//! SPI clock modes and their kernel encoding

use bitflags::bitflags;

use crate::error::SpiError;

bitflags! {
    /// Mode bits understood by SPI_IOC_{RD,WR}_MODE
    ///
    /// Values match `include/uapi/linux/spi/spi.h`. Only the low byte is
    /// reachable through the 8-bit mode request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        /// Clock phase
        const CPHA      = 1 << 0;
        /// Clock polarity
        const CPOL      = 1 << 1;
        /// Chip select active high
        const CS_HIGH   = 1 << 2;
        /// Per-word bits-on-wire least significant first
        const LSB_FIRST = 1 << 3;
        /// SI/SO signals shared
        const THREE_WIRE = 1 << 4;
        /// Loopback mode
        const LOOP      = 1 << 5;
        /// One device per bus, no chip select
        const NO_CS     = 1 << 6;
        /// Slave pulls low to pause
        const READY     = 1 << 7;
    }
}

/// SPI clock polarity/phase mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Clock polarity bit
    pub const fn cpol(self) -> u8 {
        match self {
            SpiMode::Mode0 | SpiMode::Mode1 => 0,
            SpiMode::Mode2 | SpiMode::Mode3 => 1,
        }
    }

    /// Clock phase bit
    pub const fn cpha(self) -> u8 {
        match self {
            SpiMode::Mode0 | SpiMode::Mode2 => 0,
            SpiMode::Mode1 | SpiMode::Mode3 => 1,
        }
    }

    /// Mode number (0-3)
    pub const fn number(self) -> u8 {
        (self.cpol() << 1) | self.cpha()
    }

    /// Kernel encoding of this mode
    pub fn flags(self) -> ModeFlags {
        let mut flags = ModeFlags::empty();
        flags.set(ModeFlags::CPOL, self.cpol() == 1);
        flags.set(ModeFlags::CPHA, self.cpha() == 1);
        flags
    }

    /// Extract the clock mode from a kernel mode byte, ignoring other flags
    pub fn from_flags(flags: ModeFlags) -> Self {
        match (flags.contains(ModeFlags::CPOL), flags.contains(ModeFlags::CPHA)) {
            (false, false) => SpiMode::Mode0,
            (false, true) => SpiMode::Mode1,
            (true, false) => SpiMode::Mode2,
            (true, true) => SpiMode::Mode3,
        }
    }
}

impl TryFrom<i64> for SpiMode {
    type Error = SpiError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(SpiError::InvalidMode(other)),
        }
    }
}

impl TryFrom<i32> for SpiMode {
    type Error = SpiError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        SpiMode::try_from(i64::from(value))
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = SpiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SpiMode::try_from(i64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spi_mode() {
        assert_eq!(SpiMode::Mode0.cpol(), 0);
        assert_eq!(SpiMode::Mode0.cpha(), 0);
        assert_eq!(SpiMode::Mode1.cpol(), 0);
        assert_eq!(SpiMode::Mode1.cpha(), 1);
        assert_eq!(SpiMode::Mode2.cpol(), 1);
        assert_eq!(SpiMode::Mode2.cpha(), 0);
        assert_eq!(SpiMode::Mode3.cpol(), 1);
        assert_eq!(SpiMode::Mode3.cpha(), 1);
    }

    #[test]
    fn test_kernel_encoding_matches_mode_number() {
        for n in 0u8..4 {
            let mode = SpiMode::try_from(n).unwrap();
            assert_eq!(mode.number(), n);
            assert_eq!(mode.flags().bits(), n);
            assert_eq!(SpiMode::from_flags(mode.flags()), mode);
        }
    }

    #[test]
    fn test_from_flags_ignores_extra_bits() {
        let flags = ModeFlags::CPOL | ModeFlags::CS_HIGH | ModeFlags::LSB_FIRST;
        assert_eq!(SpiMode::from_flags(flags), SpiMode::Mode2);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(SpiMode::try_from(4u8), Err(SpiError::InvalidMode(4))));
        assert!(matches!(SpiMode::try_from(-1i32), Err(SpiError::InvalidMode(-1))));
        assert!(matches!(
            SpiMode::try_from(i64::MAX),
            Err(SpiError::InvalidMode(i64::MAX))
        ));
    }
}
