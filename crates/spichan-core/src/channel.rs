//! Logical SPI channels
//!
//! Only two channels exist. Any integer can name a channel; everything
//! but the least-significant bit is discarded.

use core::fmt;

/// Number of channels a controller manages
pub const CHANNEL_COUNT: usize = 2;

/// A logical SPI channel (0 or 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Channel 0
    pub const CH0: Channel = Channel(0);
    /// Channel 1
    pub const CH1: Channel = Channel(1);
    /// Both channels in index order
    pub const ALL: [Channel; CHANNEL_COUNT] = [Channel::CH0, Channel::CH1];

    /// Fold an arbitrary integer onto a channel by keeping bit 0
    pub const fn fold(raw: i64) -> Self {
        Channel((raw & 1) as u8)
    }

    /// Slot index into per-channel tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Channel number (0 or 1)
    pub const fn number(self) -> u8 {
        self.0
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Channel {
                fn from(raw: $ty) -> Self {
                    Channel::fold(raw as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}
