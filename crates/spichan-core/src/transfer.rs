//! Transfer descriptors for SPI_IOC_MESSAGE
//!
//! A full-duplex exchange is described to the kernel as an array of
//! `struct spi_ioc_transfer` records. Each record here borrows the bytes it
//! points at, so the array cannot outlive the caller's buffer.

use core::marker::PhantomData;
use core::mem::size_of;

use crate::error::{Result, SpiError};

/// Word size used for every transfer
pub const BITS_PER_WORD: u8 = 8;

/// Width of the size field in an ioctl request code
#[cfg(any(
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "sparc",
    target_arch = "sparc64"
))]
const IOC_SIZEBITS: u32 = 13;
#[cfg(not(any(
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "sparc",
    target_arch = "sparc64"
)))]
const IOC_SIZEBITS: u32 = 14;

/// Size of `struct spi_ioc_transfer`
pub const SEGMENT_SIZE: usize = size_of::<Segment<'static>>();

/// Most segments a single SPI_IOC_MESSAGE(n) request can encode
pub const MAX_SEGMENTS: usize = ((1usize << IOC_SIZEBITS) - 1) / SEGMENT_SIZE;

/// Longest buffer a single segment can describe (`len` is a u32)
pub const MAX_SEGMENT_LEN: usize = u32::MAX as usize;

/// How a buffer is split into transfer segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransferLayout {
    /// One single-byte segment per buffer byte. The shared delay is applied
    /// after every byte.
    #[default]
    PerByte,
    /// One segment covering the whole buffer
    Bulk,
}

impl TransferLayout {
    /// Number of segments a buffer of `len` bytes is split into
    pub const fn segment_count(self, len: usize) -> usize {
        match self {
            TransferLayout::PerByte => len,
            TransferLayout::Bulk => {
                if len == 0 {
                    0
                } else {
                    1
                }
            }
        }
    }

    /// Check that a buffer of `len` bytes fits in one SPI_IOC_MESSAGE request
    ///
    /// Returns the number of segments it needs.
    pub fn check_len(self, len: usize) -> Result<usize> {
        if self == TransferLayout::Bulk && len > MAX_SEGMENT_LEN {
            return Err(SpiError::SegmentTooLong {
                len,
                max: MAX_SEGMENT_LEN,
            });
        }
        let count = self.segment_count(len);
        if count > MAX_SEGMENTS {
            return Err(SpiError::MessageTooLong {
                segments: count,
                max: MAX_SEGMENTS,
            });
        }
        Ok(count)
    }
}

/// Parameters stamped into every segment of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentParams {
    /// Clock speed in Hz
    pub speed_hz: u32,
    /// Delay after the segment in microseconds
    pub delay_usecs: u16,
    /// Bits per word
    pub bits_per_word: u8,
}

/// One `struct spi_ioc_transfer` record
///
/// This must match the kernel's layout byte for byte (32 bytes on every
/// architecture, pointers are always carried as u64).
#[repr(C)]
#[derive(Debug, PartialEq, Eq)]
pub struct Segment<'a> {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
    _buf: PhantomData<&'a mut [u8]>,
}

impl<'a> Segment<'a> {
    /// Full-duplex segment: transmit from `buf` and receive into it in place
    ///
    /// Fails with [`SpiError::SegmentTooLong`] when `buf` is longer than
    /// [`MAX_SEGMENT_LEN`].
    pub fn duplex(buf: &'a mut [u8], params: SegmentParams) -> Result<Self> {
        let len = u32::try_from(buf.len()).map_err(|_| SpiError::SegmentTooLong {
            len: buf.len(),
            max: MAX_SEGMENT_LEN,
        })?;
        let ptr = buf.as_mut_ptr() as u64;
        Ok(Self {
            tx_buf: ptr,
            rx_buf: ptr,
            len,
            speed_hz: params.speed_hz,
            delay_usecs: params.delay_usecs,
            bits_per_word: params.bits_per_word,
            cs_change: 0,
            tx_nbits: 0,
            rx_nbits: 0,
            word_delay_usecs: 0,
            _pad: 0,
            _buf: PhantomData,
        })
    }

    /// Transmit buffer address
    pub fn tx_buf(&self) -> u64 {
        self.tx_buf
    }

    /// Receive buffer address
    pub fn rx_buf(&self) -> u64 {
        self.rx_buf
    }

    /// Number of bytes in this segment
    pub fn len(&self) -> u32 {
        self.len
    }

    /// True for a zero-length segment
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clock speed override in Hz
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Delay after this segment in microseconds
    pub fn delay_usecs(&self) -> u16 {
        self.delay_usecs
    }

    /// Word size override
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Chip-select change flag
    pub fn cs_change(&self) -> u8 {
        self.cs_change
    }

    /// The bytes this segment exchanges
    ///
    /// Holds the outgoing data before the transfer and the incoming data
    /// after it.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: tx_buf/rx_buf were taken from a `&'a mut [u8]` of `len`
        // bytes in `duplex`, and that borrow is held for 'a by `_buf`.
        unsafe { core::slice::from_raw_parts_mut(self.rx_buf as *mut u8, self.len as usize) }
    }
}

/// Split `buf` into full-duplex segments according to `layout`
///
/// An empty buffer produces no segments in either layout. A buffer that
/// does not fit in one request is rejected before any segment is built.
pub fn build_segments(
    buf: &mut [u8],
    layout: TransferLayout,
    params: SegmentParams,
) -> Result<Vec<Segment<'_>>> {
    layout.check_len(buf.len())?;
    if buf.is_empty() {
        return Ok(Vec::new());
    }

    match layout {
        TransferLayout::PerByte => buf
            .iter_mut()
            .map(|byte| Segment::duplex(core::slice::from_mut(byte), params))
            .collect(),
        TransferLayout::Bulk => Ok(vec![Segment::duplex(buf, params)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: SegmentParams = SegmentParams {
        speed_hz: 500_000,
        delay_usecs: 0,
        bits_per_word: BITS_PER_WORD,
    };

    #[test]
    fn test_segment_matches_kernel_layout() {
        assert_eq!(SEGMENT_SIZE, 32);
    }

    #[test]
    fn test_max_segments() {
        #[cfg(not(any(
            target_arch = "powerpc",
            target_arch = "powerpc64",
            target_arch = "mips",
            target_arch = "mips64",
            target_arch = "sparc",
            target_arch = "sparc64"
        )))]
        assert_eq!(MAX_SEGMENTS, 511);
        assert!(MAX_SEGMENTS * SEGMENT_SIZE < (1 << IOC_SIZEBITS));
    }

    #[test]
    fn test_per_byte_layout() {
        let mut buf = [0x10, 0x20, 0x30, 0x40];
        let base = buf.as_ptr() as u64;
        let segments = build_segments(&mut buf, TransferLayout::PerByte, PARAMS).unwrap();

        assert_eq!(segments.len(), 4);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.len(), 1);
            assert_eq!(seg.tx_buf(), base + i as u64);
            assert_eq!(seg.rx_buf(), seg.tx_buf());
            assert_eq!(seg.speed_hz(), 500_000);
            assert_eq!(seg.bits_per_word(), 8);
            assert_eq!(seg.delay_usecs(), 0);
            assert_eq!(seg.cs_change(), 0);
        }
    }

    #[test]
    fn test_bulk_layout() {
        let mut buf = [0u8; 64];
        let base = buf.as_ptr() as u64;
        let params = SegmentParams {
            delay_usecs: 10,
            ..PARAMS
        };
        let segments = build_segments(&mut buf, TransferLayout::Bulk, params).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 64);
        assert_eq!(segments[0].tx_buf(), base);
        assert_eq!(segments[0].rx_buf(), base);
        assert_eq!(segments[0].delay_usecs(), 10);
    }

    #[test]
    fn test_empty_buffer_has_no_segments() {
        let mut buf: [u8; 0] = [];
        assert!(build_segments(&mut buf, TransferLayout::PerByte, PARAMS)
            .unwrap()
            .is_empty());
        assert!(build_segments(&mut buf, TransferLayout::Bulk, PARAMS)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(TransferLayout::PerByte.segment_count(0), 0);
        assert_eq!(TransferLayout::PerByte.segment_count(17), 17);
        assert_eq!(TransferLayout::Bulk.segment_count(0), 0);
        assert_eq!(TransferLayout::Bulk.segment_count(4096), 1);
    }

    #[test]
    fn test_check_len_limits() {
        assert_eq!(TransferLayout::PerByte.check_len(MAX_SEGMENTS).unwrap(), MAX_SEGMENTS);
        assert!(matches!(
            TransferLayout::PerByte.check_len(MAX_SEGMENTS + 1),
            Err(SpiError::MessageTooLong { segments, .. }) if segments == MAX_SEGMENTS + 1
        ));
        assert_eq!(TransferLayout::Bulk.check_len(MAX_SEGMENT_LEN).unwrap(), 1);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_bulk_len_must_fit_u32() {
        let len = MAX_SEGMENT_LEN + 2;
        assert!(matches!(
            TransferLayout::Bulk.check_len(len),
            Err(SpiError::SegmentTooLong { len: l, max }) if l == len && max == MAX_SEGMENT_LEN
        ));
    }

    #[test]
    fn test_data_mut_writes_through() {
        let mut buf = [1u8, 2, 3];
        {
            let mut segments = build_segments(&mut buf, TransferLayout::PerByte, PARAMS).unwrap();
            for seg in segments.iter_mut() {
                let data = seg.data_mut();
                data[0] = !data[0];
            }
        }
        assert_eq!(buf, [0xFE, 0xFD, 0xFC]);
    }
}
