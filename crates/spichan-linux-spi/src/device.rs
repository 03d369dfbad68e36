//! Linux spidev backend
//!
//! `Spidev` opens `/dev/spidevX.Y` nodes; `SpidevDevice` issues the spidev
//! ioctl requests on one of them.

use spichan_core::{Segment, SpiDevice, SpiTransport, SEGMENT_SIZE};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// spidev module parameter holding the per-message byte limit
const BUFSIZ_PARAM: &str = "/sys/module/spidev/parameters/bufsiz";

/// spidev's built-in `bufsiz`, used when neither sysfs nor sysconf answers
const DEFAULT_BUFSIZ: usize = 4096;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_read;
    use nix::ioctl_write_ptr;
    use nix::sys::ioctl::ioctl_num_type;

    // SPI ioctl magic number
    pub const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_MESSAGE: u8 = 0;
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    // Generate ioctl functions
    ioctl_read!(spi_ioc_rd_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_read!(
        spi_ioc_rd_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Request code for SPI_IOC_MESSAGE(n)
    ///
    /// `_IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])`.
    /// Callers keep `n` within `MAX_SEGMENTS` so the size fits the field.
    pub fn spi_ioc_message(n: usize) -> ioctl_num_type {
        nix::request_code_write!(
            SPI_IOC_MAGIC,
            SPI_IOC_TYPE_MESSAGE,
            n * super::SEGMENT_SIZE
        )
    }
}

/// Convert a nix error into the io::Error the core crate expects
fn os_error(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Opens spidev character devices
#[derive(Debug, Default, Clone, Copy)]
pub struct Spidev;

impl Spidev {
    /// Create a new spidev transport
    pub fn new() -> Self {
        Self
    }
}

impl SpiTransport for Spidev {
    type Device = SpidevDevice;

    fn open(&mut self, path: &Path) -> io::Result<SpidevDevice> {
        SpidevDevice::open(path)
    }
}

/// One open spidev node
///
/// The node is closed when this value is dropped.
#[derive(Debug)]
pub struct SpidevDevice {
    /// File handle for spidev device
    file: File,
    /// Node path, for log messages
    path: PathBuf,
    /// spidev per-message byte limit
    bufsiz: usize,
}

impl SpidevDevice {
    /// Open a spidev node for reading and writing
    pub fn open(path: &Path) -> io::Result<Self> {
        log::debug!("linux_spi: Opening device {}", path.display());

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let bufsiz = kernel_bufsiz();
        log::debug!(
            "linux_spi: Opened {} (fd={}, bufsiz {})",
            path.display(),
            file.as_raw_fd(),
            bufsiz
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            bufsiz,
        })
    }

    /// Path this device was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for SpidevDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl SpiDevice for SpidevDevice {
    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn write_mode(&mut self, mode: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_mode(self.raw_fd(), &mode) }.map_err(os_error)?;
        log::trace!("linux_spi: {} mode <- {:#04x}", self.path.display(), mode);
        Ok(())
    }

    fn read_mode(&mut self) -> io::Result<u8> {
        let mut mode = 0u8;
        unsafe { ioctl::spi_ioc_rd_mode(self.raw_fd(), &mut mode) }.map_err(os_error)?;
        Ok(mode)
    }

    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_bits_per_word(self.raw_fd(), &bits) }.map_err(os_error)?;
        log::trace!("linux_spi: {} bits per word <- {}", self.path.display(), bits);
        Ok(())
    }

    fn read_bits_per_word(&mut self) -> io::Result<u8> {
        let mut bits = 0u8;
        unsafe { ioctl::spi_ioc_rd_bits_per_word(self.raw_fd(), &mut bits) }
            .map_err(os_error)?;
        Ok(bits)
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(self.raw_fd(), &speed_hz) }
            .map_err(os_error)?;
        log::trace!("linux_spi: {} speed <- {} Hz", self.path.display(), speed_hz);
        Ok(())
    }

    fn read_max_speed_hz(&mut self) -> io::Result<u32> {
        let mut speed_hz = 0u32;
        unsafe { ioctl::spi_ioc_rd_max_speed_hz(self.raw_fd(), &mut speed_hz) }
            .map_err(os_error)?;
        Ok(speed_hz)
    }

    fn message(&mut self, segments: &mut [Segment<'_>]) -> io::Result<usize> {
        let request = ioctl::spi_ioc_message(segments.len());
        log::debug!(
            "linux_spi: SPI_IOC_MESSAGE({}) on {}",
            segments.len(),
            self.path.display()
        );

        // SAFETY: every segment points into a buffer borrowed for the
        // lifetime of `segments`, and the request size matches the slice.
        let ret = unsafe { libc::ioctl(self.raw_fd(), request, segments.as_mut_ptr()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(ret as usize)
    }

    fn max_transfer_len(&self) -> Option<usize> {
        Some(self.bufsiz)
    }
}

/// Parse the contents of the `bufsiz` parameter file
fn parse_bufsiz(content: &str) -> Option<usize> {
    content.trim().parse::<usize>().ok().filter(|&size| size > 0)
}

/// Page size, which is what spidev falls back to when `bufsiz` is unset
fn page_size() -> Option<usize> {
    // SAFETY: sysconf has no memory-safety preconditions
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(ret).ok().filter(|&size| size > 0)
}

/// Per-message byte limit the spidev driver enforces
fn kernel_bufsiz() -> usize {
    match std::fs::read_to_string(BUFSIZ_PARAM) {
        Ok(content) => match parse_bufsiz(&content) {
            Some(size) => {
                log::debug!("linux_spi: bufsiz is {} bytes", size);
                return size;
            }
            None => log::warn!(
                "linux_spi: Ignoring unparsable {}: {:?}",
                BUFSIZ_PARAM,
                content.trim()
            ),
        },
        Err(e) => log::debug!("linux_spi: {} unavailable ({})", BUFSIZ_PARAM, e),
    }

    match page_size() {
        Some(size) => {
            log::debug!("linux_spi: Assuming bufsiz of one page ({} bytes)", size);
            size
        }
        None => {
            log::warn!(
                "linux_spi: Page size unknown, assuming bufsiz of {} bytes",
                DEFAULT_BUFSIZ
            );
            DEFAULT_BUFSIZ
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm"))]
    #[test]
    fn test_spi_ioc_message_encoding() {
        assert_eq!(ioctl::spi_ioc_message(0) as u64, 0x4000_6b00);
        assert_eq!(ioctl::spi_ioc_message(1) as u64, 0x4020_6b00);
        assert_eq!(ioctl::spi_ioc_message(2) as u64, 0x4040_6b00);
        assert_eq!(ioctl::spi_ioc_message(511) as u64, 0x7fe0_6b00);
    }

    #[test]
    fn test_open_missing_node() {
        let err = SpidevDevice::open(Path::new("/dev/spidev-does-not-exist.9")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_ioctl_on_non_spi_node() {
        let mut dev = Spidev::new().open(Path::new("/dev/null")).unwrap();
        let err = dev.write_mode(0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
        let err = dev.read_max_speed_hz().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }

    #[test]
    fn test_kernel_bufsiz_is_positive() {
        let size = kernel_bufsiz();
        assert!(size > 0);
        assert_ne!(size, usize::MAX);
    }

    #[test]
    fn test_parse_bufsiz() {
        assert_eq!(parse_bufsiz("4096\n"), Some(4096));
        assert_eq!(parse_bufsiz(" 65536 "), Some(65536));
        assert_eq!(parse_bufsiz("0\n"), None);
        assert_eq!(parse_bufsiz("-1"), None);
        assert_eq!(parse_bufsiz("lots"), None);
    }

    #[test]
    fn test_page_size() {
        let size = page_size().unwrap();
        assert!(size.is_power_of_two());
    }
}
