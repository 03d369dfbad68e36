//! spichan-dummy - In-memory spidev emulator for testing
//!
//! This crate provides a transport that behaves like the kernel's spidev
//! driver without any hardware. Every request a device receives is
//! recorded, so tests can inspect exactly which ioctls were issued and
//! which transfer descriptors a message carried.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use spichan_core::{
    ConfigRequest, Segment, SpiDevice, SpiTransport, DEFAULT_DEVICE_CH0, DEFAULT_DEVICE_CH1,
};

/// First descriptor number handed out by the emulator
const FIRST_FD: RawFd = 100;

/// Default spidev `bufsiz` module parameter
const DEFAULT_MAX_TRANSFER_LEN: usize = 4096;

/// How the emulated peripheral answers each byte it receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Responder {
    /// MISO wired to MOSI: every byte comes back unchanged
    #[default]
    Loopback,
    /// Every byte comes back with all bits flipped
    Invert,
    /// Every byte is answered with the same value
    Fill(u8),
}

impl Responder {
    fn reply(self, tx: u8) -> u8 {
        match self {
            Responder::Loopback => tx,
            Responder::Invert => !tx,
            Responder::Fill(value) => value,
        }
    }
}

/// A transfer descriptor as the emulator saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Transmit buffer address
    pub tx_buf: u64,
    /// Receive buffer address
    pub rx_buf: u64,
    /// Segment length in bytes
    pub len: u32,
    /// Clock speed in Hz
    pub speed_hz: u32,
    /// Delay after the segment in microseconds
    pub delay_usecs: u16,
    /// Bits per word
    pub bits_per_word: u8,
    /// Chip-select change flag
    pub cs_change: u8,
    /// Bytes clocked out
    pub tx: Vec<u8>,
    /// Bytes clocked in
    pub rx: Vec<u8>,
}

/// Set of descriptors currently open, shared between a transport and its devices
type OpenSet = Arc<Mutex<BTreeSet<RawFd>>>;

fn lock(open: &OpenSet) -> std::sync::MutexGuard<'_, BTreeSet<RawFd>> {
    open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle on a transport's open descriptors that outlives the transport
#[derive(Debug, Clone)]
pub struct FdTracker(OpenSet);

impl FdTracker {
    /// Descriptors that are currently open, in ascending order
    pub fn fds(&self) -> Vec<RawFd> {
        lock(&self.0).iter().copied().collect()
    }
}

/// Values a device reports back instead of what was written
///
/// Real controllers may round the clock down or ignore mode bits they do
/// not support; these knobs reproduce that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Readback {
    mode: Option<u8>,
    bits_per_word: Option<u8>,
    speed_cap_hz: Option<u32>,
}

/// Emulated spidev transport
///
/// Only paths registered with [`with_node`](Self::with_node) (or the two
/// default nodes) can be opened.
#[derive(Debug)]
pub struct DummyTransport {
    nodes: BTreeSet<PathBuf>,
    responder: Responder,
    max_transfer_len: usize,
    open_errno: Option<i32>,
    request_failures: HashMap<ConfigRequest, i32>,
    next_fd: RawFd,
    readback: Readback,
    open: OpenSet,
    opened: Vec<PathBuf>,
}

impl Default for DummyTransport {
    fn default() -> Self {
        Self::empty()
            .with_node(DEFAULT_DEVICE_CH0)
            .with_node(DEFAULT_DEVICE_CH1)
    }
}

impl DummyTransport {
    /// Transport with both default nodes present
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport without any device nodes
    pub fn empty() -> Self {
        Self {
            nodes: BTreeSet::new(),
            responder: Responder::default(),
            max_transfer_len: DEFAULT_MAX_TRANSFER_LEN,
            open_errno: None,
            request_failures: HashMap::new(),
            next_fd: FIRST_FD,
            readback: Readback::default(),
            open: Arc::new(Mutex::new(BTreeSet::new())),
            opened: Vec::new(),
        }
    }

    /// Make `path` available as a device node
    pub fn with_node(mut self, path: impl Into<PathBuf>) -> Self {
        self.nodes.insert(path.into());
        self
    }

    /// Set how devices opened from now on answer transfers
    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = responder;
        self
    }

    /// Set the per-message byte limit of devices opened from now on
    pub fn with_max_transfer_len(mut self, len: usize) -> Self {
        self.max_transfer_len = len;
        self
    }

    /// Report `mode` on every SPI_IOC_RD_MODE
    pub fn with_mode_readback(mut self, mode: u8) -> Self {
        self.readback.mode = Some(mode);
        self
    }

    /// Report `bits` on every SPI_IOC_RD_BITS_PER_WORD
    pub fn with_bits_readback(mut self, bits: u8) -> Self {
        self.readback.bits_per_word = Some(bits);
        self
    }

    /// Clamp the reported maximum speed to `hz`
    pub fn with_speed_cap(mut self, hz: u32) -> Self {
        self.readback.speed_cap_hz = Some(hz);
        self
    }

    /// Remove a device node; later opens of `path` fail with ENOENT
    pub fn remove_node(&mut self, path: impl AsRef<Path>) {
        self.nodes.remove(path.as_ref());
    }

    /// Make every open fail with `errno` (e.g. EACCES)
    pub fn fail_open(&mut self, errno: i32) {
        self.open_errno = Some(errno);
    }

    /// Make `request` fail with `errno` on devices opened from now on
    pub fn fail_request(&mut self, request: ConfigRequest, errno: i32) {
        self.request_failures.insert(request, errno);
    }

    /// Drop all injected failures
    pub fn clear_failures(&mut self) {
        self.open_errno = None;
        self.request_failures.clear();
    }

    /// Descriptors that are currently open, in ascending order
    pub fn open_fds(&self) -> Vec<RawFd> {
        lock(&self.open).iter().copied().collect()
    }

    /// Tracker that keeps reporting open descriptors after the transport is gone
    pub fn fd_tracker(&self) -> FdTracker {
        FdTracker(Arc::clone(&self.open))
    }

    /// Every path opened successfully so far, in order
    pub fn opened_paths(&self) -> &[PathBuf] {
        &self.opened
    }
}

impl SpiTransport for DummyTransport {
    type Device = DummyDevice;

    fn open(&mut self, path: &Path) -> io::Result<DummyDevice> {
        if let Some(errno) = self.open_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if !self.nodes.contains(path) {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }

        let fd = self.next_fd;
        self.next_fd += 1;
        lock(&self.open).insert(fd);
        self.opened.push(path.to_path_buf());

        log::debug!("dummy_spi: Opened {} as fd {}", path.display(), fd);

        Ok(DummyDevice {
            fd,
            path: path.to_path_buf(),
            mode: 0,
            bits_per_word: 8,
            max_speed_hz: 0,
            responder: self.responder,
            max_transfer_len: self.max_transfer_len,
            request_failures: self.request_failures.clone(),
            readback: self.readback,
            message_errno: None,
            requests: Vec::new(),
            messages: Vec::new(),
            open: Arc::clone(&self.open),
        })
    }
}

/// An open emulated spidev node
#[derive(Debug)]
pub struct DummyDevice {
    fd: RawFd,
    path: PathBuf,
    mode: u8,
    bits_per_word: u8,
    max_speed_hz: u32,
    responder: Responder,
    max_transfer_len: usize,
    request_failures: HashMap<ConfigRequest, i32>,
    readback: Readback,
    message_errno: Option<i32>,
    requests: Vec<ConfigRequest>,
    messages: Vec<Vec<SegmentRecord>>,
    open: OpenSet,
}

impl DummyDevice {
    /// Path this device was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration requests received, in order
    pub fn requests(&self) -> &[ConfigRequest] {
        &self.requests
    }

    /// Descriptor arrays of every successful message, in order
    pub fn messages(&self) -> &[Vec<SegmentRecord>] {
        &self.messages
    }

    /// Current mode byte
    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Current bits per word
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Current maximum clock speed
    pub fn max_speed_hz(&self) -> u32 {
        self.max_speed_hz
    }

    /// Change how this device answers transfers
    pub fn set_responder(&mut self, responder: Responder) {
        self.responder = responder;
    }

    /// Make subsequent messages fail with `errno`, or succeed again with `None`
    pub fn fail_messages(&mut self, errno: Option<i32>) {
        self.message_errno = errno;
    }

    fn check(&mut self, request: ConfigRequest) -> io::Result<()> {
        self.requests.push(request);
        match self.request_failures.get(&request) {
            Some(&errno) => {
                log::debug!("dummy_spi: {} on fd {} fails with {}", request, self.fd, errno);
                Err(io::Error::from_raw_os_error(errno))
            }
            None => Ok(()),
        }
    }
}

impl Drop for DummyDevice {
    fn drop(&mut self) {
        lock(&self.open).remove(&self.fd);
        log::debug!("dummy_spi: Closed fd {}", self.fd);
    }
}

impl SpiDevice for DummyDevice {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn write_mode(&mut self, mode: u8) -> io::Result<()> {
        self.check(ConfigRequest::WriteMode)?;
        self.mode = mode;
        Ok(())
    }

    fn read_mode(&mut self) -> io::Result<u8> {
        self.check(ConfigRequest::ReadMode)?;
        Ok(self.readback.mode.unwrap_or(self.mode))
    }

    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        self.check(ConfigRequest::WriteBitsPerWord)?;
        self.bits_per_word = bits;
        Ok(())
    }

    fn read_bits_per_word(&mut self) -> io::Result<u8> {
        self.check(ConfigRequest::ReadBitsPerWord)?;
        Ok(self.readback.bits_per_word.unwrap_or(self.bits_per_word))
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        self.check(ConfigRequest::WriteMaxSpeed)?;
        self.max_speed_hz = speed_hz;
        Ok(())
    }

    fn read_max_speed_hz(&mut self) -> io::Result<u32> {
        self.check(ConfigRequest::ReadMaxSpeed)?;
        Ok(match self.readback.speed_cap_hz {
            Some(cap) => self.max_speed_hz.min(cap),
            None => self.max_speed_hz,
        })
    }

    fn message(&mut self, segments: &mut [Segment<'_>]) -> io::Result<usize> {
        if let Some(errno) = self.message_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }

        // Same limit the kernel applies to the sum of all segment lengths
        let total: usize = segments.iter().map(|seg| seg.len() as usize).sum();
        if total > self.max_transfer_len {
            return Err(io::Error::from_raw_os_error(libc::EMSGSIZE));
        }

        let mut records = Vec::with_capacity(segments.len());
        for seg in segments.iter_mut() {
            let (tx_buf, rx_buf, len) = (seg.tx_buf(), seg.rx_buf(), seg.len());
            let (speed_hz, delay_usecs) = (seg.speed_hz(), seg.delay_usecs());
            let (bits_per_word, cs_change) = (seg.bits_per_word(), seg.cs_change());

            let data = seg.data_mut();
            let tx = data.to_vec();
            for byte in data.iter_mut() {
                *byte = self.responder.reply(*byte);
            }

            records.push(SegmentRecord {
                tx_buf,
                rx_buf,
                len,
                speed_hz,
                delay_usecs,
                bits_per_word,
                cs_change,
                tx,
                rx: data.to_vec(),
            });
        }

        log::debug!(
            "dummy_spi: fd {} message of {} segment(s), {} byte(s)",
            self.fd,
            records.len(),
            total
        );
        self.messages.push(records);

        Ok(total)
    }

    fn max_transfer_len(&self) -> Option<usize> {
        Some(self.max_transfer_len)
    }
}
