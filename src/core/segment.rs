//! Shared Memory Segment (file-backed mmap)
//!
//! Segment di-mmap langsung dari file (default di `/dev/shm`), sehingga:
//! - Zero-copy: producer dan consumer memetakan byte yang sama
//! - Handle = path file, bisa dikirim ke proses lain sebagai string
//! - Lifetime kolektif: file di-unlink saat proses terakhir detach
//!
//! Setiap attacher mencatat pid-nya di control block. Proses yang mati tanpa
//! sempat `Drop` (SIGKILL, `panic = "abort"`) di-reap oleh attacher lain,
//! jadi count tidak tertahan selamanya.

use memmap2::{MmapMut, MmapOptions};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::layout::{
    BufferHeader, CacheLinePadded, ControlBlock, StreamState, CONTROL_OFFSET, CURSOR_OFFSET,
    HEADER_SIZE, LAYOUT_VERSION, MAGIC, PREAMBLE_SIZE,
};
use super::sample_type::SampleType;
use crate::config;
use crate::error::{BufferError, Result};

/// Referensi yang bisa dibagikan ke proses lain untuk attach ke segment yang sama
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentHandle {
    path: PathBuf,
}

impl SegmentHandle {
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SegmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for SegmentHandle {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BufferError::Config("empty segment handle".into()));
        }
        Ok(Self::from_path(s))
    }
}

/// Region shared memory: header + control block + sample matrix.
///
/// Hanya bisa didapat lewat [`Segment::create`] atau [`Segment::attach`],
/// jadi setiap `Segment` selalu sudah ter-inisialisasi.
pub struct Segment {
    mmap: MmapMut,
    // Base pointer diambil sekali dari `as_mut_ptr`, dipakai untuk semua akses
    base: *mut u8,
    handle: SegmentHandle,
    header: BufferHeader,
    sample_type: SampleType,
    // Slot pid di tabel attacher, None jika tabel penuh
    slot: Option<usize>,
}

// SAFETY: Segment aman untuk Send/Sync karena:
// - Header immutable setelah create
// - Control block dan cursor hanya diakses lewat atomics
// - Body: single-writer dijamin oleh `&mut` di sisi RingBuffer dan writer claim lintas proses
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Membuat segment baru di direktori default (lihat [`config::segment_dir`])
    pub fn create(channels: usize, capacity: usize, type_name: &str) -> Result<Self> {
        Self::create_at(config::unique_segment_path(), channels, capacity, type_name)
    }

    /// Membuat segment baru di path tertentu. Gagal jika file sudah ada.
    pub fn create_at<P: AsRef<Path>>(
        path: P,
        channels: usize,
        capacity: usize,
        type_name: &str,
    ) -> Result<Self> {
        let sample_type: SampleType = type_name.parse()?;
        Self::create_typed(path.as_ref(), sample_type, channels, capacity)
    }

    pub(crate) fn create_typed(
        path: &Path,
        sample_type: SampleType,
        channels: usize,
        capacity: usize,
    ) -> Result<Self> {
        // Validasi dulu sebelum menyentuh filesystem
        let header = BufferHeader::new(sample_type, channels, capacity)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Self::init(&file, path, header, sample_type).map_err(|e| {
            fs::remove_file(path).ok();
            e
        })
    }

    fn init(file: &File, path: &Path, header: BufferHeader, sample_type: SampleType) -> Result<Self> {
        let total_size = header.segment_size();

        // set_len mengisi region dengan nol
        file.set_len(total_size as u64)?;

        // SAFETY: file baru dibuat oleh proses ini dengan read/write permission
        let mut mmap = unsafe { MmapOptions::new().len(total_size).map_mut(file)? };

        header.encode(&mut mmap[..HEADER_SIZE]);

        let base = mmap.as_mut_ptr();
        let mut segment = Self {
            mmap,
            base,
            handle: SegmentHandle::from_path(path),
            header,
            sample_type,
            slot: None,
        };

        let control = segment.control();
        control.layout_version.store(LAYOUT_VERSION, Ordering::Relaxed);
        control.attach_count.store(1, Ordering::Relaxed);
        control.state.store(StreamState::Idle as u32, Ordering::Relaxed);
        control.attachers[0].store(std::process::id(), Ordering::Relaxed);
        // Release: header dan control block harus terlihat sebelum magic
        control.magic.store(MAGIC, Ordering::Release);
        segment.slot = Some(0);

        debug!(
            path = %path.display(),
            channels = header.channel_count,
            capacity = header.sample_capacity,
            sample_type = %sample_type,
            bytes = total_size,
            "segment created"
        );

        Ok(segment)
    }

    /// Attach ke segment yang sudah ada. Header hanya dibaca, tidak pernah ditulis.
    pub fn attach(handle: &SegmentHandle) -> Result<Self> {
        let path = handle.path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    BufferError::Attach(format!("no segment at {}", path.display()))
                }
                _ => BufferError::Io(e),
            })?;

        let len = file.metadata()?.len();
        if len < PREAMBLE_SIZE as u64 {
            return Err(BufferError::Attach(format!(
                "region of {len} bytes is smaller than the {PREAMBLE_SIZE} byte header"
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| BufferError::Attach(format!("region of {len} bytes cannot be mapped")))?;

        // SAFETY: ukuran file sudah dicek, mapping read/write
        let mut mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let base = mmap.as_mut_ptr();

        // SAFETY: len >= PREAMBLE_SIZE, control block berada di dalam preamble
        let control = unsafe { &*(base.add(CONTROL_OFFSET) as *const ControlBlock) };

        if control.magic.load(Ordering::Acquire) != MAGIC {
            return Err(BufferError::Attach(format!(
                "{} is not an initialized sample segment",
                path.display()
            )));
        }
        let version = control.layout_version.load(Ordering::Relaxed);
        if version != LAYOUT_VERSION {
            return Err(BufferError::Attach(format!(
                "layout version {version} is not supported (expected {LAYOUT_VERSION})"
            )));
        }

        let header = BufferHeader::decode(&mmap[..HEADER_SIZE])?;
        let sample_type = header.validate()?;
        if len < header.segment_size() {
            return Err(BufferError::Attach(format!(
                "region of {len} bytes is smaller than the {} bytes the header declares",
                header.segment_size()
            )));
        }

        // Register sebagai attacher. Count 0 berarti proses terakhir sudah release.
        let registered = control
            .attach_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    None
                } else {
                    count.checked_add(1)
                }
            });
        if registered.is_err() {
            return Err(BufferError::Attach(format!(
                "segment {} has already been released",
                path.display()
            )));
        }

        let slot = register_attacher(control, std::process::id());
        if slot.is_none() {
            debug!(path = %path.display(), "attacher table full, pid not tracked");
        }

        debug!(
            path = %path.display(),
            channels = header.channel_count,
            capacity = header.sample_capacity,
            sample_type = %sample_type,
            "segment attached"
        );

        Ok(Self {
            mmap,
            base,
            handle: handle.clone(),
            header,
            sample_type,
            slot,
        })
    }

    /// Handle untuk dibagikan ke proses lain
    pub fn handle(&self) -> &SegmentHandle {
        &self.handle
    }

    pub fn header(&self) -> &BufferHeader {
        &self.header
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn channels(&self) -> usize {
        self.header.channels()
    }

    pub fn capacity(&self) -> usize {
        self.header.capacity()
    }

    /// Jumlah proses yang sedang attach (termasuk creator)
    pub fn attached_count(&self) -> u32 {
        self.control().attach_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u32(self.control().state.load(Ordering::Acquire))
    }

    /// PID writer yang sedang claim segment, jika ada
    pub fn writer_pid(&self) -> Option<u32> {
        match self.control().writer_pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Apakah proses writer masih hidup. `None` jika tidak ada writer.
    pub fn writer_alive(&self) -> Option<bool> {
        self.writer_pid().map(process_alive)
    }

    /// Lepas registrasi attacher yang prosesnya sudah mati.
    ///
    /// Returns jumlah attacher yang di-reap. Slot di-clear dengan CAS, jadi
    /// dua proses yang reap bersamaan tidak mengurangi count dua kali.
    pub fn reap_dead_attachers(&self) -> u32 {
        let control = self.control();
        let mut reaped = 0;

        for (i, slot) in control.attachers.iter().enumerate() {
            let pid = slot.load(Ordering::Acquire);
            if pid == 0 || Some(i) == self.slot || process_alive(pid) {
                continue;
            }
            if slot
                .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            // Proses ini sendiri masih attach, count tidak pernah jatuh ke 0 di sini
            let released = control
                .attach_count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                    count.checked_sub(1).filter(|&n| n > 0)
                });
            if released.is_ok() {
                warn!(path = %self.handle, pid, "reaped dead attacher");
                reaped += 1;
            }
        }
        reaped
    }

    /// Block sampai proses ini satu-satunya attacher yang tersisa.
    ///
    /// Attacher yang mati di-reap setiap `interval`.
    pub fn wait_for_detach(&self, interval: Duration) {
        loop {
            self.reap_dead_attachers();
            if self.attached_count() <= 1 {
                return;
            }
            std::thread::sleep(interval);
        }
    }

    /// Flush mapping ke backing file
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn control(&self) -> &ControlBlock {
        // SAFETY: mapping minimal PREAMBLE_SIZE bytes, offset 64-aligned
        unsafe { &*(self.base.add(CONTROL_OFFSET) as *const ControlBlock) }
    }

    #[inline(always)]
    pub(crate) fn cursor(&self) -> &AtomicU64 {
        // SAFETY: sama seperti control(), cursor punya cache line sendiri
        unsafe { &(*(self.base.add(CURSOR_OFFSET) as *const CacheLinePadded<AtomicU64>)).value }
    }

    /// Pointer ke awal sample matrix (offset `PREAMBLE_SIZE`)
    #[inline(always)]
    pub(crate) fn body_ptr(&self) -> *mut u8 {
        // SAFETY: len >= header.segment_size() dicek saat create/attach
        unsafe { self.base.add(PREAMBLE_SIZE) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Some(slot) = self.slot {
            self.control().attachers[slot]
                .compare_exchange(std::process::id(), 0, Ordering::AcqRel, Ordering::Relaxed)
                .ok();
        }
        // Attacher yang mati tidak boleh menahan unlink
        self.reap_dead_attachers();

        let previous = self
            .control()
            .attach_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });

        match previous {
            Ok(1) => {
                if let Err(e) = fs::remove_file(self.handle.path()) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(path = %self.handle, error = %e, "failed to unlink segment");
                    }
                }
                debug!(path = %self.handle, "segment released");
            }
            Ok(n) => debug!(path = %self.handle, remaining = n - 1, "segment detached"),
            Err(_) => warn!(path = %self.handle, "segment attach count already zero"),
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("handle", &self.handle)
            .field("sample_type", &self.sample_type)
            .field("channels", &self.header.channel_count)
            .field("capacity", &self.header.sample_capacity)
            .field("state", &self.state())
            .finish()
    }
}

/// Claim slot kosong di tabel attacher
fn register_attacher(control: &ControlBlock, pid: u32) -> Option<usize> {
    control.attachers.iter().position(|slot| {
        slot.compare_exchange(0, pid, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    })
}

/// Cek keberadaan proses lewat `kill(pid, 0)`
#[cfg(unix)]
pub(crate) fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 tidak mengirim apa-apa, hanya cek permission/keberadaan
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub(crate) fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn test_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "dataman_segment_{}_{}_{}.shm",
            tag,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn test_create_and_attach() {
        let path = test_path("attach");
        let segment = Segment::create_at(&path, 2, 15, "float32").unwrap();
        assert_eq!(segment.attached_count(), 1);
        assert_eq!(segment.state(), StreamState::Idle);

        let other = Segment::attach(segment.handle()).unwrap();
        assert_eq!(other.header(), segment.header());
        assert_eq!(other.sample_type(), SampleType::Float32);
        assert_eq!(segment.attached_count(), 2);

        drop(other);
        assert_eq!(segment.attached_count(), 1);
        assert!(path.exists());

        drop(segment);
        assert!(!path.exists());
    }

    #[test]
    fn test_create_rejects_bad_config() {
        let path = test_path("config");
        assert!(matches!(
            Segment::create_at(&path, 0, 15, "float32"),
            Err(BufferError::Config(_))
        ));
        assert!(matches!(
            Segment::create_at(&path, 2, 0, "float32"),
            Err(BufferError::Config(_))
        ));
        assert!(matches!(
            Segment::create_at(&path, 2, 15, "complex64"),
            Err(BufferError::Config(_))
        ));
        // Tidak ada file yang tertinggal
        assert!(!path.exists());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let path = test_path("exists");
        let _segment = Segment::create_at(&path, 1, 4, "int16").unwrap();
        assert!(matches!(
            Segment::create_at(&path, 1, 4, "int16"),
            Err(BufferError::Io(_))
        ));
    }

    #[test]
    fn test_attach_missing_segment() {
        let handle = SegmentHandle::from_path(test_path("missing"));
        assert!(matches!(
            Segment::attach(&handle),
            Err(BufferError::Attach(_))
        ));
    }

    #[test]
    fn test_handle_parse() {
        let handle: SegmentHandle = " /dev/shm/dataman-1.shm ".parse().unwrap();
        assert_eq!(handle.path(), Path::new("/dev/shm/dataman-1.shm"));
        assert_eq!(handle.to_string(), "/dev/shm/dataman-1.shm");
        assert!("".parse::<SegmentHandle>().is_err());
    }

    /// Tanam attacher palsu dengan pid yang tidak mungkin hidup, seperti
    /// proses yang di-SIGKILL setelah attach.
    fn plant_dead_attacher(segment: &Segment) {
        let control = segment.control();
        assert!(register_attacher(control, u32::MAX).is_some());
        control.attach_count.fetch_add(1, Ordering::AcqRel);
    }

    #[test]
    fn test_attachers_are_registered() {
        let segment = Segment::create_at(test_path("table"), 1, 4, "float32").unwrap();
        let other = Segment::attach(segment.handle()).unwrap();
        let pid = std::process::id();

        let pids: Vec<u32> = segment
            .control()
            .attachers
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect();
        assert_eq!(pids.iter().filter(|&&p| p == pid).count(), 2);

        drop(other);
        let remaining = segment
            .control()
            .attachers
            .iter()
            .filter(|slot| slot.load(Ordering::Acquire) == pid)
            .count();
        assert_eq!(remaining, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_attacher_is_reaped() {
        let path = test_path("reap");
        let segment = Segment::create_at(&path, 1, 4, "float32").unwrap();
        let other = Segment::attach(segment.handle()).unwrap();
        plant_dead_attacher(&segment);
        assert_eq!(segment.attached_count(), 3);

        assert_eq!(segment.reap_dead_attachers(), 1);
        assert_eq!(segment.attached_count(), 2);
        assert_eq!(other.reap_dead_attachers(), 0);

        drop(other);
        assert!(path.exists());
        drop(segment);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_attacher_does_not_block_unlink() {
        let path = test_path("unlink");
        let segment = Segment::create_at(&path, 1, 4, "int16").unwrap();
        plant_dead_attacher(&segment);
        assert_eq!(segment.attached_count(), 2);

        drop(segment);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_for_detach_skips_dead_attacher() {
        let segment = Segment::create_at(test_path("hold"), 1, 4, "float64").unwrap();
        plant_dead_attacher(&segment);

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            segment.wait_for_detach(Duration::from_millis(1));
            tx.send(segment).unwrap();
        });

        let segment = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("wait_for_detach never returned");
        assert_eq!(segment.attached_count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
        assert!(!process_alive(u32::MAX));
    }
}
