//! Lokasi default segment dan konstanta konfigurasi
//!
//! Urutan pencarian direktori segment:
//! 1. Env `DATAMAN_SHM_DIR`
//! 2. `/dev/shm` (tmpfs, tidak pernah menyentuh disk)
//! 3. Temp dir OS

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SEGMENT_DIR_ENV: &str = "DATAMAN_SHM_DIR";
pub const SEGMENT_PREFIX: &str = "dataman";

/// Default control address untuk producer
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:9870";

/// Direktori tempat segment baru dibuat
pub fn segment_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(SEGMENT_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    let shm = PathBuf::from("/dev/shm");
    if shm.is_dir() {
        shm
    } else {
        std::env::temp_dir()
    }
}

/// Path unik untuk segment baru: `<dir>/dataman-<pid>-<nanos>-<n>.shm`
pub fn unique_segment_path() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);

    segment_dir().join(format!(
        "{}-{}-{}-{}.shm",
        SEGMENT_PREFIX,
        std::process::id(),
        nanos,
        n
    ))
}
