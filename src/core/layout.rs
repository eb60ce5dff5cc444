//! Segment Layout: Header + Control Block + Sample Matrix
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ BufferHeader (28 bytes packed, LE, pad ke 64)       │  offset 0
//! ├─────────────────────────────────────────────────────┤
//! │ ControlBlock (magic, version, attach, writer, state,│  offset 64
//! │               tabel pid attacher)                   │
//! ├─────────────────────────────────────────────────────┤
//! │ Cursor (AtomicU64, cache line sendiri)              │  offset 128
//! ├─────────────────────────────────────────────────────┤
//! │ Sample matrix [channel][sample], row-major          │  offset 192
//! └─────────────────────────────────────────────────────┘
//!
//! Header di-parse posisional, tanpa metadata runtime: proses manapun cukup
//! punya registry tipe untuk decode.

use std::sync::atomic::{AtomicU32, AtomicU64};

use super::sample_type::SampleType;
use crate::error::{BufferError, Result};

pub const HEADER_SIZE: usize = 28;
pub const CONTROL_OFFSET: usize = 64;
pub const CURSOR_OFFSET: usize = 128;
/// Ukuran seluruh region sebelum sample matrix. Region yang lebih kecil
/// dari ini tidak bisa di-attach.
pub const PREAMBLE_SIZE: usize = 192;

pub const MAGIC: u64 = 0x444D_5348_4D5F_5631; // "DMSHM_V1"
pub const LAYOUT_VERSION: u32 = 2;

/// Jumlah slot pid attacher di control block. Attacher di luar slot tetap
/// dihitung, hanya tidak bisa di-reap jika prosesnya mati.
pub const ATTACHER_SLOTS: usize = 8;

/// Metadata segment. Ditulis sekali oleh creator, immutable setelahnya.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHeader {
    pub data_size_bytes: u64,
    pub type_code: u32,
    pub channel_count: u64,
    pub sample_capacity: u64,
}

impl BufferHeader {
    /// Header baru untuk `channels × capacity` sample bertipe `sample_type`
    pub fn new(sample_type: SampleType, channels: usize, capacity: usize) -> Result<Self> {
        if channels < 1 || capacity < 1 {
            return Err(BufferError::Config(format!(
                "channel count and sample capacity must be positive (got {channels} x {capacity})"
            )));
        }

        let data_size_bytes = (channels as u64)
            .checked_mul(capacity as u64)
            .and_then(|n| n.checked_mul(sample_type.byte_width() as u64))
            .filter(|&n| n <= (usize::MAX - PREAMBLE_SIZE) as u64)
            .ok_or_else(|| {
                BufferError::Config(format!(
                    "{channels} x {capacity} {sample_type} samples do not fit in memory"
                ))
            })?;

        Ok(Self {
            data_size_bytes,
            type_code: sample_type.code(),
            channel_count: channels as u64,
            sample_capacity: capacity as u64,
        })
    }

    /// Serialize ke `buf[..HEADER_SIZE]`
    ///
    /// # Panics
    /// Panic jika `buf` lebih pendek dari `HEADER_SIZE`
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.data_size_bytes.to_le_bytes());
        buf[8..12].copy_from_slice(&self.type_code.to_le_bytes());
        buf[12..20].copy_from_slice(&self.channel_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.sample_capacity.to_le_bytes());
    }

    /// Parse posisional, belum divalidasi (lihat [`BufferHeader::validate`])
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(BufferError::Attach(format!(
                "header needs {HEADER_SIZE} bytes, region has {}",
                buf.len()
            )));
        }

        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let mut code = [0u8; 4];
        code.copy_from_slice(&buf[8..12]);

        Ok(Self {
            data_size_bytes: u64_at(0),
            type_code: u32::from_le_bytes(code),
            channel_count: u64_at(12),
            sample_capacity: u64_at(20),
        })
    }

    /// Cek konsistensi field, return tipe sample jika valid
    pub fn validate(&self) -> Result<SampleType> {
        let sample_type =
            SampleType::from_code(self.type_code).ok_or(BufferError::UnsupportedType(self.type_code))?;

        if self.channel_count < 1 || self.sample_capacity < 1 {
            return Err(BufferError::Attach(format!(
                "header declares an empty matrix ({} x {})",
                self.channel_count, self.sample_capacity
            )));
        }

        let expected = self
            .channel_count
            .checked_mul(self.sample_capacity)
            .and_then(|n| n.checked_mul(sample_type.byte_width() as u64));
        if expected != Some(self.data_size_bytes) {
            return Err(BufferError::Attach(format!(
                "header data size {} does not match {} x {} {}",
                self.data_size_bytes, self.channel_count, self.sample_capacity, sample_type
            )));
        }

        if usize::try_from(self.data_size_bytes)
            .ok()
            .and_then(|n| n.checked_add(PREAMBLE_SIZE))
            .is_none()
        {
            return Err(BufferError::Attach(format!(
                "segment of {} bytes cannot be mapped on this platform",
                self.data_size_bytes
            )));
        }

        Ok(sample_type)
    }

    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.channel_count as usize
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.sample_capacity as usize
    }

    /// Total ukuran segment (preamble + sample matrix)
    #[inline(always)]
    pub fn segment_size(&self) -> usize {
        PREAMBLE_SIZE + self.data_size_bytes as usize
    }
}

/// Total ukuran segment untuk konfigurasi tertentu
pub fn segment_size(sample_type: SampleType, channels: usize, capacity: usize) -> Result<usize> {
    BufferHeader::new(sample_type, channels, capacity).map(|h| h.segment_size())
}

/// State stream yang dipublish producer
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Belum ada writer
    Idle = 0,
    /// Writer aktif, cursor masih bisa maju
    Streaming = 1,
    /// Writer selesai, cursor final
    Stopped = 2,
}

impl StreamState {
    #[inline(always)]
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Streaming,
            2 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Shared control block di offset `CONTROL_OFFSET`.
///
/// Semua field atomic: memory nol adalah nilai awal yang valid.
#[repr(C, align(64))]
pub(crate) struct ControlBlock {
    /// Ditulis terakhir oleh creator (Release), jadi header sudah lengkap
    /// saat magic terlihat.
    pub magic: AtomicU64,
    pub layout_version: AtomicU32,
    /// Jumlah proses yang sedang attach. 0 = segment sudah dilepas.
    pub attach_count: AtomicU32,
    /// PID writer aktif, 0 = kosong
    pub writer_pid: AtomicU32,
    pub state: AtomicU32,
    /// PID proses yang attach, 0 = slot kosong
    pub attachers: [AtomicU32; ATTACHER_SLOTS],
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
pub(crate) struct CacheLinePadded<T> {
    pub value: T,
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() == CURSOR_OFFSET - CONTROL_OFFSET);
const _: () = assert!(
    std::mem::size_of::<CacheLinePadded<AtomicU64>>() == PREAMBLE_SIZE - CURSOR_OFFSET
);
const _: () = assert!(HEADER_SIZE <= CONTROL_OFFSET);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = BufferHeader::new(SampleType::Float32, 2, 15).unwrap();
        assert_eq!(header.data_size_bytes, 2 * 15 * 4);

        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        let parsed = BufferHeader::decode(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.validate().unwrap(), SampleType::Float32);
    }

    #[test]
    fn test_header_positional_layout() {
        let header = BufferHeader::new(SampleType::Int16, 3, 10).unwrap();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);

        assert_eq!(&buf[0..8], &60u64.to_le_bytes());
        assert_eq!(&buf[8..12], &1u32.to_le_bytes());
        assert_eq!(&buf[12..20], &3u64.to_le_bytes());
        assert_eq!(&buf[20..28], &10u64.to_le_bytes());
    }

    #[test]
    fn test_new_rejects_empty_matrix() {
        assert!(matches!(
            BufferHeader::new(SampleType::Float32, 0, 10),
            Err(BufferError::Config(_))
        ));
        assert!(matches!(
            BufferHeader::new(SampleType::Float32, 4, 0),
            Err(BufferError::Config(_))
        ));
        assert!(matches!(
            BufferHeader::new(SampleType::Float64, usize::MAX, 2),
            Err(BufferError::Config(_))
        ));
    }

    #[test]
    fn test_validate_detects_inconsistency() {
        let mut header = BufferHeader::new(SampleType::Float32, 2, 15).unwrap();
        header.data_size_bytes += 1;
        assert!(matches!(header.validate(), Err(BufferError::Attach(_))));

        let mut header = BufferHeader::new(SampleType::Float32, 2, 15).unwrap();
        header.type_code = 42;
        assert!(matches!(
            header.validate(),
            Err(BufferError::UnsupportedType(42))
        ));
    }

    #[test]
    fn test_decode_short_buffer() {
        assert!(matches!(
            BufferHeader::decode(&[0u8; 10]),
            Err(BufferError::Attach(_))
        ));
    }

    #[test]
    fn test_segment_size() {
        assert_eq!(
            segment_size(SampleType::Float32, 64, 30000).unwrap(),
            PREAMBLE_SIZE + 64 * 30000 * 4
        );
    }
}
