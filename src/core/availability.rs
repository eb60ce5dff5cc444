//! Availability Protocol: klasifikasi range baca terhadap cursor producer
//!
//! Buffer linear, tanpa wraparound. Klasifikasi untuk `[start, end)`:
//! - `Unavailable`: range kosong/terbalik, atau `end > capacity`
//! - `FullyAvailable`: `end <= cursor`
//! - `NeedsLoad`: `start >= cursor`, belum ada yang ditulis
//! - `PartiallyAvailable`: `start < cursor < end`
//!
//! Caller yang memutuskan: block (poll ulang), skip, atau persempit window.

use std::ops::Range;

/// Hasil klasifikasi range baca
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    FullyAvailable,
    /// Prefix `[start, cursor)` sudah bisa dibaca
    PartiallyAvailable { cursor: usize },
    NeedsLoad,
    Unavailable,
}

impl Availability {
    #[inline(always)]
    pub fn is_fully_available(&self) -> bool {
        matches!(self, Self::FullyAvailable)
    }

    /// Bagian dari `[start, end)` yang sudah aman dibaca, jika ada
    pub fn readable_range(&self, start: usize, end: usize) -> Option<Range<usize>> {
        match *self {
            Self::FullyAvailable => Some(start..end),
            Self::PartiallyAvailable { cursor } => Some(start..cursor),
            Self::NeedsLoad | Self::Unavailable => None,
        }
    }
}

/// Klasifikasi `[start, end)` terhadap `published_cursor` (exclusive) dan kapasitas buffer
#[inline]
pub fn classify(start: usize, end: usize, published_cursor: usize, capacity: usize) -> Availability {
    if start >= end || end > capacity {
        return Availability::Unavailable;
    }

    if end <= published_cursor {
        Availability::FullyAvailable
    } else if start >= published_cursor {
        Availability::NeedsLoad
    } else {
        Availability::PartiallyAvailable {
            cursor: published_cursor,
        }
    }
}
