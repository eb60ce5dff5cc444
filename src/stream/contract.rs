//! Producer/Consumer contracts
//!
//! Implementasi konkret (file reader, renderer) ada di luar crate ini.
//! Kewajiban masing-masing sisi:
//!
//! Producer ([`SampleSource`] lewat [`super::Streamer`]):
//! - Hanya menulis range yang maju dan contiguous
//! - Cursor dipublish setelah byte selesai ditulis
//!
//! Consumer ([`SampleSink`] lewat [`super::StreamReader`]):
//! - Window hanya valid untuk pemakaian langsung, jangan di-cache
//! - Tidak pernah menulis lewat window read-only

use crate::core::{Sample, SampleBlock, Window};
use crate::error::Result;

/// Asal data sample di sisi producer
pub trait SampleSource<T: Sample> {
    fn channels(&self) -> usize;

    /// Isi `block` dengan kolom mulai `position` di source.
    ///
    /// Returns jumlah kolom valid di awal `block` (0 = source habis).
    fn fill(&mut self, position: u64, block: &mut SampleBlock<T>) -> Result<usize>;
}

/// Tujuan window yang sudah available di sisi consumer
pub trait SampleSink<T: Sample> {
    fn consume(&mut self, window: &Window<'_, T>) -> Result<()>;
}

impl<T: Sample, S: SampleSink<T> + ?Sized> SampleSink<T> for &mut S {
    fn consume(&mut self, window: &Window<'_, T>) -> Result<()> {
        (**self).consume(window)
    }
}
