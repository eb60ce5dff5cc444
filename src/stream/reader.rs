//! Consumer side: follow the published cursor
//!
//! Setiap reader punya mapping sendiri (attach), posisi baca lokal,
//! dan tidak pernah menyentuh cursor.

use tracing::{debug, trace};

use crate::core::{Availability, RingBuffer, Sample, SegmentHandle, StreamState, Window};
use crate::error::{BufferError, Result};

use super::contract::SampleSink;

pub struct StreamReader<T: Sample> {
    buffer: RingBuffer<T>,
    position: usize,
}

impl<T: Sample> StreamReader<T> {
    pub fn new(buffer: RingBuffer<T>) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Attach ke segment lewat handle dari producer
    pub fn attach(handle: &SegmentHandle) -> Result<Self> {
        let buffer = RingBuffer::attach(handle)?;
        debug!(
            handle = %handle,
            channels = buffer.channels(),
            capacity = buffer.capacity(),
            "stream reader attached"
        );
        Ok(Self::new(buffer))
    }

    pub fn buffer(&self) -> &RingBuffer<T> {
        &self.buffer
    }

    /// Kolom berikutnya yang akan dikembalikan `next_window`
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.buffer.capacity() {
            return Err(BufferError::Range {
                start: position,
                end: position,
                capacity: self.buffer.capacity(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Cursor yang sudah dipublish producer
    #[inline(always)]
    pub fn cursor(&self) -> usize {
        self.buffer.published_cursor()
    }

    /// Kolom yang sudah available tapi belum dibaca
    #[inline(always)]
    pub fn pending(&self) -> usize {
        self.cursor().saturating_sub(self.position)
    }

    #[inline(always)]
    pub fn poll(&self, start: usize, end: usize) -> Availability {
        self.buffer.classify(start, end)
    }

    /// Read yang menolak range yang belum fully available
    pub fn read_available(&self, start: usize, end: usize) -> Result<Window<'_, T>> {
        match self.poll(start, end) {
            Availability::FullyAvailable => self.buffer.read(start, end),
            availability => Err(BufferError::NotAvailable {
                start,
                end,
                availability,
            }),
        }
    }

    /// Window berikutnya (maksimal `max_width` kolom) dari posisi baca sampai cursor.
    ///
    /// Returns None kalau belum ada kolom baru.
    pub fn next_window(&mut self, max_width: usize) -> Option<Window<'_, T>> {
        let start = self.position;
        let end = self.next_end(self.cursor(), max_width)?;
        self.position = end;
        self.buffer.read(start, end).ok()
    }

    /// Kirim semua kolom yang sudah available ke `sink`, per window.
    ///
    /// Berhenti di cursor saat pemanggilan; posisi hanya maju untuk window
    /// yang diterima sink tanpa error.
    pub fn drain_into<S: SampleSink<T>>(&mut self, mut sink: S, max_width: usize) -> Result<usize> {
        let cursor = self.cursor();
        let mut total = 0;

        while let Some(end) = self.next_end(cursor, max_width) {
            let window = self.buffer.read(self.position, end)?;
            sink.consume(&window)?;
            total += window.width();
            self.position = end;
        }

        if total > 0 {
            trace!(total, position = self.position, "drained columns");
        }
        Ok(total)
    }

    pub fn state(&self) -> StreamState {
        self.buffer.segment().state()
    }

    /// Producer sudah stop dan semua kolom sudah dibaca
    pub fn is_finished(&self) -> bool {
        self.state() == StreamState::Stopped && self.position >= self.cursor()
    }

    /// Writer claim dipegang proses yang sudah mati (crash tanpa stop)
    pub fn writer_lost(&self) -> bool {
        self.buffer.segment().writer_alive() == Some(false)
    }

    fn next_end(&self, cursor: usize, max_width: usize) -> Option<usize> {
        if max_width == 0 || self.position >= cursor {
            return None;
        }
        Some(cursor.min(self.position.saturating_add(max_width)))
    }
}
