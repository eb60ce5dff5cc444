//! Typed View atas Shared Segment
//!
//! Matrix `channels × capacity` di atas body segment. Prinsip:
//! - Linear: tidak ada auto-wrap, view hanya enforce bound linear
//! - Write atomic per call: semua validasi sebelum byte pertama disalin
//! - Write-then-publish: data ditulis dulu, cursor di-store dengan Release
//! - Tidak ada I/O per call, segment sudah di-mmap

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::Ordering;

use super::availability::{classify, Availability};
use super::sample_type::Sample;
use super::segment::{Segment, SegmentHandle};
use super::window::{SampleBlock, Window, WindowMut};
use crate::config;
use crate::error::{BufferError, Result};

/// Per-process view atas segment dengan tipe sample `T`
pub struct RingBuffer<T: Sample> {
    segment: Segment,
    channels: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

impl<T: Sample> RingBuffer<T> {
    /// Segment baru di direktori default
    pub fn create(channels: usize, capacity: usize) -> Result<Self> {
        Self::create_at(config::unique_segment_path(), channels, capacity)
    }

    pub fn create_at<P: AsRef<Path>>(path: P, channels: usize, capacity: usize) -> Result<Self> {
        Self::from_segment(Segment::create_typed(
            path.as_ref(),
            T::TYPE,
            channels,
            capacity,
        )?)
    }

    pub fn attach(handle: &SegmentHandle) -> Result<Self> {
        Self::from_segment(Segment::attach(handle)?)
    }

    /// Bungkus segment yang sudah ada. Tipe sample harus cocok dengan `T`.
    pub fn from_segment(segment: Segment) -> Result<Self> {
        if segment.sample_type() != T::TYPE {
            return Err(BufferError::TypeMismatch {
                segment: segment.sample_type().name(),
                requested: T::TYPE.name(),
            });
        }

        Ok(Self {
            channels: segment.channels(),
            capacity: segment.capacity(),
            segment,
            _marker: PhantomData,
        })
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn into_segment(self) -> Segment {
        self.segment
    }

    pub fn handle(&self) -> &SegmentHandle {
        self.segment.handle()
    }

    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cursor yang sudah dipublish producer (exclusive upper bound)
    #[inline(always)]
    pub fn published_cursor(&self) -> usize {
        // Acquire: pasangan dari Release di publish()
        let cursor = self.segment.cursor().load(Ordering::Acquire);
        (cursor as usize).min(self.capacity)
    }

    /// Klasifikasi `[start, end)` terhadap cursor saat ini
    #[inline]
    pub fn classify(&self, start: usize, end: usize) -> Availability {
        classify(start, end, self.published_cursor(), self.capacity)
    }

    /// Tulis blok mulai kolom `start`
    pub fn write(&mut self, block: &SampleBlock<T>, start: usize) -> Result<()> {
        self.check_shape(block.channels())?;
        let end = self.check_write_range(start, block.width())?;

        self.copy_rows(block.rows(), start, end);
        Ok(())
    }

    /// Tulis dari slice per channel. Baris harus sama panjang.
    pub fn write_rows<R: AsRef<[T]>>(&mut self, rows: &[R], start: usize) -> Result<()> {
        self.check_shape(rows.len())?;

        let width = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some(row) = rows.iter().find(|r| r.as_ref().len() != width) {
            return Err(BufferError::Shape {
                what: "columns",
                expected: width,
                found: row.as_ref().len(),
            });
        }
        let end = self.check_write_range(start, width)?;

        self.copy_rows(rows.iter().map(|r| r.as_ref()), start, end);
        Ok(())
    }

    /// Window read-only atas `[start, end)`. Tidak mengecek availability;
    /// pakai [`RingBuffer::classify`] dulu jika producer masih menulis.
    pub fn read(&self, start: usize, end: usize) -> Result<Window<'_, T>> {
        self.check_read_range(start, end)?;
        // SAFETY: range sudah dicek, body valid selama &self
        Ok(unsafe {
            Window::new(
                self.segment.body_ptr() as *const T,
                self.capacity,
                self.channels,
                start,
                end,
            )
        })
    }

    /// Window yang bisa ditulis langsung (tanpa write-protect)
    pub fn read_mut(&mut self, start: usize, end: usize) -> Result<WindowMut<'_, T>> {
        self.check_read_range(start, end)?;
        // SAFETY: range sudah dicek, &mut self mencegah window lain di proses ini
        Ok(unsafe {
            WindowMut::new(
                self.segment.body_ptr() as *mut T,
                self.capacity,
                self.channels,
                start,
                end,
            )
        })
    }

    /// Publish cursor baru. Hanya boleh maju, maksimal `capacity`.
    pub fn publish(&mut self, cursor: usize) -> Result<()> {
        let current = self.published_cursor();
        if cursor < current || cursor > self.capacity {
            return Err(BufferError::Range {
                start: current,
                end: cursor,
                capacity: self.capacity,
            });
        }

        // Release: semua write di atas visible sebelum cursor di-update
        self.segment
            .cursor()
            .store(cursor as u64, Ordering::Release);
        Ok(())
    }

    #[inline(always)]
    fn check_shape(&self, channels: usize) -> Result<()> {
        if channels != self.channels {
            return Err(BufferError::Shape {
                what: "channels",
                expected: self.channels,
                found: channels,
            });
        }
        Ok(())
    }

    #[inline(always)]
    fn check_write_range(&self, start: usize, width: usize) -> Result<usize> {
        match start.checked_add(width) {
            Some(end) if end <= self.capacity => Ok(end),
            _ => Err(BufferError::Range {
                start,
                end: start.saturating_add(width),
                capacity: self.capacity,
            }),
        }
    }

    #[inline(always)]
    fn check_read_range(&self, start: usize, end: usize) -> Result<()> {
        if start >= end || end > self.capacity {
            return Err(BufferError::Range {
                start,
                end,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    #[inline(always)]
    fn copy_rows<'r, I>(&mut self, rows: I, start: usize, end: usize)
    where
        I: Iterator<Item = &'r [T]>,
    {
        let body = self.segment.body_ptr() as *mut T;
        for (channel, row) in rows.enumerate() {
            debug_assert_eq!(row.len(), end - start);
            // SAFETY: shape dan range sudah divalidasi, source bukan bagian segment
            unsafe {
                std::ptr::copy_nonoverlapping(
                    row.as_ptr(),
                    body.add(channel * self.capacity + start),
                    row.len(),
                );
            }
        }
    }
}

impl<T: Sample> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("handle", self.segment.handle())
            .field("sample_type", &T::TYPE)
            .field("channels", &self.channels)
            .field("capacity", &self.capacity)
            .field("cursor", &self.published_cursor())
            .finish()
    }
}
