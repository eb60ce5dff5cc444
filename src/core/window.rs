//! Sample matrix: blok owned dan window zero-copy
//!
//! Konvensi: channel = baris, sample index = kolom. Di memory, setiap
//! channel adalah satu baris contiguous (row-major).

use std::fmt;
use std::marker::PhantomData;

use super::sample_type::Sample;
use crate::error::{BufferError, Result};

/// Matrix `channels × width` yang dimiliki sendiri (row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock<T> {
    channels: usize,
    width: usize,
    data: Vec<T>,
}

impl<T: Sample> SampleBlock<T> {
    pub fn zeros(channels: usize, width: usize) -> Self {
        Self {
            channels,
            width,
            data: vec![T::default(); channels * width],
        }
    }

    /// Bangun dari baris per channel. Semua baris harus sama panjang.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let width = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * width);

        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(BufferError::Shape {
                    what: "columns",
                    expected: width,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            channels: rows.len(),
            width,
            data,
        })
    }

    /// Bangun dari data row-major yang sudah flat
    pub fn from_vec(channels: usize, width: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != channels * width {
            return Err(BufferError::Shape {
                what: "samples",
                expected: channels * width,
                found: data.len(),
            });
        }
        Ok(Self {
            channels,
            width,
            data,
        })
    }

    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    pub fn row(&self, channel: usize) -> &[T] {
        &self.data[channel * self.width..(channel + 1) * self.width]
    }

    #[inline(always)]
    pub fn row_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.data[channel * self.width..(channel + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.channels).map(move |c| self.row(c))
    }

    pub fn get(&self, channel: usize, column: usize) -> Option<T> {
        if channel < self.channels && column < self.width {
            Some(self.data[channel * self.width + column])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Potong ke `width` kolom pertama (re-pack baris)
    pub fn truncate(&mut self, width: usize) {
        if width >= self.width {
            return;
        }
        for c in 1..self.channels {
            let from = c * self.width;
            self.data.copy_within(from..from + width, c * width);
        }
        self.data.truncate(self.channels * width);
        self.width = width;
    }
}

/// Window read-only atas kolom `[start, end)` di segment.
///
/// Tidak ada jalur mutasi: write-protect dijamin oleh type system. Untuk
/// salinan yang bisa diubah, pakai [`Window::to_block`].
///
/// ```
/// use dataman::core::RingBuffer;
///
/// let path = std::env::temp_dir().join(format!("dataman_doc_copy_{}.shm", std::process::id()));
/// let mut rb: RingBuffer<f32> = RingBuffer::create_at(&path, 2, 4).unwrap();
/// rb.write_rows(&[[1.0f32, 2.0], [3.0, 4.0]], 0).unwrap();
///
/// let mut copy = rb.read(0, 2).unwrap().to_block();
/// copy.row_mut(0)[0] = 100.0;
/// assert_eq!(rb.read(0, 2).unwrap().row(0), &[1.0, 2.0]);
/// ```
///
/// Menulis lewat window tidak lolos compile:
///
/// ```compile_fail
/// use dataman::core::RingBuffer;
///
/// let path = std::env::temp_dir().join(format!("dataman_doc_ro_{}.shm", std::process::id()));
/// let rb: RingBuffer<f32> = RingBuffer::create_at(&path, 2, 4).unwrap();
/// let window = rb.read(0, 4).unwrap();
/// window.row(0)[0] = 1.0;
/// ```
pub struct Window<'a, T> {
    ptr: *const T,
    capacity: usize,
    channels: usize,
    start: usize,
    end: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T: Sample> Window<'a, T> {
    /// # Safety
    /// `ptr` harus menunjuk ke matrix `channels × capacity` yang valid selama `'a`,
    /// dan `start <= end <= capacity`.
    pub(crate) unsafe fn new(
        ptr: *const T,
        capacity: usize,
        channels: usize,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            ptr,
            capacity,
            channels,
            start,
            end,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline(always)]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Satu channel, kolom `[start, end)`
    ///
    /// # Panics
    /// Panic jika `channel >= channels()`
    #[inline(always)]
    pub fn row(&self, channel: usize) -> &'a [T] {
        assert!(channel < self.channels, "channel {channel} out of range");
        // SAFETY: kontrak `new`, baris `channel` berada di dalam matrix
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.add(channel * self.capacity + self.start),
                self.width(),
            )
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (0..self.channels).map(move |c| self.row(c))
    }

    /// Sample di `channel`, kolom relatif terhadap `start`
    pub fn get(&self, channel: usize, column: usize) -> Option<T> {
        if channel < self.channels && column < self.width() {
            Some(self.row(channel)[column])
        } else {
            None
        }
    }

    /// Salin window ke blok owned
    pub fn to_block(&self) -> SampleBlock<T> {
        let mut data = Vec::with_capacity(self.channels * self.width());
        for row in self.rows() {
            data.extend_from_slice(row);
        }
        SampleBlock {
            channels: self.channels,
            width: self.width(),
            data,
        }
    }
}

impl<T: Sample> fmt::Debug for Window<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("columns", &(self.start..self.end))
            .field("channels", &self.channels)
            .finish()
    }
}

/// Window yang bisa ditulis (write-protect off). Butuh akses eksklusif ke view.
pub struct WindowMut<'a, T> {
    ptr: *mut T,
    capacity: usize,
    channels: usize,
    start: usize,
    end: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: Sample> WindowMut<'a, T> {
    /// # Safety
    /// Sama seperti [`Window::new`], plus tidak ada akses lain ke range ini selama `'a`.
    pub(crate) unsafe fn new(
        ptr: *mut T,
        capacity: usize,
        channels: usize,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            ptr,
            capacity,
            channels,
            start,
            end,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline(always)]
    pub fn row(&self, channel: usize) -> &[T] {
        assert!(channel < self.channels, "channel {channel} out of range");
        // SAFETY: kontrak `new`
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.add(channel * self.capacity + self.start),
                self.width(),
            )
        }
    }

    #[inline(always)]
    pub fn row_mut(&mut self, channel: usize) -> &mut [T] {
        assert!(channel < self.channels, "channel {channel} out of range");
        // SAFETY: kontrak `new`, `&mut self` mencegah alias
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ptr.add(channel * self.capacity + self.start),
                self.width(),
            )
        }
    }

    /// Isi semua channel dengan satu nilai
    pub fn fill(&mut self, value: T) {
        for c in 0..self.channels {
            self.row_mut(c).fill(value);
        }
    }
}
