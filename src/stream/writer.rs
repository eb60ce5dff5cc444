//! Producer side: single-writer claim + write-then-publish
//!
//! Writer claim disimpan di control block (PID). Claim dari proses yang
//! sudah mati diambil alih; claim dari proses hidup ditolak.

use std::sync::atomic::Ordering;

use tracing::{debug, info, trace, warn};

use crate::core::{process_alive, RingBuffer, Sample, SampleBlock, SegmentHandle, StreamState};
use crate::error::{BufferError, Result};

pub struct StreamWriter<T: Sample> {
    buffer: RingBuffer<T>,
    cursor: usize,
    pid: u32,
    stopped: bool,
}

impl<T: Sample> StreamWriter<T> {
    /// Claim segment sebagai satu-satunya writer. Lanjut dari cursor yang sudah dipublish.
    pub fn new(buffer: RingBuffer<T>) -> Result<Self> {
        let pid = std::process::id();
        let control = buffer.segment().control();

        loop {
            match control
                .writer_pid
                .compare_exchange(0, pid, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) if process_alive(current) => {
                    return Err(BufferError::WriterActive(current));
                }
                Err(stale) => {
                    warn!(stale_pid = stale, "taking over writer claim from a dead process");
                    if control
                        .writer_pid
                        .compare_exchange(stale, pid, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        control
            .state
            .store(StreamState::Streaming as u32, Ordering::Release);

        let cursor = buffer.published_cursor();
        info!(
            handle = %buffer.handle(),
            pid,
            cursor,
            capacity = buffer.capacity(),
            "stream writer started"
        );

        Ok(Self {
            buffer,
            cursor,
            pid,
            stopped: false,
        })
    }

    pub fn buffer(&self) -> &RingBuffer<T> {
        &self.buffer
    }

    pub fn handle(&self) -> &SegmentHandle {
        self.buffer.handle()
    }

    /// Kolom berikutnya yang akan ditulis (== cursor yang dipublish)
    #[inline(always)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Sisa kolom sebelum buffer penuh
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.capacity() - self.cursor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Tulis blok di cursor lalu publish. Returns cursor baru.
    pub fn append(&mut self, block: &SampleBlock<T>) -> Result<usize> {
        if self.stopped {
            return Err(BufferError::Config("stream writer already stopped".into()));
        }

        self.buffer.write(block, self.cursor)?;
        let end = self.cursor + block.width();
        self.buffer.publish(end)?;
        self.cursor = end;

        trace!(cursor = end, "columns published");
        Ok(end)
    }

    /// Flush segment dan tandai stream selesai. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        self.buffer.segment().flush()?;
        self.buffer
            .segment()
            .control()
            .state
            .store(StreamState::Stopped as u32, Ordering::Release);
        self.stopped = true;

        info!(handle = %self.buffer.handle(), cursor = self.cursor, "stream writer stopped");
        Ok(())
    }

    /// Lepas claim dan kembalikan view
    pub fn into_inner(mut self) -> RingBuffer<T> {
        self.release();
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: `this` tidak pernah di-drop, buffer dipindah keluar tepat sekali.
        // Field lain Copy, tidak ada yang bocor.
        unsafe { std::ptr::read(&this.buffer) }
    }

    fn release(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop stream writer cleanly");
        }
        let released = self.buffer.segment().control().writer_pid.compare_exchange(
            self.pid,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if released.is_ok() {
            debug!(pid = self.pid, "writer claim released");
        }
    }
}

impl<T: Sample> Drop for StreamWriter<T> {
    fn drop(&mut self) {
        self.release();
    }
}
