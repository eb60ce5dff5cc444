//! Zero-Allocation Encoder/Decoder untuk control frame
//!
//! Encode langsung ke pre-allocated buffer, decode zero-copy dari slice.

use super::message::{ControlFrame, ControlMessage, FRAME_SIZE};
use crate::error::Result;

/// Pre-allocated encoder buffer dengan sequence counter sendiri
pub struct Encoder {
    buffer: Box<[u8]>,
    write_pos: usize,
    next_sequence: u64,
}

impl Encoder {
    /// Encoder dengan ruang untuk `frames` frame
    pub fn new(frames: usize) -> Self {
        Self {
            buffer: vec![0u8; frames * FRAME_SIZE].into_boxed_slice(),
            write_pos: 0,
            next_sequence: 1,
        }
    }

    /// Reset encoder untuk reuse (sequence tetap lanjut)
    #[inline(always)]
    pub fn reset(&mut self) {
        self.write_pos = 0;
    }

    /// Sequence yang akan dipakai frame berikutnya
    #[inline(always)]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Encode satu message. Returns slice ke frame, atau None jika buffer penuh.
    #[inline(always)]
    pub fn encode(&mut self, message: ControlMessage) -> Option<&[u8]> {
        if self.write_pos + FRAME_SIZE > self.buffer.len() {
            return None;
        }

        let start = self.write_pos;
        let frame = ControlFrame::new(message, self.next_sequence);
        frame.encode(&mut self.buffer[start..start + FRAME_SIZE]);

        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.write_pos += FRAME_SIZE;

        Some(&self.buffer[start..self.write_pos])
    }

    /// Get current buffer content
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.write_pos]
    }

    /// Available space in buffer (bytes)
    #[inline(always)]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.write_pos
    }
}

/// Zero-copy decoder. Berhenti di frame yang belum lengkap atau invalid.
pub struct Decoder<'a> {
    buffer: &'a [u8],
    read_pos: usize,
    failed: bool,
}

impl<'a> Decoder<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
            failed: false,
        }
    }

    /// Bytes yang sudah dikonsumsi oleh frame valid
    #[inline(always)]
    pub fn consumed(&self) -> usize {
        self.read_pos
    }

    /// Remaining bytes
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<ControlFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match ControlFrame::decode(&self.buffer[self.read_pos..]) {
            Ok(Some(frame)) => {
                self.read_pos += FRAME_SIZE;
                Some(Ok(frame))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
