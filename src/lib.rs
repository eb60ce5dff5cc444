//! Dataman - Shared Multichannel Sample Buffer
//!
//! Arsitektur:
//! - Zero-Copy: Segment file-backed (mmap) yang dipetakan producer dan consumer
//! - Lock-Free: Cursor atomic, tidak ada lock lintas proses
//! - Type-Safe: Segment hanya lahir dari create/attach, RingBuffer<T> hanya dari Segment bertipe T
//! - Control Plane: Frame biner 32 byte untuk Stop/Seek/Position

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod protocol;
pub mod stream;

pub use crate::core::{
    Availability, RingBuffer, Sample, SampleBlock, SampleType, Segment, SegmentHandle, Window,
    WindowMut,
};
pub use crate::error::{BufferError, Result};
