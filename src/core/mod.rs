//! Core module: Shared Sample Buffer dengan Mmap backing
//!
//! Prinsip desain:
//! - Zero-Copy: Producer dan consumer memetakan byte yang sama
//! - Lock-Free: Cursor atomic (Release/Acquire), tidak ada Mutex lintas proses
//! - No-Allocation: Segment di-allocate sekali saat create

mod availability;
mod layout;
mod ring_buffer;
mod sample_type;
mod segment;
mod window;

pub use availability::{classify, Availability};
pub use layout::{
    segment_size, BufferHeader, StreamState, ATTACHER_SLOTS, HEADER_SIZE, LAYOUT_VERSION, MAGIC,
    PREAMBLE_SIZE,
};
pub use ring_buffer::RingBuffer;
pub use sample_type::{Sample, SampleType, TypeEntry, REGISTRY};
pub use segment::{Segment, SegmentHandle};
pub use window::{SampleBlock, Window, WindowMut};

pub(crate) use segment::process_alive;
