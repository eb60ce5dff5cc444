//! Protocol Layer: Control Frame Encoding
//!
//! Prinsip desain:
//! - Flat Binary: Frame fixed 32 bytes, di-parse posisional
//! - Command only: Tidak ada sample data di control plane
//! - No allocation: Encode/decode langsung ke/dari buffer

mod encoder;
mod message;

pub use encoder::{Decoder, Encoder};
pub use message::{now_ns, ControlFrame, ControlMessage, FrameKind, FRAME_SIZE, MAGIC, VERSION};
