use thiserror::Error;

use crate::core::Availability;

/// All errors produced by the shared sample buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("invalid buffer configuration: {0}")]
    Config(String),

    #[error("cannot attach segment: {0}")]
    Attach(String),

    #[error("unsupported sample type code {0}")]
    UnsupportedType(u32),

    #[error("shape mismatch: expected {expected} {what}, got {found}")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("column range {start}..{end} is invalid for capacity {capacity}")]
    Range {
        start: usize,
        end: usize,
        capacity: usize,
    },

    #[error("sample type mismatch: segment holds {segment}, view requested {requested}")]
    TypeMismatch {
        segment: &'static str,
        requested: &'static str,
    },

    #[error("segment already has an active writer (pid {0})")]
    WriterActive(u32),

    #[error("columns {start}..{end} are not readable yet ({availability:?})")]
    NotAvailable {
        start: usize,
        end: usize,
        availability: Availability,
    },

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BufferError>;
