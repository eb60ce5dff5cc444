//! Control Frame Format (fixed 32 bytes)
//!
//! Layout (little-endian):
//! ┌────────┬─────────┬──────┬───────┬──────────┬──────────────┬───────┐
//! │ magic  │ version │ kind │ flags │ sequence │ timestamp_ns │ value │
//! │ u32    │ u8      │ u8   │ u16   │ u64      │ u64          │ u64   │
//! └────────┴─────────┴──────┴───────┴──────────┴──────────────┴───────┘
//!
//! Control plane hanya membawa perintah (stop, seek, position), tidak
//! pernah data sample. Data sample selalu lewat shared segment.

use crate::error::{BufferError, Result};

pub const FRAME_SIZE: usize = 32;
pub const MAGIC: u32 = 0x444D_4354; // "DMCT"
pub const VERSION: u8 = 1;

/// Tipe frame di wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Stop = 1,
    Seek = 2,
    Position = 3,
    Heartbeat = 4,
    Ack = 5,
}

impl FrameKind {
    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Stop),
            2 => Some(Self::Seek),
            3 => Some(Self::Position),
            4 => Some(Self::Heartbeat),
            5 => Some(Self::Ack),
            _ => None,
        }
    }
}

/// Perintah dari consumer ke producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Hentikan stream, producer flush dan set state Stopped
    Stop,
    /// Pindahkan posisi baca source (sample index di source)
    Seek(u64),
    /// Posisi baca consumer di buffer, dipakai untuk throttling look-ahead
    Position(u64),
    Heartbeat,
    /// Balasan heartbeat, membawa sequence yang di-ack
    Ack(u64),
}

impl ControlMessage {
    #[inline(always)]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Stop => FrameKind::Stop,
            Self::Seek(_) => FrameKind::Seek,
            Self::Position(_) => FrameKind::Position,
            Self::Heartbeat => FrameKind::Heartbeat,
            Self::Ack(_) => FrameKind::Ack,
        }
    }

    #[inline(always)]
    pub fn value(&self) -> u64 {
        match *self {
            Self::Seek(v) | Self::Position(v) | Self::Ack(v) => v,
            Self::Stop | Self::Heartbeat => 0,
        }
    }

    #[inline(always)]
    pub fn from_parts(kind: FrameKind, value: u64) -> Self {
        match kind {
            FrameKind::Stop => Self::Stop,
            FrameKind::Seek => Self::Seek(value),
            FrameKind::Position => Self::Position(value),
            FrameKind::Heartbeat => Self::Heartbeat,
            FrameKind::Ack => Self::Ack(value),
        }
    }
}

/// Frame lengkap setelah decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    pub flags: u16,
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub message: ControlMessage,
}

impl ControlFrame {
    pub fn new(message: ControlMessage, sequence: u64) -> Self {
        Self {
            flags: 0,
            sequence,
            timestamp_ns: now_ns(),
            message,
        }
    }

    /// Serialize ke `buf[..FRAME_SIZE]`
    ///
    /// # Panics
    /// Panic jika `buf` lebih pendek dari `FRAME_SIZE`
    #[inline(always)]
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4] = VERSION;
        buf[5] = self.message.kind() as u8;
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.sequence.to_le_bytes());
        buf[16..24].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[24..32].copy_from_slice(&self.message.value().to_le_bytes());
    }

    /// Parse satu frame. `Ok(None)` jika byte belum lengkap.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < FRAME_SIZE {
            return Ok(None);
        }

        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(raw)
        };

        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Err(BufferError::Protocol(format!("bad frame magic {magic:#010x}")));
        }
        if buf[4] != VERSION {
            return Err(BufferError::Protocol(format!(
                "unsupported frame version {}",
                buf[4]
            )));
        }
        let kind = FrameKind::from_u8(buf[5])
            .ok_or_else(|| BufferError::Protocol(format!("unknown frame kind {}", buf[5])))?;

        Ok(Some(Self {
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            sequence: u64_at(8),
            timestamp_ns: u64_at(16),
            message: ControlMessage::from_parts(kind, u64_at(24)),
        }))
    }
}

/// Timestamp saat ini dalam nanoseconds
#[inline(always)]
pub fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = ControlFrame::new(ControlMessage::Seek(123_456), 7);
        let mut buf = [0u8; FRAME_SIZE];
        frame.encode(&mut buf);

        let parsed = ControlFrame::decode(&buf).unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = [0u8; FRAME_SIZE];
        ControlFrame::new(ControlMessage::Stop, 1).encode(&mut buf);
        assert_eq!(ControlFrame::decode(&buf[..FRAME_SIZE - 1]).unwrap(), None);
    }

    #[test]
    fn test_invalid_frames() {
        let mut buf = [0u8; FRAME_SIZE];
        ControlFrame::new(ControlMessage::Heartbeat, 1).encode(&mut buf);

        let mut bad_magic = buf;
        bad_magic[0] ^= 0xFF;
        assert!(matches!(
            ControlFrame::decode(&bad_magic),
            Err(BufferError::Protocol(_))
        ));

        let mut bad_kind = buf;
        bad_kind[5] = 99;
        assert!(matches!(
            ControlFrame::decode(&bad_kind),
            Err(BufferError::Protocol(_))
        ));
    }

    #[test]
    fn test_message_values() {
        assert_eq!(ControlMessage::Position(42).value(), 42);
        assert_eq!(ControlMessage::Stop.value(), 0);
        assert_eq!(
            ControlMessage::from_parts(FrameKind::Ack, 9),
            ControlMessage::Ack(9)
        );
    }
}
