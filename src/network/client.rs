//! Control Client (sisi consumer)
//!
//! Blocking std TCP, cukup untuk perintah jarang seperti stop/seek.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::{BufferError, Result};
use crate::protocol::{ControlFrame, ControlMessage, Encoder, FRAME_SIZE};

pub struct ControlClient {
    stream: TcpStream,
    encoder: Encoder,
}

impl ControlClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        // TCP_NODELAY: perintah harus sampai tanpa menunggu batching
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            encoder: Encoder::new(1),
        })
    }

    /// Kirim satu perintah, return sequence frame
    pub fn send(&mut self, message: ControlMessage) -> Result<u64> {
        self.encoder.reset();
        let sequence = self.encoder.next_sequence();
        let frame = self
            .encoder
            .encode(message)
            .ok_or_else(|| BufferError::Protocol("encoder buffer full".into()))?;
        self.stream.write_all(frame)?;
        Ok(sequence)
    }

    pub fn stop(&mut self) -> Result<u64> {
        self.send(ControlMessage::Stop)
    }

    pub fn seek(&mut self, source_position: u64) -> Result<u64> {
        self.send(ControlMessage::Seek(source_position))
    }

    pub fn report_position(&mut self, column: u64) -> Result<u64> {
        self.send(ControlMessage::Position(column))
    }

    /// Kirim heartbeat dan tunggu Ack yang cocok. Returns round-trip time.
    pub fn heartbeat(&mut self, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        let sequence = self.send(ControlMessage::Heartbeat)?;

        self.stream.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; FRAME_SIZE];
        loop {
            self.stream.read_exact(&mut buf)?;
            if let Some(ControlFrame {
                message: ControlMessage::Ack(acked),
                ..
            }) = ControlFrame::decode(&buf)?
            {
                if acked == sequence {
                    return Ok(started.elapsed());
                }
            }
            if started.elapsed() >= timeout {
                return Err(BufferError::Protocol(format!(
                    "no ack for heartbeat {sequence}"
                )));
            }
        }
    }
}
