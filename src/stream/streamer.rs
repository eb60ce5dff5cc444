//! Streamer: pindahkan kolom dari source ke segment
//!
//! Loop producer:
//! 1. Poll perintah kontrol (Stop/Seek/Position)
//! 2. Tulis satu blok dari source, publish
//! 3. Berhenti di Full, Exhausted, atau Stopped, lalu stop writer

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use tracing::{debug, info};

use crate::core::{Sample, SampleBlock};
use crate::error::{BufferError, Result};
use crate::network::ControlServer;
use crate::protocol::ControlMessage;

use super::contract::SampleSource;
use super::writer::StreamWriter;

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Kolom maksimal per append
    pub block_width: usize,
    /// Batas kolom di depan posisi consumer (None = tanpa throttle)
    pub lookahead: Option<usize>,
    /// Timeout poll perintah saat throttled
    pub idle: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            block_width: 1024,
            lookahead: None,
            idle: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// n kolom ditulis dan dipublish
    Wrote(usize),
    /// Sudah terlalu jauh di depan consumer
    Throttled,
    /// Cursor == capacity
    Full,
    /// Source habis
    Exhausted,
    /// Stop diminta lewat control plane
    Stopped,
}

impl StepOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Full | Self::Exhausted | Self::Stopped)
    }
}

/// Asal perintah kontrol untuk [`Streamer::run`]
pub trait CommandSource {
    fn poll_commands(&mut self, timeout: Option<Duration>) -> Result<Vec<ControlMessage>>;
}

impl CommandSource for ControlServer {
    fn poll_commands(&mut self, timeout: Option<Duration>) -> Result<Vec<ControlMessage>> {
        self.poll(timeout)
    }
}

/// In-process channel. Sender yang sudah di-drop diperlakukan sebagai Stop.
impl CommandSource for Receiver<ControlMessage> {
    fn poll_commands(&mut self, timeout: Option<Duration>) -> Result<Vec<ControlMessage>> {
        let mut commands = Vec::new();

        match timeout {
            Some(t) if !t.is_zero() => match self.recv_timeout(t) {
                Ok(msg) => commands.push(msg),
                Err(RecvTimeoutError::Timeout) => return Ok(commands),
                Err(RecvTimeoutError::Disconnected) => return Ok(vec![ControlMessage::Stop]),
            },
            _ => {}
        }

        loop {
            match self.try_recv() {
                Ok(msg) => commands.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    commands.push(ControlMessage::Stop);
                    break;
                }
            }
        }
        Ok(commands)
    }
}

/// Tanpa control plane: tulis sampai Full atau Exhausted
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommands;

impl CommandSource for NoCommands {
    fn poll_commands(&mut self, timeout: Option<Duration>) -> Result<Vec<ControlMessage>> {
        if let Some(t) = timeout {
            std::thread::sleep(t);
        }
        Ok(Vec::new())
    }
}

pub struct Streamer<T: Sample, S: SampleSource<T>> {
    writer: StreamWriter<T>,
    source: S,
    config: StreamerConfig,
    block: SampleBlock<T>,
    source_position: u64,
    consumer_position: Option<u64>,
    stop_requested: bool,
}

impl<T: Sample, S: SampleSource<T>> Streamer<T, S> {
    pub fn new(writer: StreamWriter<T>, source: S, config: StreamerConfig) -> Result<Self> {
        let channels = writer.buffer().channels();
        if source.channels() != channels {
            return Err(BufferError::Shape {
                what: "channels",
                expected: channels,
                found: source.channels(),
            });
        }
        if config.block_width == 0 {
            return Err(BufferError::Config("block width must be non-zero".into()));
        }

        Ok(Self {
            block: SampleBlock::zeros(channels, config.block_width),
            writer,
            source,
            config,
            source_position: 0,
            consumer_position: None,
            stop_requested: false,
        })
    }

    pub fn writer(&self) -> &StreamWriter<T> {
        &self.writer
    }

    pub fn into_writer(self) -> StreamWriter<T> {
        self.writer
    }

    /// Posisi baca berikutnya di source
    pub fn source_position(&self) -> u64 {
        self.source_position
    }

    pub fn consumer_position(&self) -> Option<u64> {
        self.consumer_position
    }

    pub fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Stop => {
                debug!("stop requested");
                self.stop_requested = true;
            }
            ControlMessage::Seek(position) => {
                debug!(from = self.source_position, to = position, "source seek");
                self.source_position = position;
            }
            ControlMessage::Position(position) => {
                self.consumer_position = Some(position);
            }
            ControlMessage::Heartbeat | ControlMessage::Ack(_) => {}
        }
    }

    /// Satu iterasi: isi blok dari source lalu append
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.stop_requested {
            return Ok(StepOutcome::Stopped);
        }

        let remaining = self.writer.remaining();
        if remaining == 0 {
            return Ok(StepOutcome::Full);
        }

        let mut width = self.config.block_width.min(remaining);
        if let Some(lookahead) = self.config.lookahead {
            // Position datang dari network, bisa bernilai apa saja
            let consumer =
                usize::try_from(self.consumer_position.unwrap_or(0)).unwrap_or(usize::MAX);
            let limit = consumer.saturating_add(lookahead);
            let ahead = limit.saturating_sub(self.writer.cursor());
            if ahead == 0 {
                return Ok(StepOutcome::Throttled);
            }
            width = width.min(ahead);
        }

        if self.block.width() != width {
            self.block = SampleBlock::zeros(self.block.channels(), width);
        }

        let filled = self
            .source
            .fill(self.source_position, &mut self.block)?
            .min(width);
        if filled == 0 {
            return Ok(StepOutcome::Exhausted);
        }
        if filled < width {
            self.block.truncate(filled);
        }

        self.writer.append(&self.block)?;
        self.source_position = self.source_position.saturating_add(filled as u64);
        Ok(StepOutcome::Wrote(filled))
    }

    /// Jalankan sampai outcome terminal, lalu stop writer.
    pub fn run<C: CommandSource + ?Sized>(&mut self, commands: &mut C) -> Result<StepOutcome> {
        let mut timeout = Some(Duration::ZERO);

        loop {
            for message in commands.poll_commands(timeout)? {
                self.handle(message);
            }

            match self.step()? {
                StepOutcome::Wrote(_) => timeout = Some(Duration::ZERO),
                StepOutcome::Throttled => timeout = Some(self.config.idle),
                outcome => {
                    self.writer.stop()?;
                    info!(
                        ?outcome,
                        cursor = self.writer.cursor(),
                        source_position = self.source_position,
                        "streamer finished"
                    );
                    return Ok(outcome);
                }
            }
        }
    }
}
