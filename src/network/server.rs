//! Control Server dengan event-driven I/O (sisi producer)
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing. Producer memanggil
//! [`ControlServer::poll`] di sela-sela write, tanpa thread tambahan.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use super::{Connection, ReadState};
use crate::error::Result;
use crate::protocol::{ControlMessage, Decoder, Encoder, FRAME_SIZE};

const SERVER_TOKEN: Token = Token(0);
const MAX_CONNECTIONS: usize = 64;
const EVENTS_CAPACITY: usize = 128;

/// Non-blocking control server
///
/// - Accept banyak consumer sekaligus
/// - Decode control frame, return perintah ke caller
/// - Heartbeat langsung dibalas dengan Ack
pub struct ControlServer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    // Pre-allocated encoder untuk Ack
    encoder: Encoder,
}

impl ControlServer {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;

        poll.registry()
            .register(&mut listener, SERVER_TOKEN, Interest::READABLE)?;

        info!(addr = %listener.local_addr()?, "control server listening");

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            connections: HashMap::with_capacity(MAX_CONNECTIONS),
            next_token: 1,
            encoder: Encoder::new(EVENTS_CAPACITY),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Poll sekali (maksimal `timeout`), return perintah yang masuk
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<ControlMessage>> {
        let mut commands = Vec::new();

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(commands),
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable() || e.is_read_closed(), e.is_writable()))
            .collect();

        for (token, readable, writable) in ready {
            if token == SERVER_TOKEN {
                self.accept_connections()?;
                continue;
            }
            if readable {
                self.handle_read(token, &mut commands);
            }
            if writable {
                self.handle_write(token);
            }
        }

        Ok(commands)
    }

    /// Accept new connections
    fn accept_connections(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.connections.len() >= MAX_CONNECTIONS {
                        warn!(%addr, "max control connections reached, rejecting");
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    let mut conn = Connection::new(stream)?;
                    self.poll.registry().register(
                        conn.stream_mut(),
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;

                    self.connections.insert(token, conn);
                    debug!(%addr, ?token, "control connection accepted");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Handle readable event
    ///
    /// Fill, decode, dan consume diulang sampai socket habis: event
    /// berikutnya tidak akan datang untuk data yang tertinggal di socket.
    fn handle_read(&mut self, token: Token, commands: &mut Vec<ControlMessage>) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut acks = Vec::new();
        let mut broken = false;
        let mut state;

        loop {
            state = match conn.fill_read_buffer() {
                Ok(state) => state,
                Err(e) => {
                    warn!(?token, error = %e, "control read failed");
                    self.close(token);
                    return;
                }
            };

            let mut consumed = 0;
            for frame in Decoder::new(conn.readable()) {
                match frame {
                    Ok(frame) => {
                        consumed += FRAME_SIZE;
                        match frame.message {
                            ControlMessage::Heartbeat => acks.push(frame.sequence),
                            ControlMessage::Ack(_) => {}
                            message => commands.push(message),
                        }
                    }
                    Err(e) => {
                        warn!(?token, error = %e, "dropping control connection");
                        broken = true;
                    }
                }
            }
            conn.consume(consumed);

            // Buffer penuh tanpa satu frame pun utuh tidak mungkin maju lagi
            if broken || state != ReadState::Full || consumed == 0 {
                break;
            }
        }

        for sequence in acks {
            self.encoder.reset();
            if let Some(ack) = self.encoder.encode(ControlMessage::Ack(sequence)) {
                if let Err(e) = conn.queue_write(ack) {
                    warn!(?token, error = %e, "failed to queue ack");
                }
            }
        }
        if let Err(e) = conn.flush_write_buffer() {
            warn!(?token, error = %e, "control write failed");
            broken = true;
        }

        if broken || state == ReadState::Closed {
            self.close(token);
        }
    }

    /// Handle writable event
    fn handle_write(&mut self, token: Token) {
        if let Some(conn) = self.connections.get_mut(&token) {
            if conn.write_pending() > 0 {
                if let Err(e) = conn.flush_write_buffer() {
                    warn!(?token, error = %e, "control write failed");
                    self.close(token);
                }
            }
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            self.poll.registry().deregister(conn.stream_mut()).ok();
            debug!(?token, "control connection closed");
        }
    }
}
