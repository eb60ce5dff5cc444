//! Connection handling dengan buffered I/O
//!
//! Pre-allocated buffers untuk zero-allocation pada hot path. mio memakai
//! edge-triggered readiness, jadi read dilakukan sampai `WouldBlock`.

use std::io::{self, Read, Write};

use mio::net::TcpStream;

/// Control frame kecil, 4KB cukup untuk ratusan frame
const READ_BUFFER_SIZE: usize = 4 * 1024;
const WRITE_BUFFER_SIZE: usize = 4 * 1024;

/// Hasil satu kali [`Connection::fill_read_buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Socket sudah `WouldBlock`, tidak ada data tersisa
    Drained,
    /// Buffer penuh sebelum `WouldBlock`: masih ada data di socket
    Full,
    /// Peer menutup koneksi
    Closed,
}

/// Non-blocking connection wrapper
pub struct Connection {
    stream: TcpStream,
    read_buffer: Box<[u8]>,
    write_buffer: Box<[u8]>,
    read_pos: usize,
    read_len: usize,
    write_pos: usize,
}

impl Connection {
    /// Wrap mio TcpStream dengan buffered I/O
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        // Disable Nagle's algorithm: frame kecil harus langsung terkirim
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            read_buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            write_buffer: vec![0u8; WRITE_BUFFER_SIZE].into_boxed_slice(),
            read_pos: 0,
            read_len: 0,
            write_pos: 0,
        })
    }

    /// Read data yang tersedia ke internal buffer.
    ///
    /// [`ReadState::Full`] berarti socket belum habis dibaca. Dengan
    /// edge-triggered readiness tidak akan ada event baru untuk sisa data
    /// itu, jadi caller harus consume lalu memanggil ini lagi. Data yang
    /// sempat dibaca sebelum [`ReadState::Closed`] tetap ada di
    /// [`Connection::readable`].
    pub fn fill_read_buffer(&mut self) -> io::Result<ReadState> {
        // Compact buffer jika perlu
        if self.read_pos > 0 {
            self.read_buffer.copy_within(self.read_pos..self.read_len, 0);
            self.read_len -= self.read_pos;
            self.read_pos = 0;
        }

        while self.read_len < self.read_buffer.len() {
            match self.stream.read(&mut self.read_buffer[self.read_len..]) {
                Ok(0) => return Ok(ReadState::Closed),
                Ok(n) => self.read_len += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadState::Drained),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(ReadState::Full)
    }

    /// Get readable data slice (zero-copy)
    #[inline(always)]
    pub fn readable(&self) -> &[u8] {
        &self.read_buffer[self.read_pos..self.read_len]
    }

    /// Consume n bytes dari read buffer
    #[inline(always)]
    pub fn consume(&mut self, n: usize) {
        self.read_pos += n.min(self.read_len - self.read_pos);
    }

    /// Queue data untuk write (copy ke write buffer)
    pub fn queue_write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.write_pos + data.len() > self.write_buffer.len() {
            self.flush_write_buffer()?;
        }
        if self.write_pos + data.len() > self.write_buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "control write buffer full",
            ));
        }

        self.write_buffer[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
        Ok(())
    }

    /// Flush write buffer ke socket (partial write di-compact)
    pub fn flush_write_buffer(&mut self) -> io::Result<()> {
        let mut written = 0;
        while written < self.write_pos {
            match self.stream.write(&self.write_buffer[written..self.write_pos]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Failed to write to socket",
                    ));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if written > 0 {
            self.write_buffer.copy_within(written..self.write_pos, 0);
            self.write_pos -= written;
        }
        Ok(())
    }

    /// Underlying stream untuk registrasi di mio registry
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Bytes pending in write buffer
    #[inline(always)]
    pub fn write_pending(&self) -> usize {
        self.write_pos
    }
}
