//! Network Layer: Control Plane
//!
//! Menggunakan mio untuk non-blocking I/O di sisi producer.
//!
//! Fitur:
//! - Non-blocking I/O dengan epoll/kqueue/IOCP
//! - Poll dengan timeout, dipanggil dari loop producer
//! - Client blocking sederhana untuk consumer

mod client;
mod connection;
mod server;

pub use client::ControlClient;
pub use connection::{Connection, ReadState};
pub use server::ControlServer;
