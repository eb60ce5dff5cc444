//! Stream Layer: producer/consumer di atas RingBuffer
//!
//! - [`StreamWriter`]: satu writer per segment, write-then-publish
//! - [`StreamReader`]: banyak reader, masing-masing dengan posisi sendiri
//! - [`Streamer`]: loop producer yang dikendalikan lewat control plane

mod contract;
mod reader;
mod streamer;
mod synthetic;
mod writer;

pub use contract::{SampleSink, SampleSource};
pub use reader::StreamReader;
pub use streamer::{CommandSource, NoCommands, StepOutcome, Streamer, StreamerConfig};
pub use synthetic::SyntheticSource;
pub use writer::StreamWriter;
