//! Stream Stress Test - satu writer, banyak reader, mapping terpisah
//!
//! Writer thread menulis blok dengan lebar bervariasi secepat mungkin.
//! Setiap reader punya mapping sendiri dan memverifikasi bahwa setiap
//! kolom yang terlihat sudah ditulis lengkap (tidak pernah nilai awal 0).
//!
//! Usage:
//!   cargo test --release --test stream_stress -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dataman::core::{RingBuffer, SampleBlock, StreamState};
use dataman::stream::{StreamReader, StreamWriter};

const CHANNELS: usize = 4;
const CAPACITY: usize = 200_000;
const READERS: usize = 3;

/// Nilai deterministik, selalu bukan nol
fn expected(channel: usize, column: usize) -> f64 {
    (column * 16 + channel + 1) as f64
}

fn block_at(start: usize, width: usize) -> SampleBlock<f64> {
    let mut block = SampleBlock::zeros(CHANNELS, width);
    for ch in 0..CHANNELS {
        for (i, slot) in block.row_mut(ch).iter_mut().enumerate() {
            *slot = expected(ch, start + i);
        }
    }
    block
}

#[test]
fn readers_never_observe_unpublished_columns() {
    let path = std::env::temp_dir().join(format!("dataman_stress_{}.shm", std::process::id()));
    let buffer: RingBuffer<f64> = RingBuffer::create_at(&path, CHANNELS, CAPACITY).unwrap();

    let readers: Vec<StreamReader<f64>> = (0..READERS)
        .map(|_| StreamReader::attach(buffer.handle()).unwrap())
        .collect();

    let total_checked = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let writer = thread::spawn(move || {
        let mut writer = StreamWriter::new(buffer).unwrap();
        let mut width = 1;
        while writer.remaining() > 0 {
            let w = width.min(writer.remaining());
            writer.append(&block_at(writer.cursor(), w)).unwrap();
            // 1, 2, ..., 257 lalu ulang
            width = width % 257 + 1;
        }
        writer.stop().unwrap();
        writer.cursor()
    });

    let handles: Vec<_> = readers
        .into_iter()
        .enumerate()
        .map(|(id, mut reader)| {
            let total_checked = Arc::clone(&total_checked);
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(60);
                let max_width = 64 + id * 100;
                let mut windows = 0u64;

                while !reader.is_finished() {
                    assert!(Instant::now() < deadline, "reader {id} timed out");

                    let Some(window) = reader.next_window(max_width) else {
                        thread::yield_now();
                        continue;
                    };
                    for ch in 0..CHANNELS {
                        for (i, &v) in window.row(ch).iter().enumerate() {
                            let column = window.start() + i;
                            assert_eq!(
                                v,
                                expected(ch, column),
                                "reader {id}: channel {ch} column {column} not committed"
                            );
                        }
                    }
                    total_checked.fetch_add(window.width(), Ordering::Relaxed);
                    windows += 1;
                }

                assert_eq!(reader.position(), CAPACITY);
                assert_eq!(reader.state(), StreamState::Stopped);
                windows
            })
        })
        .collect();

    let written = writer.join().unwrap();
    let windows: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let elapsed = start.elapsed();

    assert_eq!(written, CAPACITY);
    assert_eq!(total_checked.load(Ordering::Relaxed), CAPACITY * READERS);

    println!("\n📊 Stream Stress Results");
    println!("   Columns:     {} x {} channels", CAPACITY, CHANNELS);
    println!("   Readers:     {}", READERS);
    println!("   Windows:     {}", windows);
    println!("   Elapsed:     {:.2?}", elapsed);
    println!(
        "   Throughput:  {:.2} M col/s",
        (CAPACITY * READERS) as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );

    // Reader terakhir yang di-drop meng-unlink segment
    assert!(!path.exists());
}
