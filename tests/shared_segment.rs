//! Shared Segment Test - create/attach/write/read lintas mapping
//!
//! Setiap test memakai mapping terpisah untuk producer dan consumer,
//! sama seperti dua proses yang attach ke handle yang sama.
//!
//! Usage:
//!   cargo test --test shared_segment

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use dataman::core::{
    Availability, RingBuffer, SampleBlock, SampleType, Segment, SegmentHandle, PREAMBLE_SIZE,
};
use dataman::BufferError;
use proptest::prelude::*;

static NEXT: AtomicUsize = AtomicUsize::new(0);

fn test_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "dataman_it_{}_{}_{}.shm",
        tag,
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

fn sample_type() -> impl Strategy<Value = SampleType> {
    prop::sample::select(SampleType::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn attach_sees_created_header(
        channels in 1usize..16,
        capacity in 1usize..4096,
        ty in sample_type(),
    ) {
        let created = Segment::create_at(test_path("hdr"), channels, capacity, ty.name()).unwrap();
        let attached = Segment::attach(created.handle()).unwrap();

        prop_assert_eq!(attached.header(), created.header());
        prop_assert_eq!(attached.sample_type(), ty);
        prop_assert_eq!(attached.channels(), channels);
        prop_assert_eq!(attached.capacity(), capacity);
        prop_assert_eq!(attached.attached_count(), 2);
    }

    #[test]
    fn write_then_read_returns_data(
        channels in 1usize..6,
        capacity in 1usize..256,
        seed in any::<u32>(),
        split in 0.0f64..1.0,
    ) {
        let start = ((capacity - 1) as f64 * split) as usize;
        let width = capacity - start;
        let rows: Vec<Vec<i32>> = (0..channels)
            .map(|ch| (0..width).map(|i| seed.wrapping_add((ch * 7919 + i) as u32) as i32).collect())
            .collect();

        let mut producer: RingBuffer<i32> = RingBuffer::create_at(test_path("rw"), channels, capacity).unwrap();
        let consumer = RingBuffer::<i32>::attach(producer.handle()).unwrap();
        producer.write_rows(&rows, start).unwrap();

        let window = consumer.read(start, capacity).unwrap();
        prop_assert_eq!(window.to_block(), SampleBlock::from_rows(&rows).unwrap());
    }

    #[test]
    fn any_partition_reads_back_whole_buffer(
        capacity in 1usize..512,
        cuts in prop::collection::vec(0.0f64..1.0, 0..8),
    ) {
        let mut bounds: Vec<usize> = cuts.iter().map(|c| (c * capacity as f64) as usize).collect();
        bounds.push(0);
        bounds.push(capacity);
        bounds.sort_unstable();
        bounds.dedup();

        let mut producer: RingBuffer<f64> = RingBuffer::create_at(test_path("part"), 2, capacity).unwrap();
        for pair in bounds.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let rows = [
                (a..b).map(|i| i as f64).collect::<Vec<_>>(),
                (a..b).map(|i| -(i as f64)).collect::<Vec<_>>(),
            ];
            producer.write_rows(&rows, a).unwrap();
        }

        let consumer = RingBuffer::<f64>::attach(producer.handle()).unwrap();
        let whole = consumer.read(0, capacity).unwrap();
        prop_assert_eq!(whole.width(), capacity);
        for i in 0..capacity {
            prop_assert_eq!(whole.get(0, i), Some(i as f64));
            prop_assert_eq!(whole.get(1, i), Some(-(i as f64)));
        }
    }
}

#[test]
fn shape_mismatch_leaves_contents_unchanged() {
    let mut rb: RingBuffer<f32> = RingBuffer::create_at(test_path("shape"), 2, 8).unwrap();
    rb.write_rows(&[[1.0f32, 2.0], [3.0, 4.0]], 0).unwrap();

    // 3 channel ke buffer 2 channel
    let err = rb
        .write_rows(&[[9.0f32, 9.0], [9.0, 9.0], [9.0, 9.0]], 0)
        .unwrap_err();
    assert!(matches!(
        err,
        BufferError::Shape { expected: 2, found: 3, .. }
    ));

    // Row tidak rata
    let ragged: [&[f32]; 2] = [&[9.0, 9.0], &[9.0]];
    assert!(matches!(
        rb.write_rows(&ragged, 0),
        Err(BufferError::Shape { .. })
    ));

    // Lewat capacity
    assert!(matches!(
        rb.write_rows(&[[9.0f32; 4], [9.0; 4]], 6),
        Err(BufferError::Range { .. })
    ));

    let window = rb.read(0, 2).unwrap();
    assert_eq!(window.row(0), &[1.0, 2.0]);
    assert_eq!(window.row(1), &[3.0, 4.0]);
    assert_eq!(rb.read(6, 8).unwrap().row(0), &[0.0, 0.0]);
}

#[test]
fn invalid_read_ranges_fail() {
    let rb: RingBuffer<i16> = RingBuffer::create_at(test_path("range"), 1, 10).unwrap();

    for (start, end) in [(5, 5), (6, 2), (0, 11), (10, 12)] {
        assert!(
            matches!(rb.read(start, end), Err(BufferError::Range { .. })),
            "read({start}, {end}) should fail"
        );
    }
    assert!(rb.read(0, 10).is_ok());
}

#[test]
fn attach_rejects_undersized_region() {
    let path = test_path("small");
    std::fs::write(&path, [0u8; 16]).unwrap();

    let result = Segment::attach(&SegmentHandle::from_path(&path));
    assert!(matches!(result, Err(BufferError::Attach(_))));
    std::fs::remove_file(&path).unwrap();

    // Preamble lengkap tapi body dipotong
    let created = Segment::create_at(test_path("trunc"), 4, 1000, "float64").unwrap();
    let file = OpenOptions::new()
        .write(true)
        .open(created.handle().path())
        .unwrap();
    file.set_len(PREAMBLE_SIZE as u64 + 64).unwrap();
    assert!(matches!(
        Segment::attach(created.handle()),
        Err(BufferError::Attach(_))
    ));
}

#[test]
fn attach_rejects_unknown_type_code() {
    let created = Segment::create_at(test_path("type"), 1, 8, "int16").unwrap();

    // type_code ada di offset 8 (setelah data_size u64)
    let mut file = OpenOptions::new()
        .write(true)
        .open(created.handle().path())
        .unwrap();
    file.seek(SeekFrom::Start(8)).unwrap();
    file.write_all(&99u32.to_le_bytes()).unwrap();
    file.flush().unwrap();

    assert!(matches!(
        Segment::attach(created.handle()),
        Err(BufferError::UnsupportedType(99))
    ));
}

#[test]
fn write_protected_window_is_a_snapshot_source() {
    let mut producer: RingBuffer<f32> =
        RingBuffer::create_at(test_path("protect"), 2, 15).unwrap();
    producer
        .write_rows(&[[1.0f32, 2.0], [3.0, 4.0]], 0)
        .unwrap();

    let consumer = RingBuffer::<f32>::attach(producer.handle()).unwrap();
    let mut copy = consumer.read(0, 2).unwrap().to_block();
    assert_eq!(copy.row(0), &[1.0, 2.0]);
    assert_eq!(copy.row(1), &[3.0, 4.0]);

    copy.row_mut(0)[0] = 100.0;
    copy.row_mut(1)[1] = -100.0;

    let again = consumer.read(0, 2).unwrap();
    assert_eq!(again.row(0), &[1.0, 2.0]);
    assert_eq!(again.row(1), &[3.0, 4.0]);
}

#[test]
fn mutable_window_writes_through_to_other_mappings() {
    let mut producer: RingBuffer<u16> = RingBuffer::create_at(test_path("mut"), 2, 6).unwrap();
    let consumer = RingBuffer::<u16>::attach(producer.handle()).unwrap();

    {
        let mut window = producer.read_mut(2, 5).unwrap();
        window.fill(7);
        window.row_mut(1)[0] = 42;
    }

    let window = consumer.read(0, 6).unwrap();
    assert_eq!(window.row(0), &[0, 0, 7, 7, 7, 0]);
    assert_eq!(window.row(1), &[0, 0, 42, 7, 7, 0]);
}

#[test]
fn availability_follows_published_cursor() {
    let mut producer: RingBuffer<f32> = RingBuffer::create_at(test_path("avail"), 1, 100).unwrap();
    producer.write(&SampleBlock::zeros(1, 10), 0).unwrap();
    producer.publish(10).unwrap();

    let consumer = RingBuffer::<f32>::attach(producer.handle()).unwrap();
    assert_eq!(consumer.published_cursor(), 10);
    assert_eq!(consumer.classify(5, 8), Availability::FullyAvailable);
    assert_eq!(
        consumer.classify(8, 12),
        Availability::PartiallyAvailable { cursor: 10 }
    );
    assert_eq!(consumer.classify(12, 15), Availability::NeedsLoad);
    assert_eq!(consumer.classify(90, 101), Availability::Unavailable);

    // Cursor tidak pernah mundur
    assert!(producer.publish(5).is_err());
    assert_eq!(consumer.published_cursor(), 10);
}

#[test]
fn last_detach_removes_segment() {
    let created = Segment::create_at(test_path("unlink"), 1, 4, "float32").unwrap();
    let path = created.handle().path().to_path_buf();
    let attached = Segment::attach(created.handle()).unwrap();

    drop(created);
    assert!(path.exists());
    assert_eq!(attached.attached_count(), 1);

    drop(attached);
    assert!(!path.exists());
}
