use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lumen_shm::{FrameReader, FrameWriter, ReadMode, RingGeometry};

fn temp_ring_path(tag: &str) -> String {
    format!(
        "{}/lumen_bench_{tag}_{}",
        std::env::temp_dir().display(),
        std::process::id()
    )
}

fn bench_read_latest(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_latest");

    for &size in &[16 * 1024usize, 256 * 1024, 2 * 1024 * 1024] {
        let path = temp_ring_path(&format!("read_{size}"));
        let mut writer = FrameWriter::create(&path, RingGeometry::default())
            .expect("failed to create writer");
        writer
            .write_frame(&vec![0x5Au8; size], 1920, 1080)
            .expect("frame fits");

        group.throughput(Throughput::Bytes(size as u64));

        for mode in [ReadMode::BestEffort, ReadMode::Validated] {
            let mut reader =
                FrameReader::open_with_mode(&path, mode).expect("failed to open reader");
            group.bench_with_input(BenchmarkId::new(format!("{mode:?}"), size), &size, |b, _| {
                b.iter(|| black_box(reader.read_latest_frame().expect("read")));
            });
        }

        drop(writer);
        let _ = std::fs::remove_file(&path);
    }

    group.finish();
}

fn bench_empty_poll(c: &mut Criterion) {
    let path = temp_ring_path("empty");
    let _writer =
        FrameWriter::create(&path, RingGeometry::new(4, 4096)).expect("failed to create writer");
    let mut reader = FrameReader::open(&path).expect("failed to open reader");

    c.bench_function("read_latest (empty)", |b| {
        b.iter(|| black_box(reader.read_latest_frame().expect("read")));
    });

    c.bench_function("write_index", |b| {
        b.iter(|| black_box(reader.write_index()));
    });

    drop(reader);
    let _ = std::fs::remove_file(&path);
}

fn bench_write_frame(c: &mut Criterion) {
    let path = temp_ring_path("write");
    let mut writer =
        FrameWriter::create(&path, RingGeometry::default()).expect("failed to create writer");
    let frame = vec![0xA5u8; 256 * 1024];

    let mut group = c.benchmark_group("write_frame");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("256KiB", |b| {
        b.iter(|| writer.write_frame(black_box(&frame), 1920, 1080).expect("write"));
    });
    group.finish();

    drop(writer);
    let _ = std::fs::remove_file(&path);
}

criterion_group!(benches, bench_read_latest, bench_empty_poll, bench_write_frame);
criterion_main!(benches);
