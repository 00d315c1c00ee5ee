use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::io::Cursor;

use base64plus::base64::{decode_stream, encode_stream};
use base64plus::frame::{EncodeOptions, decode_framed, encode_framed_seekable};

/// Create test data of the given size for benchmarking.
fn make_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn label(size: usize) -> String {
    if size >= 1024 * 1024 {
        format!("{}MB", size / (1024 * 1024))
    } else {
        format!("{}KB", size / 1024)
    }
}

const SIZES: [usize; 3] = [64 * 1024, 1024 * 1024, 10 * 1024 * 1024];

fn bench_encode(c: &mut Criterion) {
    let opts = EncodeOptions::default();
    let mut group = c.benchmark_group("encode");
    for &size in &SIZES {
        let data = make_test_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("raw", label(size)), &data, |b, data| {
            b.iter(|| {
                let mut out = Vec::with_capacity(size * 4 / 3 + size / 48 + 8);
                encode_stream(&mut Cursor::new(data), &mut out, 64).unwrap();
                out
            });
        });

        group.bench_with_input(BenchmarkId::new("framed", label(size)), &data, |b, data| {
            b.iter(|| {
                let mut out = Vec::with_capacity(size * 4 / 3 + size / 48 + 128);
                encode_framed_seekable(&mut Cursor::new(data), &mut out, "bench.bin", &opts)
                    .unwrap();
                out
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let opts = EncodeOptions::default();
    let mut group = c.benchmark_group("decode");
    for &size in &SIZES {
        let data = make_test_data(size);
        let mut raw = Vec::new();
        encode_stream(&mut Cursor::new(&data), &mut raw, 64)
            .unwrap();
        let mut framed = Vec::new();
        encode_framed_seekable(&mut Cursor::new(&data), &mut framed, "bench.bin", &opts)
            .unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("raw", label(size)), &raw, |b, raw| {
            b.iter(|| {
                let mut out = Vec::with_capacity(size);
                decode_stream(&mut Cursor::new(raw), &mut out).unwrap();
                out
            });
        });

        group.bench_with_input(BenchmarkId::new("framed", label(size)), &framed, |b, framed| {
            b.iter(|| {
                let mut out = Vec::with_capacity(size);
                let sink = &mut out;
                let report = decode_framed(&framed[..], move |_| Ok(sink)).unwrap();
                assert!(report.matches());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
