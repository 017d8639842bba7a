use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

use zfx_permafrost::channel::FrameCodec;

/// A payload shaped like the fabric's real traffic: repetitive key-value batches.
fn kv_batch(entries: usize) -> Bytes {
    let mut payload = Vec::with_capacity(entries * 48);
    for i in 0..entries {
        payload.extend_from_slice(format!("/table/42/row/{:012}", i).as_bytes());
        payload.extend_from_slice(b"=value-");
        payload.extend_from_slice(&(i as u64).to_le_bytes());
    }
    Bytes::from(payload)
}

fn run_codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    for entries in [64, 1024, 16384] {
        let payload = kv_batch(entries);
        group.throughput(Throughput::Bytes(payload.len() as u64));

        group.bench_with_input(BenchmarkId::new("plain", entries), &payload, |b, payload| {
            let mut codec = FrameCodec::plain();
            b.iter(|| {
                let mut wire = BytesMut::new();
                codec.encode(payload.clone(), &mut wire).unwrap();
                codec.decode(&mut wire).unwrap().unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("snappy", entries), &payload, |b, payload| {
            let mut codec = FrameCodec::snappy();
            b.iter(|| {
                let mut wire = BytesMut::new();
                codec.encode(payload.clone(), &mut wire).unwrap();
                codec.decode(&mut wire).unwrap().unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, run_codec_benchmark);
criterion_main!(benches);
