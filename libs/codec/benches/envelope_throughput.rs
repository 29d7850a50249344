//! Envelope encode/decode throughput
//!
//! Tracks the cost of the tensor path relative to a scalar-only message,
//! and checks that the rejection path stays cheap for garbage input.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use types::{StateMessage, Tensor};

fn scalar_message() -> StateMessage {
    StateMessage::new()
        .with("step", 1_000_000)
        .and_then(|m| m.with("loss", 0.125))
        .and_then(|m| m.with("phase", "train"))
        .expect("static keys")
}

fn tensor_message(side: usize) -> StateMessage {
    let values: Vec<f32> = (0..side * side).map(|i| i as f32).collect();
    let tensor = Tensor::from_slice(vec![side, side], &values).expect("shape matches data");
    scalar_message().with("frame", tensor).expect("static keys")
}

fn bench_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");

    let scalar = scalar_message();
    group.bench_function("encode_scalar", |b| {
        b.iter(|| black_box(codec::encode(black_box(&scalar))))
    });

    let encoded_scalar = codec::encode(&scalar).expect("encodable");
    group.bench_function("decode_scalar", |b| {
        b.iter(|| black_box(codec::decode(black_box(&encoded_scalar))))
    });

    let frame = tensor_message(256);
    let encoded_frame = codec::encode(&frame).expect("encodable");
    group.throughput(Throughput::Bytes(encoded_frame.len() as u64));
    group.bench_function("encode_tensor_256x256", |b| {
        b.iter(|| black_box(codec::encode(black_box(&frame))))
    });
    group.bench_function("decode_tensor_256x256", |b| {
        b.iter(|| black_box(codec::decode(black_box(&encoded_frame))))
    });

    group.finish();
}

fn bench_rejection(c: &mut Criterion) {
    let garbage: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
    c.bench_function("reject_garbage_4k", |b| {
        b.iter(|| black_box(codec::decode(black_box(&garbage))))
    });
}

criterion_group!(benches, bench_encode_decode, bench_rejection);
criterion_main!(benches);
