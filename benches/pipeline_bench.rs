use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ossenc::streaming::{Cipher, Receiver, Sender};

const KEY: [u8; 32] = [0x17; 32];

fn make_payload(len: usize) -> Vec<u8> {
    // Half text-like, half noise, roughly what a database dump compresses like.
    let mut state = 1u32;
    (0..len)
        .map(|i| {
            if (i / 4096) % 2 == 0 {
                b"INSERT INTO t VALUES (1, 'abc');\n"[i % 33]
            } else {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            }
        })
        .collect()
}

fn cipher(encrypt: bool) -> Option<Cipher> {
    encrypt.then(|| Cipher::new(&KEY).unwrap())
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024].iter() {
        let payload = make_payload(*size);
        group.throughput(Throughput::Bytes(*size as u64));

        for encrypt in [false, true] {
            let label = if encrypt { "zlib+aes" } else { "zlib" };
            group.bench_with_input(BenchmarkId::new(label, size), &payload, |b, payload| {
                b.iter(|| {
                    let (_, out) = Sender::new(cipher(encrypt))
                        .run(&mut &payload[..], Vec::with_capacity(payload.len()))
                        .unwrap();
                    black_box(out)
                });
            });
        }
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024].iter() {
        let payload = make_payload(*size);
        group.throughput(Throughput::Bytes(*size as u64));

        for encrypt in [false, true] {
            let label = if encrypt { "zlib+aes" } else { "zlib" };
            let (_, wire) = Sender::new(cipher(encrypt))
                .run(&mut &payload[..], Vec::new())
                .unwrap();
            group.bench_with_input(BenchmarkId::new(label, size), &wire, |b, wire| {
                b.iter(|| {
                    let mut out = Vec::with_capacity(*size);
                    Receiver::new(cipher(encrypt))
                        .run(&wire[..], &mut out)
                        .unwrap();
                    black_box(out)
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
