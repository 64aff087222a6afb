#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rqlink_fec::oti::{CommonOti, SchemeSpecificOti};
use rqlink_fec::{new_encoder, EncoderParams};
use std::time::Duration;

fn oti_codec(c: &mut Criterion) {
    c.bench_function("oti_pack_unpack", |b| {
        b.iter(|| {
            let common = CommonOti::pack(black_box(1_000_000), black_box(1280));
            let scheme = SchemeSpecificOti::pack(black_box(4), black_box(2), black_box(4));
            black_box((common.transfer_length(), scheme.num_sub_blocks()))
        })
    });
}

fn encode_symbols(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.measurement_time(Duration::from_secs(5));
    let params = EncoderParams::default();
    let t = usize::from(params.symbol_size);

    for size in [64 * 1024usize, 1024 * 1024] {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let enc = new_encoder(&data, &params).expect("encoder setup");
        let k = u32::from(enc.num_source_symbols(0));
        group.throughput(Throughput::Bytes((u64::from(k) * t as u64) / 4));

        group.bench_with_input(BenchmarkId::new("repair_quarter", size), &k, |b, &k| {
            let mut buf = vec![0u8; t];
            b.iter(|| {
                for esi in k..k + k / 4 {
                    black_box(enc.encode(0, esi, &mut buf).ok());
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, oti_codec, encode_symbols);
criterion_main!(benches);
