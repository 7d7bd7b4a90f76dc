//! I420 to YUY2 conversion throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pixmux_video::colorspace::{i420_to_yuy2, Planes};

fn bench_i420_to_yuy2(c: &mut Criterion) {
    let mut group = c.benchmark_group("i420_to_yuy2");
    for (width, height) in [(1280usize, 720usize), (1920, 1080)] {
        let y = vec![0x50u8; width * height];
        let u = vec![0x5au8; width * height / 4];
        let v = vec![0xf0u8; width * height / 4];
        let mut dst = vec![0u8; width * height * 2];

        group.throughput(Throughput::Bytes((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(width, height),
            |b, &(width, height)| {
                let planes = Planes {
                    y: &y,
                    u: &u,
                    v: &v,
                    luma_stride: width,
                    chroma_stride: width / 2,
                };
                b.iter(|| {
                    i420_to_yuy2(black_box(&mut dst), width * 2, black_box(&planes), width, height)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_i420_to_yuy2);
criterion_main!(benches);
