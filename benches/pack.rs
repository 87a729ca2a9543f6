// Run with:  cargo bench --bench pack

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use led_panel_sink::codec::{pack, Frame};
use led_panel_sink::geometry::PanelGeometry;
use std::hint::black_box;

const TILES_X: u32 = 4;
const TILES_Y: u32 = 2;

fn pack_frame(c: &mut Criterion) {
    let geometry = PanelGeometry::resolve(TILES_X, TILES_Y).unwrap();
    let mut group = c.benchmark_group("pack");
    group.throughput(Throughput::Elements(geometry.pixel_count() as u64));

    group.bench_function("checkerboard", |b| {
        let width = geometry.width();
        let pixels = (0..geometry.pixel_count())
            .map(|i| if (i % width + i / width) % 2 == 0 { 255 } else { 0 })
            .collect();
        let frame = Frame::from_pixels(geometry, pixels).unwrap();

        b.iter(|| pack(black_box(&frame)));
    });

    group.finish();
}

criterion_group!(benches, pack_frame);
criterion_main!(benches);
