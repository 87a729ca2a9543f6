// Run with:  cargo bench --bench shift_row

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use led_panel_sink::codec::PackedFrame;
use led_panel_sink::geometry::PanelGeometry;
use led_panel_sink::lines::NullLines;
use led_panel_sink::render::{Renderer, ScanTiming};
use led_panel_sink::wiring::Wiring;
use std::hint::black_box;

const TILES_X: u32 = 4;
const TILES_Y: u32 = 2;

fn shift_row(c: &mut Criterion) {
    let geometry = PanelGeometry::resolve(TILES_X, TILES_Y).unwrap();
    let timing = ScanTiming::new(200, &geometry).unwrap();
    let bytes = (0..geometry.packed_size()).map(|i| i as u8).collect();
    let frame = PackedFrame::from_bytes(geometry, bytes).unwrap();

    let mut group = c.benchmark_group("shift_row");
    group.throughput(Throughput::Bytes(geometry.packed_size() as u64));

    group.bench_function("all_rows_null_lines", |b| {
        let mut lines = NullLines;
        let mut renderer = Renderer::new(&mut lines, geometry, &Wiring::default(), timing).unwrap();

        b.iter(|| {
            for row in 0..geometry.height() {
                renderer.select_row(row);
                renderer.shift_columns(black_box(frame.row(&geometry, row)));
                renderer.latch();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, shift_row);
criterion_main!(benches);
