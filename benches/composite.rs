use criterion::{criterion_group, criterion_main, Criterion};
use displayd::gfx::font::Font;
use displayd::proto::CrtcMode;
use displayd::scene::Display;

fn bench_full_composite(c: &mut Criterion) {
    let mode = CrtcMode { view_xres: 1920, view_yres: 1080, fb_format: 32 };
    let font = Font::from_blob(&vec![0x55u8; 4096]).expect("font blob");
    let mut display = Display::new(mode, font, 1, "terminal".into()).expect("display");

    for i in 0..4u32 {
        let key = display.create_window(1, i).expect("window");
        display.resize_window(key, 640, 480);
        let pixels = vec![0x40u8; 640 * 480 * 4];
        display.render_window(key, 0, 0, 640, 480, &pixels);
    }
    while display.pop_event().is_some() {}

    c.bench_function("composite_1080p_4_windows", |b| {
        b.iter(|| {
            display.schedule_redraw();
            display.composite();
        })
    });
}

criterion_group!(benches, bench_full_composite);
criterion_main!(benches);
