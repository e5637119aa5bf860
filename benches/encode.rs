// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_capture::{
    cache::HostCache,
    controller::{CaptureContext, ContextConfig},
    geometry::{CaptureGeometry, PixelFormat},
    hal::Interrupts,
    image::encode_jpeg,
    sim::SimRig,
};

pub fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("jpeg");
    for (width, height) in [(160, 120), (320, 240), (640, 480), (1280, 720)] {
        for format in [PixelFormat::Grayscale, PixelFormat::Rgb565] {
            let irq = Interrupts::new();
            let rig = SimRig::new(&irq, width, height);
            let config = ContextConfig::default()
                .with_buffer_bytes((width * height * 2) as usize)
                .with_line_slot_bytes((width * 2) as usize);
            let mut ctx = CaptureContext::new(rig.interface, rig.engine, HostCache, irq, config);
            let img = ctx
                .snapshot(&CaptureGeometry::new(width, height, format))
                .unwrap();
            group.bench_with_input(format!("{width}x{height}_{format}"), &img, |b, img| {
                b.iter(|| encode_jpeg(img, 85).unwrap())
            });
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_encode);
criterion_main!(benches);
