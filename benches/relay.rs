// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_capture::{
    cache::HostCache,
    controller::{CaptureContext, ContextConfig},
    geometry::{CaptureGeometry, PixelFormat, Rect},
    hal::Interrupts,
    relay::line_transfer,
    sim::SimRig,
};

fn geometries() -> Vec<(&'static str, CaptureGeometry, bool)> {
    let vga = CaptureGeometry::new(640, 480, PixelFormat::Rgb565);
    vec![
        ("rgb565_chained", vga, true),
        ("rgb565_per_line", vga, false),
        (
            "gray_crop",
            CaptureGeometry::new(640, 480, PixelFormat::Grayscale)
                .with_window(Rect::new(161, 120, 320, 240)),
            false,
        ),
        ("rgb565_transpose", vga.with_transpose(true), false),
    ]
}

pub fn benchmark_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    for (name, geometry, chaining) in geometries() {
        let irq = Interrupts::new();
        let rig = SimRig::new(&irq, 640, 480);
        let config = ContextConfig::default().with_chaining(chaining);
        let mut ctx = CaptureContext::new(rig.interface, rig.engine, HostCache, irq, config);
        group.bench_function(name, |b| {
            b.iter(|| {
                ctx.snapshot(&geometry).unwrap();
                ctx.release_frame();
            })
        });
    }
    group.finish();
}

pub fn benchmark_relay_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_line");
    let limits = ContextConfig::default().limits();
    for (name, geometry, _) in geometries() {
        let plan = geometry.plan(&limits).unwrap();
        let slot = vec![0x5a; plan.line_bytes];
        let mut frame = vec![0; plan.frame_bytes];
        group.bench_function(name, |b| {
            b.iter(|| {
                for line in 0..plan.lines() {
                    line_transfer(&plan, line).execute(&slot, &mut frame).unwrap();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_snapshot, benchmark_relay_line);
criterion_main!(benches);
