// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::{
    error::CaptureError,
    geometry::{
        CaptureGeometry, LineAddressing, PixelFormat, Rect, TransferLimits, TransferPlan,
        DMA_BLOCK_ALIGN,
    },
    relay::line_transfer,
    sim::pattern,
};

const RAW_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Bayer,
    PixelFormat::Grayscale,
    PixelFormat::Rgb565,
    PixelFormat::Yuv422,
];

fn limits() -> TransferLimits {
    TransferLimits {
        line_slot_bytes: 256,
        frame_bytes: 4096,
        max_block_bytes: 65536,
        chaining: true,
        frame_direct_compressed: false,
    }
}

/// Run every line of `plan` through the relay geometry, the way the line
/// engine fills a slot and the copy engine drains it. Returns the frame and
/// how many times each frame byte was written.
fn relay_frame(plan: &TransferPlan) -> (Vec<u8>, Vec<u32>) {
    let mut frame = vec![0u8; plan.frame_bytes];
    let mut writes = vec![0u32; plan.frame_bytes];
    for line in 0..plan.lines() {
        let row = plan.crop.line_start + line;
        let slot: Vec<u8> = (0..plan.line_bytes)
            .map(|b| pattern(0, row, plan.crop.byte_start + b))
            .collect();
        let transfer = line_transfer(plan, line);
        transfer
            .execute(&slot, &mut frame)
            .expect("transfer stays inside slot and frame");
        for k in 0..transfer.count {
            let d = transfer.dst_offset + k * transfer.dst_stride;
            for count in &mut writes[d..d + transfer.elem_bytes] {
                *count += 1;
            }
        }
    }
    (frame, writes)
}

#[test]
fn test_crop_transpose_exhaustive() {
    let (width, height) = (8u32, 6u32);
    let mut plans = 0;
    let mut rejected = 0;
    for format in RAW_FORMATS {
        for transpose in [false, true] {
            for x in 0..width {
                for w in 1..=width - x {
                    for y in 0..height {
                        for h in 1..=height - y {
                            let geometry = CaptureGeometry::new(width, height, format)
                                .with_window(Rect::new(x, y, w, h))
                                .with_transpose(transpose);
                            let frame_bytes = (w * h) as usize * format.pixel_bytes();
                            match geometry.plan(&limits()) {
                                Ok(plan) => {
                                    check_plan(&plan);
                                    plans += 1;
                                }
                                Err(CaptureError::InvalidGeometry { .. })
                                    if frame_bytes % DMA_BLOCK_ALIGN != 0 =>
                                {
                                    rejected += 1
                                }
                                Err(e) => panic!("{geometry:?} rejected: {e}"),
                            }
                        }
                    }
                }
            }
        }
    }
    assert!(plans > 0 && rejected > 0);
    assert_eq!(plans + rejected, 4 * 2 * 36 * 21);
}

fn check_plan(plan: &TransferPlan) {
    let g = plan.geometry;
    let w = g.window;
    let bus = g.format.bus_bytes();
    let dst = g.format.pixel_bytes();

    assert_eq!(plan.crop.byte_start % 4, 0);
    assert_eq!(plan.frame_bytes % DMA_BLOCK_ALIGN, 0);
    assert_eq!(plan.line_bytes % 4, 0);
    assert!(plan.crop.byte_start + plan.line_bytes <= (g.width as usize) * bus);
    assert_eq!(plan.frame_bytes, (w.width * w.height) as usize * dst);
    let (ow, oh) = if g.transpose {
        (w.height, w.width)
    } else {
        (w.width, w.height)
    };
    assert_eq!((plan.out_width, plan.out_height), (ow, oh));

    let (frame, writes) = relay_frame(plan);
    assert!(
        writes.iter().all(|&n| n == 1),
        "{g:?}: every frame byte is written exactly once"
    );

    for line in 0..w.height as usize {
        let row = w.y + line as u32;
        for pixel in 0..w.width as usize {
            let at = plan.dst_offset(line, pixel);
            let src_byte = (w.x as usize + pixel) * bus;
            for b in 0..dst {
                assert_eq!(
                    frame[at + b],
                    pattern(0, row, src_byte + b),
                    "{g:?}: line {line} pixel {pixel} byte {b}"
                );
            }
        }
    }

    // Output coordinates: a transposed frame stores source (line, pixel) at
    // row `pixel`, column `line`.
    if g.transpose {
        assert_eq!(plan.dst_offset(1, 0), dst);
        assert_eq!(plan.dst_offset(0, 1), w.height as usize * dst);
    }

    if plan.chained {
        assert!(!g.transpose && bus == dst && plan.crop_remainder == 0);
        assert_eq!(plan.addressing, LineAddressing::CircularRepeat);
        let step = w.width as usize * dst;
        let template = line_transfer(plan, 1);
        for line in 1..plan.lines() {
            assert_eq!(
                template.advanced(step * (line as usize - 1)),
                line_transfer(plan, line)
            );
        }
    } else {
        assert_eq!(plan.addressing, LineAddressing::Double);
    }
}

#[test]
fn test_grayscale_extracts_luma() {
    let geometry = CaptureGeometry::new(8, 2, PixelFormat::Grayscale);
    let plan = geometry.plan(&limits()).unwrap();
    assert_eq!(plan.bus_bpp, 2);
    assert_eq!(plan.dst_bpp, 1);
    assert!(!plan.chained);
    let transfer = line_transfer(&plan, 0);
    assert_eq!(transfer.src_stride, 2);
    assert_eq!(transfer.elem_bytes, 1);
    assert_eq!(transfer.count, 8);
}

#[test]
fn test_crop_remainder() {
    // Bayer x=5: the peripheral can only start at byte 4.
    let geometry =
        CaptureGeometry::new(8, 4, PixelFormat::Bayer).with_window(Rect::new(5, 0, 3, 4));
    let plan = geometry.plan(&limits()).unwrap();
    assert_eq!(plan.crop.byte_start, 4);
    assert_eq!(plan.crop_remainder, 1);
    assert_eq!(plan.line_bytes, 4);
    assert!(!plan.chained);
    assert_eq!(plan.src_offset(0), 1);
}

#[test]
fn test_full_frame_is_chained() {
    let plan = CaptureGeometry::new(640, 480, PixelFormat::Rgb565)
        .plan(&TransferLimits {
            line_slot_bytes: 4096,
            frame_bytes: 640 * 480 * 2,
            ..limits()
        })
        .unwrap();
    assert!(plan.chained);
    assert_eq!(plan.lines(), 480);
    assert_eq!(plan.line_bytes, 1280);
    assert_eq!(plan.frame_bytes, 614400);

    let unchained = CaptureGeometry::new(640, 480, PixelFormat::Rgb565)
        .plan(&TransferLimits {
            line_slot_bytes: 4096,
            frame_bytes: 640 * 480 * 2,
            chaining: false,
            ..limits()
        })
        .unwrap();
    assert!(!unchained.chained);
}

fn assert_invalid(result: Result<TransferPlan, CaptureError>) {
    match result {
        Err(CaptureError::InvalidGeometry { reason }) => println!("rejected: {reason}"),
        other => panic!("expected InvalidGeometry, got {other:?}"),
    }
}

#[test]
fn test_invalid_geometry() {
    let base = CaptureGeometry::new(8, 6, PixelFormat::Bayer);

    assert_invalid(CaptureGeometry::new(0, 6, PixelFormat::Bayer).plan(&limits()));
    assert_invalid(base.with_window(Rect::new(0, 0, 0, 6)).plan(&limits()));
    assert_invalid(base.with_window(Rect::new(4, 0, 5, 6)).plan(&limits()));
    assert_invalid(base.with_window(Rect::new(0, 5, 8, 2)).plan(&limits()));

    // The word-aligned transfer would run past the end of a 6 byte line.
    assert_invalid(
        CaptureGeometry::new(6, 4, PixelFormat::Bayer)
            .with_window(Rect::new(5, 0, 1, 4))
            .plan(&limits()),
    );

    // Relayed frames that are not a whole number of DMA blocks, even though
    // every line transfer is word sized.
    assert_invalid(
        CaptureGeometry::new(7, 3, PixelFormat::Bayer)
            .with_window(Rect::new(0, 0, 3, 3))
            .plan(&limits()),
    );
    assert_invalid(
        CaptureGeometry::new(64, 48, PixelFormat::Grayscale)
            .with_window(Rect::new(3, 5, 17, 9))
            .plan(&limits()),
    );
    assert_invalid(
        CaptureGeometry::new(8, 6, PixelFormat::Rgb565)
            .with_window(Rect::new(0, 0, 3, 3))
            .plan(&limits()),
    );

    // Line wider than a line-buffer.
    assert_invalid(CaptureGeometry::new(200, 2, PixelFormat::Rgb565).plan(&limits()));

    // Frame larger than a frame buffer.
    assert_invalid(CaptureGeometry::new(64, 64, PixelFormat::Rgb565).plan(&limits()));

    // Line larger than one relay block.
    assert_invalid(CaptureGeometry::new(64, 2, PixelFormat::Rgb565).plan(&TransferLimits {
        max_block_bytes: 64,
        ..limits()
    }));
}

#[test]
fn test_compressed_geometry() {
    let jpeg = CaptureGeometry::new(64, 48, PixelFormat::Jpeg);
    let plan = jpeg.plan(&limits()).unwrap();
    assert!(plan.is_compressed());
    assert_eq!(plan.frame_bytes, 4096);
    assert_eq!(plan.line_bytes, 256);
    assert_eq!(plan.addressing, LineAddressing::Double);

    let direct = jpeg
        .plan(&TransferLimits {
            frame_direct_compressed: true,
            ..limits()
        })
        .unwrap();
    assert_eq!(direct.addressing, LineAddressing::FrameDirect { block_bytes: 2048 });

    assert_invalid(jpeg.with_window(Rect::new(0, 0, 32, 48)).plan(&limits()));
    assert_invalid(jpeg.with_transpose(true).plan(&limits()));
}
