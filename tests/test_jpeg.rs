// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::{
    controller::{CaptureContext, ContextConfig},
    error::CaptureError,
    geometry::{CaptureGeometry, PixelFormat, Rect},
    hal::{CaptureInterface, Interrupts},
    image::encode_jpeg,
    sim::{RecordingCache, SimCopyEngine, SimInterface, SimRig},
};
use std::error::Error;

type SimContext = CaptureContext<SimInterface, SimCopyEngine, RecordingCache>;

fn context(config: ContextConfig) -> SimContext {
    let irq = Interrupts::new();
    let rig = SimRig::new(&irq, 320, 240);
    CaptureContext::new(rig.interface, rig.engine, rig.cache, irq, config)
}

fn jpeg() -> CaptureGeometry {
    CaptureGeometry::new(320, 240, PixelFormat::Jpeg)
}

#[test]
fn test_compressed_capture() -> Result<(), Box<dyn Error>> {
    for direct in [false, true] {
        let config = ContextConfig::default()
            .with_buffer_bytes(256 * 1024)
            .with_line_slot_bytes(512)
            .with_frame_direct_compressed(direct);
        let mut ctx = context(config);

        let img = ctx.snapshot(&jpeg())?;
        println!("{img}");
        assert_eq!(img.format(), PixelFormat::Jpeg);
        let data = img.data().to_vec();

        let stream = ctx.interface().jpeg();
        assert!(!stream.is_empty());
        assert_eq!(data, stream, "write cursor covers every chunk and the fifo residue");

        let header = turbojpeg::read_header(&data)?;
        assert_eq!((header.width, header.height), (320, 240));

        let stats = ctx.stats();
        assert_eq!(stats.retires, 1);
        assert_eq!(stats.overflows, 0);
        assert_eq!(stats.bytes, stream.len() as u64);
        if !direct {
            assert_eq!(stats.line_irqs, (stream.len() / 512) as u64);
        }
    }
    Ok(())
}

#[test]
fn test_compressed_overflow() -> Result<(), Box<dyn Error>> {
    for direct in [false, true] {
        let config = ContextConfig::default()
            .with_buffer_bytes(1024)
            .with_line_slot_bytes(256)
            .with_frame_direct_compressed(direct);
        let mut ctx = context(config);
        ctx.interface_mut().set_jpeg(vec![0xab; 5000]);

        match ctx.snapshot(&jpeg()) {
            Err(CaptureError::CompressedOverflow { capacity, written }) => {
                assert_eq!(capacity, 1024);
                assert_eq!(written, 1024);
            }
            other => panic!("expected CompressedOverflow, got {other:?}"),
        }
        assert_eq!(ctx.stats().overflows, 1);
        assert_eq!(ctx.pool().head(), None, "an overflowed buffer is never published");
        assert_eq!(ctx.pool().tail(), None);
        assert_eq!(ctx.pool().free_count(), 2);

        // A stream that fits goes through on the next attempt.
        ctx.interface_mut().set_jpeg(vec![0xcd; 900]);
        let img = ctx.snapshot(&jpeg())?;
        assert_eq!(img.size(), 900);
        assert!(img.data().iter().all(|&b| b == 0xcd));
    }
    Ok(())
}

#[test]
fn test_compressed_rejects_crop() {
    let mut ctx = context(ContextConfig::default());
    let cropped = jpeg().with_window(Rect::new(0, 0, 160, 120));
    assert!(matches!(
        ctx.snapshot(&cropped),
        Err(CaptureError::InvalidGeometry { .. })
    ));
    assert_eq!(ctx.interface().frames_posted(), 0);
}

#[test]
fn test_encode_raw_frames() -> Result<(), Box<dyn Error>> {
    for format in [
        PixelFormat::Grayscale,
        PixelFormat::Rgb565,
        PixelFormat::Yuv422,
        PixelFormat::Bayer,
    ] {
        let mut ctx = context(ContextConfig::default().with_buffer_bytes(320 * 240 * 2));
        let img = ctx.snapshot(&CaptureGeometry::new(320, 240, format))?;
        let encoded = encode_jpeg(&img, 80)?;
        let header = turbojpeg::read_header(&encoded)?;
        assert_eq!((header.width, header.height), (320, 240), "{format}");
    }
    Ok(())
}

#[test]
fn test_encode_rejects_compressed() -> Result<(), Box<dyn Error>> {
    let mut ctx = context(ContextConfig::default().with_buffer_bytes(256 * 1024));
    let img = ctx.snapshot(&jpeg())?;
    assert!(encode_jpeg(&img, 80).is_err());
    Ok(())
}

#[test]
fn test_chunk_past_stream_end_reads_nothing() -> Result<(), Box<dyn Error>> {
    let config = ContextConfig::default()
        .with_buffer_bytes(256 * 1024)
        .with_line_slot_bytes(512);
    let mut ctx = context(config);
    ctx.interface_mut().set_jpeg(vec![0x5a; 1000]);
    assert_eq!(ctx.snapshot(&jpeg())?.size(), 1000);

    let mut dst = [0u8; 512];
    assert_eq!(ctx.interface_mut().receive(1, &mut dst), 488);
    assert_eq!(ctx.interface_mut().receive(2, &mut dst), 0);
    assert_eq!(ctx.interface_mut().receive(40, &mut dst), 0);
    Ok(())
}
