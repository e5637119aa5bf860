// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    geometry::PixelFormat,
    pool::{FrameInfo, VBuffer},
};
use core::fmt;
use std::{error::Error, io, time::Duration};
use turbojpeg::OwnedBuf;

/// A completed frame, borrowed from the head buffer of the pool.
///
/// The borrow ties the image to the capture context: no further capture can
/// run, and so no engine can write, while an `Image` is alive.
///
/// # Example
///
/// ```no_run
/// use edgefirst_capture::{
///     controller::{CaptureContext, ContextConfig},
///     geometry::{CaptureGeometry, PixelFormat},
///     hal::Interrupts,
///     sim::SimRig,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let irq = Interrupts::new();
/// let rig = SimRig::new(&irq, 640, 480);
/// let mut ctx = CaptureContext::new(rig.interface, rig.engine, rig.cache, irq, ContextConfig::default());
///
/// let img = ctx.snapshot(&CaptureGeometry::new(640, 480, PixelFormat::Rgb565))?;
/// assert_eq!(img.width(), 640);
/// assert_eq!(img.data().len(), 640 * 480 * 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct Image<'a> {
    data: &'a [u8],
    info: FrameInfo,
    buffer: usize,
}

impl<'a> Image<'a> {
    /// View the frame held by `buffer`, if it holds a completed frame.
    pub fn from_buffer(buffer: &'a VBuffer) -> Option<Self> {
        let info = *buffer.info()?;
        Some(Self {
            data: buffer.bytes(),
            info,
            buffer: buffer.index(),
        })
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn format(&self) -> PixelFormat {
        self.info.format
    }

    /// Frame payload: packed pixels, or the compressed stream.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn sequence(&self) -> u64 {
        self.info.sequence
    }

    /// Time from arming the capture to the end of frame.
    pub fn duration(&self) -> Duration {
        self.info.duration
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// Pool index of the buffer backing this image.
    pub fn buffer_index(&self) -> usize {
        self.buffer
    }
}

impl fmt::Display for Image<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} #{} size:{} buf:{}",
            self.width(),
            self.height(),
            self.format(),
            self.sequence(),
            self.size(),
            self.buffer
        )
    }
}

impl fmt::Debug for Image<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Expand RGB 5:6:5 pixels (little endian) to packed RGB888.
pub fn rgb565_to_rgb(pix: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pix.len() / 2 * 3);
    for px in pix.chunks_exact(2) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        rgb.extend_from_slice(&[(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]);
    }
    rgb
}

/// Take the luma samples of a packed YUYV frame.
pub fn yuyv_luma(pix: &[u8]) -> Vec<u8> {
    pix.iter().step_by(2).copied().collect()
}

/// Encodes a captured raw frame to JPEG using turbojpeg.
///
/// Grayscale and Bayer frames are compressed as single-channel images, RGB565
/// is expanded to RGB888 first and YUV422 frames contribute their luma.
///
/// # Errors
///
/// Returns an error if:
/// - The image is already compressed
/// - The payload does not match the image dimensions
/// - JPEG compression fails
///
/// # Example
///
/// ```no_run
/// # use edgefirst_capture::image::{encode_jpeg, Image};
/// # fn save(img: &Image) -> Result<(), Box<dyn std::error::Error>> {
/// let jpeg = encode_jpeg(img, 90)?;
/// std::fs::write("frame.jpeg", &jpeg)?;
/// # Ok(())
/// # }
/// ```
pub fn encode_jpeg(img: &Image, quality: i32) -> Result<OwnedBuf, Box<dyn Error>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let expected = width * height * img.format().pixel_bytes();
    if img.format().is_compressed() {
        return Err(Box::new(io::Error::new(
            io::ErrorKind::InvalidInput,
            "image is already compressed",
        )));
    }
    if img.size() != expected {
        return Err(Box::new(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected {expected} bytes, image holds {}", img.size()),
        )));
    }

    let (pixels, format, pitch, subsamp) = match img.format() {
        PixelFormat::Rgb565 => (
            rgb565_to_rgb(img.data()),
            turbojpeg::PixelFormat::RGB,
            width * 3,
            turbojpeg::Subsamp::Sub2x2,
        ),
        PixelFormat::Yuv422 => (
            yuyv_luma(img.data()),
            turbojpeg::PixelFormat::GRAY,
            width,
            turbojpeg::Subsamp::Gray,
        ),
        _ => (
            img.data().to_vec(),
            turbojpeg::PixelFormat::GRAY,
            width,
            turbojpeg::Subsamp::Gray,
        ),
    };

    let image = turbojpeg::Image {
        pixels: pixels.as_slice(),
        width,
        pitch,
        height,
        format,
    };
    match turbojpeg::compress(image, quality, subsamp) {
        Ok(buf) => Ok(buf),
        Err(e) => Err(Box::new(e)),
    }
}
