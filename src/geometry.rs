// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture geometry and the transfer plan derived from it.
//!
//! A [`CaptureGeometry`] is what the caller asks for: a source resolution, a
//! crop window, a pixel format and an optional transpose. [`TransferPlan`]
//! is what the hardware gets: the peripheral-side crop (which can only cut at
//! word boundaries), the per-line transfer width, the residual byte offset
//! the relay engine has to skip, the line-buffer addressing mode and whether
//! the frame can be fully offloaded to a self-retriggering relay chain.

use crate::error::CaptureError;
use std::fmt;

/// Width of the peripheral data register. Line transfers and horizontal
/// crops are expressed in whole units of this many bytes.
pub const TRANSFER_GRANULE: usize = 4;

/// Minimum block alignment the DMA engines accept for a transfer length.
pub const DMA_BLOCK_ALIGN: usize = 4;

/// Pixel formats produced on the capture bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit raw Bayer mosaic.
    Bayer,
    /// 8-bit luma, extracted by the relay engine from a YUV422 bus.
    Grayscale,
    /// 16-bit RGB 5:6:5.
    Rgb565,
    /// 16-bit packed YUV 4:2:2 (YUYV byte order).
    Yuv422,
    /// Variable-length compressed stream from the sensor's JPEG engine.
    Jpeg,
}

impl PixelFormat {
    /// Bytes per pixel on the capture bus.
    pub const fn bus_bytes(self) -> usize {
        match self {
            PixelFormat::Bayer | PixelFormat::Jpeg => 1,
            PixelFormat::Grayscale | PixelFormat::Rgb565 | PixelFormat::Yuv422 => 2,
        }
    }

    /// Bytes per pixel in the frame buffer.
    pub const fn pixel_bytes(self) -> usize {
        match self {
            PixelFormat::Bayer | PixelFormat::Grayscale | PixelFormat::Jpeg => 1,
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => 2,
        }
    }

    pub const fn is_compressed(self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Bayer => "BAYER",
            PixelFormat::Grayscale => "GRAY",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Jpeg => "JPEG",
        };
        write!(f, "{name}")
    }
}

/// Rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: u32,
    /// Y coordinate of top-left corner
    pub y: u32,
    /// Width of the rectangle in pixels
    pub width: u32,
    /// Height of the rectangle in pixels
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable description of one capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGeometry {
    /// Sensor output width in pixels.
    pub width: u32,
    /// Sensor output height in pixels.
    pub height: u32,
    /// Crop window within the sensor output.
    pub window: Rect,
    pub format: PixelFormat,
    /// Store the window transposed (rows become columns).
    pub transpose: bool,
}

impl CaptureGeometry {
    /// Full-frame capture at `width`x`height`.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            window: Rect::new(0, 0, width, height),
            format,
            transpose: false,
        }
    }

    pub fn with_window(mut self, window: Rect) -> Self {
        self.window = window;
        self
    }

    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    /// Dimensions of the stored image (width, height).
    pub fn output_size(&self) -> (u32, u32) {
        if self.transpose {
            (self.window.height, self.window.width)
        } else {
            (self.window.width, self.window.height)
        }
    }

    /// Validate against `limits` and derive the hardware transfer plan.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidGeometry`] when the window is empty or
    /// outside the source, when a word-aligned peripheral crop cannot cover
    /// the window, when the relayed frame is not a whole number of DMA
    /// blocks, or when lines or frames exceed the configured buffers.
    pub fn plan(&self, limits: &TransferLimits) -> Result<TransferPlan, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::geometry("source resolution is empty"));
        }
        let w = self.window;
        if w.is_empty() {
            return Err(CaptureError::geometry("crop window is empty"));
        }
        if w.x as u64 + w.width as u64 > self.width as u64
            || w.y as u64 + w.height as u64 > self.height as u64
        {
            return Err(CaptureError::geometry(format!(
                "crop window {}x{}+{}+{} exceeds {}x{} source",
                w.width, w.height, w.x, w.y, self.width, self.height
            )));
        }

        if self.format.is_compressed() {
            self.plan_compressed(limits)
        } else {
            self.plan_raw(limits)
        }
    }

    fn plan_raw(&self, limits: &TransferLimits) -> Result<TransferPlan, CaptureError> {
        let w = self.window;
        let bus_bpp = self.format.bus_bytes();
        let dst_bpp = self.format.pixel_bytes();

        let source_line = self.width as usize * bus_bpp;
        let first = w.x as usize * bus_bpp;
        let last = (w.x + w.width) as usize * bus_bpp;
        let byte_start = first - first % TRANSFER_GRANULE;
        let byte_end = last.div_ceil(TRANSFER_GRANULE) * TRANSFER_GRANULE;
        if byte_end > source_line {
            return Err(CaptureError::geometry(format!(
                "line transfer of {} bytes cannot be widened to the {TRANSFER_GRANULE} byte \
                 transfer granularity within a {source_line} byte source line",
                last - byte_start
            )));
        }
        let line_bytes = byte_end - byte_start;
        if line_bytes > limits.line_slot_bytes {
            return Err(CaptureError::geometry(format!(
                "line transfer of {line_bytes} bytes exceeds {} byte line buffer",
                limits.line_slot_bytes
            )));
        }
        let row_bytes = w.width as usize * dst_bpp;
        if row_bytes > limits.max_block_bytes {
            return Err(CaptureError::geometry(format!(
                "{row_bytes} byte line exceeds the relay engine's {} byte block limit",
                limits.max_block_bytes
            )));
        }
        let frame_bytes = row_bytes * w.height as usize;
        if frame_bytes % DMA_BLOCK_ALIGN != 0 {
            return Err(CaptureError::geometry(format!(
                "{frame_bytes} byte frame is not a multiple of the {DMA_BLOCK_ALIGN} byte DMA block"
            )));
        }
        if frame_bytes > limits.frame_bytes {
            return Err(CaptureError::geometry(format!(
                "{frame_bytes} byte frame exceeds {} byte frame buffer",
                limits.frame_bytes
            )));
        }

        let crop_remainder = first - byte_start;
        let chained = limits.chaining
            && !self.transpose
            && bus_bpp == dst_bpp
            && crop_remainder == 0
            && line_bytes == row_bytes;
        let (out_width, out_height) = self.output_size();

        Ok(TransferPlan {
            geometry: *self,
            crop: PeripheralCrop {
                line_start: w.y,
                line_count: w.height,
                byte_start,
                byte_count: line_bytes,
            },
            line_bytes,
            crop_remainder,
            bus_bpp,
            dst_bpp,
            out_width,
            out_height,
            frame_bytes,
            addressing: if chained {
                LineAddressing::CircularRepeat
            } else {
                LineAddressing::Double
            },
            chained,
        })
    }

    fn plan_compressed(&self, limits: &TransferLimits) -> Result<TransferPlan, CaptureError> {
        let w = self.window;
        if w != Rect::new(0, 0, self.width, self.height) {
            return Err(CaptureError::geometry(
                "compressed capture does not support cropping",
            ));
        }
        if self.transpose {
            return Err(CaptureError::geometry(
                "compressed capture does not support transpose",
            ));
        }
        if limits.frame_bytes % DMA_BLOCK_ALIGN != 0 {
            return Err(CaptureError::geometry(format!(
                "{} byte frame buffer is not a multiple of the {DMA_BLOCK_ALIGN} byte DMA block",
                limits.frame_bytes
            )));
        }

        let (addressing, line_bytes) = if limits.frame_direct_compressed {
            // The frame buffer is split into two halves the stream alternates
            // between, each no larger than one engine block.
            let half = (limits.frame_bytes / 2).min(limits.max_block_bytes);
            let block_bytes = half - half % DMA_BLOCK_ALIGN;
            if block_bytes == 0 {
                return Err(CaptureError::geometry("frame buffer too small for direct transfer"));
            }
            (LineAddressing::FrameDirect { block_bytes }, block_bytes)
        } else {
            (LineAddressing::Double, limits.line_slot_bytes)
        };

        Ok(TransferPlan {
            geometry: *self,
            crop: PeripheralCrop {
                line_start: 0,
                line_count: self.height,
                byte_start: 0,
                byte_count: self.width as usize,
            },
            line_bytes,
            crop_remainder: 0,
            bus_bpp: 1,
            dst_bpp: 1,
            out_width: self.width,
            out_height: self.height,
            frame_bytes: limits.frame_bytes,
            addressing,
            chained: false,
        })
    }
}

/// Hardware and buffer limits a plan is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Capacity of one line-buffer slot.
    pub line_slot_bytes: usize,
    /// Capacity of one frame buffer.
    pub frame_bytes: usize,
    /// Largest single block the copy engines move.
    pub max_block_bytes: usize,
    /// Allow the self-retriggering relay chain for untransformed frames.
    pub chaining: bool,
    /// The peripheral family streams compressed data straight into the frame
    /// buffer instead of through line-buffers.
    pub frame_direct_compressed: bool,
}

/// Crop programmed into the capture peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralCrop {
    /// First captured line.
    pub line_start: u32,
    /// Number of captured lines.
    pub line_count: u32,
    /// First captured byte of each line, word aligned.
    pub byte_start: usize,
    /// Captured bytes per line, word aligned.
    pub byte_count: usize,
}

/// How the line DMA stream addresses its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAddressing {
    /// Two line-buffers used alternately, one per line.
    Double,
    /// A single line-buffer overwritten every line; the relay chain drains
    /// it under hardware back-pressure.
    CircularRepeat,
    /// The frame buffer itself, as two halves of `block_bytes` each.
    FrameDirect { block_bytes: usize },
}

/// Everything the engines need for one capture, derived from a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub geometry: CaptureGeometry,
    pub crop: PeripheralCrop,
    /// Bytes per line transfer (raw) or per chunk (compressed).
    pub line_bytes: usize,
    /// Bytes to skip at the start of each line-buffer to reach the window.
    pub crop_remainder: usize,
    pub bus_bpp: usize,
    pub dst_bpp: usize,
    pub out_width: u32,
    pub out_height: u32,
    /// Exact frame size (raw) or buffer capacity (compressed).
    pub frame_bytes: usize,
    pub addressing: LineAddressing,
    /// Lines after the first are relayed by the self-retriggering chain.
    pub chained: bool,
}

impl TransferPlan {
    pub fn is_compressed(&self) -> bool {
        self.geometry.format.is_compressed()
    }

    /// Number of line-complete signals a raw frame produces.
    pub fn lines(&self) -> u32 {
        self.crop.line_count
    }

    /// Window width in pixels, which is the pixel count of every line.
    pub fn line_pixels(&self) -> usize {
        self.geometry.window.width as usize
    }

    /// Byte offset of window pixel `pixel` inside a line-buffer slot.
    pub fn src_offset(&self, pixel: usize) -> usize {
        self.crop_remainder + pixel * self.bus_bpp
    }

    /// Byte offset in the frame buffer where window pixel `pixel` of window
    /// line `line` is stored.
    pub fn dst_offset(&self, line: usize, pixel: usize) -> usize {
        let w = self.geometry.window;
        if self.geometry.transpose {
            (pixel * w.height as usize + line) * self.dst_bpp
        } else {
            (line * w.width as usize + pixel) * self.dst_bpp
        }
    }
}
