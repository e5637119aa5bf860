// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_capture::{
    controller::ContextConfig,
    error::CaptureError,
    geometry::{CaptureGeometry, PixelFormat, Rect},
};
use serde_json::{json, Value};
use std::{path::PathBuf, time::Duration};

/// Pixel format requested from the capture bus.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum FormatSetting {
    /// 8-bit raw Bayer
    Bayer,
    /// 8-bit luma taken from a YUV422 bus
    Gray,
    /// 16-bit RGB 5:6:5
    Rgb565,
    /// 16-bit YUYV
    Yuv422,
    /// Compressed stream from the sensor
    Jpeg,
}

impl From<FormatSetting> for PixelFormat {
    fn from(format: FormatSetting) -> Self {
        match format {
            FormatSetting::Bayer => PixelFormat::Bayer,
            FormatSetting::Gray => PixelFormat::Grayscale,
            FormatSetting::Rgb565 => PixelFormat::Rgb565,
            FormatSetting::Yuv422 => PixelFormat::Yuv422,
            FormatSetting::Jpeg => PixelFormat::Jpeg,
        }
    }
}

/// Command-line arguments for the EdgeFirst capture demo.
///
/// The demo runs the capture pipeline against the simulated sensor, paced at
/// the requested frame rate, and optionally writes every frame as a JPEG.
/// Arguments can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-capture --format gray --window "160 120 320 240" --frames 30
///
/// # Via environment variables
/// export FORMAT=rgb565
/// export OUTPUT=/tmp/frames
/// edgefirst-capture
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Sensor output resolution in pixels (width height)
    #[arg(
        long,
        env = "CAPTURE_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub capture_size: Vec<u32>,

    /// Crop window in sensor pixels (x y width height), full frame if unset
    #[arg(long, env = "WINDOW", value_delimiter = ' ', num_args = 4)]
    pub window: Option<Vec<u32>>,

    /// Pixel format
    #[arg(long, env = "FORMAT", default_value = "rgb565", value_enum)]
    pub format: FormatSetting,

    /// Store frames transposed
    #[arg(long, env = "TRANSPOSE")]
    pub transpose: bool,

    /// Number of frames to capture, 0 to run until interrupted
    #[arg(long, env = "FRAMES", default_value = "30")]
    pub frames: u64,

    /// Sensor frame rate
    #[arg(long, env = "FPS", default_value = "30")]
    pub fps: u32,

    /// Frame buffers in the pool (2 to 4)
    #[arg(long, env = "BUFFERS", default_value = "2", value_parser = clap::value_parser!(u8).range(2..=4))]
    pub buffers: u8,

    /// Snapshot timeout in milliseconds
    #[arg(long, env = "TIMEOUT_MS", default_value = "3000")]
    pub timeout_ms: u64,

    /// Re-arm continuously instead of one snapshot at a time
    #[arg(long, env = "CONTINUOUS")]
    pub continuous: bool,

    /// Disable full offload of untransformed frames to the relay chain
    #[arg(long, env = "NO_CHAINING")]
    pub no_chaining: bool,

    /// Stream compressed frames straight into the frame buffer
    #[arg(long, env = "FRAME_DIRECT")]
    pub frame_direct: bool,

    /// JPEG quality for saved raw frames
    #[arg(long, env = "JPEG_QUALITY", default_value = "85")]
    pub jpeg_quality: i32,

    /// Directory receiving one JPEG per captured frame
    #[arg(long, env = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Forward logs to the systemd journal
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    /// Frame buffer capacity needed by the largest frame this run produces.
    fn buffer_bytes(&self) -> usize {
        let (w, h) = (self.capture_size[0] as usize, self.capture_size[1] as usize);
        let bytes = w * h * PixelFormat::from(self.format).pixel_bytes();
        // Compressed frames rarely reach a quarter of the raw size.
        if self.format == FormatSetting::Jpeg {
            bytes.div_ceil(4).next_multiple_of(64)
        } else {
            bytes
        }
    }

    /// Settings of this run as JSON, for the startup log.
    pub fn summary(&self) -> Value {
        json!({
            "capture_size": self.capture_size,
            "window": self.window,
            "format": format!("{:?}", self.format),
            "transpose": self.transpose,
            "frames": self.frames,
            "fps": self.fps,
            "buffers": self.buffers,
            "timeout_ms": self.timeout_ms,
            "continuous": self.continuous,
            "chaining": !self.no_chaining,
        })
    }
}

impl From<&Args> for ContextConfig {
    fn from(args: &Args) -> Self {
        let line = args.capture_size[0] as usize * PixelFormat::from(args.format).bus_bytes();
        ContextConfig::default()
            .with_buffers(args.buffers as usize)
            .with_buffer_bytes(args.buffer_bytes())
            .with_line_slot_bytes(line.next_multiple_of(64).max(512))
            .with_timeout(Duration::from_millis(args.timeout_ms))
            .with_continuous(args.continuous)
            .with_chaining(!args.no_chaining)
            .with_frame_direct_compressed(args.frame_direct)
    }
}

impl TryFrom<&Args> for CaptureGeometry {
    type Error = CaptureError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let (w, h) = (args.capture_size[0], args.capture_size[1]);
        let mut geometry = CaptureGeometry::new(w, h, args.format.into())
            .with_transpose(args.transpose);
        if let Some(window) = &args.window {
            geometry = geometry.with_window(Rect::new(window[0], window[1], window[2], window[3]));
        }
        geometry.plan(&ContextConfig::from(args).limits())?;
        Ok(geometry)
    }
}
