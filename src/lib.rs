// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Parallel Capture Library
//!
//! This library drives a parallel camera interface on a microcontroller class
//! SoC and delivers complete frames in caller-visible buffers while the CPU
//! stays out of the per-pixel path. A line DMA stream moves each scanline
//! from the peripheral into one of two line-buffers; a memory-to-memory copy
//! engine relays finished lines into the frame buffer, applying crop
//! remainders, luma extraction and transposition through its block geometry.
//!
//! ## Features
//!
//! - **Frame Buffer Pool**: fixed arena of 2 to 4 granule-aligned, pinned
//!   buffers rotating between free, tail (being written) and head (newest
//!   complete frame) roles.
//! - **Cache Coherency**: clean before an engine reads CPU data, invalidate
//!   only after observing an engine's write completion, never touching a
//!   buffer the caller may be reading.
//! - **Full Offload**: untransformed frames are relayed by a self-retriggering
//!   chain, one interrupt per frame instead of one per line.
//! - **Compressed Capture**: variable-length JPEG streams appended chunk by
//!   chunk with overflow detection.
//! - **Simulation**: software peripheral, copy engine and cache recorder
//!   for tests and host-side development.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_capture::{
//!     controller::{CaptureContext, ContextConfig},
//!     geometry::{CaptureGeometry, PixelFormat, Rect},
//!     hal::Interrupts,
//!     image::encode_jpeg,
//!     sim::SimRig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let irq = Interrupts::new();
//! let rig = SimRig::new(&irq, 640, 480);
//! let mut ctx = CaptureContext::new(
//!     rig.interface,
//!     rig.engine,
//!     rig.cache,
//!     irq,
//!     ContextConfig::default(),
//! );
//!
//! // Capture a 320x240 grayscale window out of the YUV422 sensor output
//! let geometry = CaptureGeometry::new(640, 480, PixelFormat::Grayscale)
//!     .with_window(Rect::new(160, 120, 320, 240));
//! let img = ctx.snapshot(&geometry)?;
//! let jpeg = encode_jpeg(&img, 90)?;
//! std::fs::write("frame.jpeg", &jpeg)?;
//! ctx.release_frame();
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! Frame and line buffers are raw granule-aligned allocations pinned with
//! `mlock`. The unsafe code is confined to the `cache` module and wrapped in
//! safe slice accessors.

pub mod cache;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod hal;
pub mod image;
pub mod jpeg;
pub mod line;
pub mod pool;
pub mod relay;
pub mod sim;

pub use controller::{CaptureContext, CaptureState, CaptureStats, ContextConfig, LineEvent};
pub use error::CaptureError;
pub use geometry::{CaptureGeometry, PixelFormat, Rect};
pub use image::Image;
