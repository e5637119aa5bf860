// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software stand-ins for the capture hardware.
//!
//! [`SimInterface`] plays a sensor plus capture peripheral: each emitted
//! frame posts its line and frame completions on the bus interrupt line, and
//! the pixel bytes are produced when the controller lets the stream deposit
//! a line. Raw frames follow [`pattern`], compressed frames carry a real
//! JPEG stream encoded with turbojpeg. [`SimCopyEngine`] executes block
//! transfers in software and can be told to stall or fail. [`RecordingCache`]
//! logs every maintenance operation.

use crate::{
    cache::{CacheMaintenance, Region},
    error::{Engine, HwFault},
    hal::{
        AbortMode, BlockTransfer, CaptureInterface, CopyEngine, HwEvent, InterfaceConfig,
        Interrupts, IrqLine, FAULT_BUS_ERROR, FAULT_OVERRUN,
    },
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
};
use tracing::{debug, trace, warn};

/// Source byte `byte` of sensor line `row` in frame `frame`.
pub fn pattern(frame: u64, row: u32, byte: usize) -> u8 {
    (row as usize * 31 + byte * 7 + frame as usize * 13) as u8
}

/// What the sensor does for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScript {
    /// Every line, then end of frame.
    Complete,
    /// End of frame after only `lines` lines.
    Truncated { lines: u32 },
    /// Every line but no end of frame.
    NoFrameEnd,
    /// Nothing at all.
    Silent,
    /// `after` lines, then a stream fault with `code`.
    Fault { after: u32, code: u32 },
}

/// When the sensor emits frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// One frame whenever the peripheral is enabled.
    OnEnable,
    /// Only on [`SensorHandle::vsync`].
    External,
}

struct Sensor {
    irq: IrqLine,
    width: u32,
    height: u32,
    pacing: Pacing,
    config: Option<InterfaceConfig>,
    enabled: bool,
    script: VecDeque<FrameScript>,
    jpeg: Vec<u8>,
    jpeg_quality: i32,
    fifo: usize,
    frame: u64,
    started: bool,
    frames_posted: u64,
    lines_posted: u64,
}

impl Sensor {
    fn emit(&mut self) -> bool {
        let Some(config) = self.config else {
            return false;
        };
        if !self.enabled {
            return false;
        }
        let script = self.script.pop_front().unwrap_or(FrameScript::Complete);
        let (lines, len) = if config.compressed {
            let chunk = config.transfer_bytes.max(1);
            self.fifo = self.jpeg.len() % chunk;
            ((self.jpeg.len() / chunk) as u32, chunk)
        } else {
            (config.crop.line_count, config.crop.byte_count)
        };
        let (lines, end) = match script {
            FrameScript::Complete => (lines, Some(HwEvent::FrameComplete)),
            FrameScript::Truncated { lines: n } => (n.min(lines), Some(HwEvent::FrameComplete)),
            FrameScript::NoFrameEnd => (lines, None),
            FrameScript::Silent => (0, None),
            FrameScript::Fault { after, code } => (
                after.min(lines),
                Some(HwEvent::Fault(HwFault::new(Engine::LineTransfer, code))),
            ),
        };
        trace!(?script, lines, len, "sensor frame");
        for index in 0..lines {
            self.irq.post(HwEvent::LineComplete { index, len });
        }
        if let Some(event) = end {
            self.irq.post(event);
        }
        self.frames_posted += 1;
        self.lines_posted += lines as u64;
        true
    }

    fn encode_test_card(&mut self) -> Result<(), HwFault> {
        let (w, h) = (self.width as usize, self.height as usize);
        let pixels: Vec<u8> = (0..h)
            .flat_map(|row| (0..w).map(move |col| pattern(0, row as u32, col)))
            .collect();
        let image = turbojpeg::Image {
            pixels: pixels.as_slice(),
            width: w,
            pitch: w,
            height: h,
            format: turbojpeg::PixelFormat::GRAY,
        };
        match turbojpeg::compress(image, self.jpeg_quality, turbojpeg::Subsamp::Gray) {
            Ok(buf) => {
                self.jpeg = buf.to_vec();
                debug!(bytes = self.jpeg.len(), w, h, "sensor jpeg stream encoded");
                Ok(())
            }
            Err(e) => {
                warn!(%e, "sensor jpeg encoding failed");
                Err(HwFault::new(Engine::LineTransfer, FAULT_BUS_ERROR))
            }
        }
    }
}

/// Frame trigger for a sensor paced from outside, e.g. a timer task.
#[derive(Clone)]
pub struct SensorHandle {
    sensor: Arc<Mutex<Sensor>>,
}

impl SensorHandle {
    /// Start of a new frame. Returns false while the peripheral is off.
    pub fn vsync(&self) -> bool {
        self.sensor.lock().emit()
    }
}

/// Simulated sensor and capture peripheral.
pub struct SimInterface {
    sensor: Arc<Mutex<Sensor>>,
}

impl SimInterface {
    /// A `width`x`height` sensor posting completions on `irq`.
    pub fn new(irq: IrqLine, width: u32, height: u32) -> Self {
        Self {
            sensor: Arc::new(Mutex::new(Sensor {
                irq,
                width,
                height,
                pacing: Pacing::OnEnable,
                config: None,
                enabled: false,
                script: VecDeque::new(),
                jpeg: Vec::new(),
                jpeg_quality: 85,
                fifo: 0,
                frame: 0,
                started: false,
                frames_posted: 0,
                lines_posted: 0,
            })),
        }
    }

    pub fn with_pacing(self, pacing: Pacing) -> Self {
        self.sensor.lock().pacing = pacing;
        self
    }

    pub fn with_jpeg_quality(self, quality: i32) -> Self {
        self.sensor.lock().jpeg_quality = quality;
        self
    }

    pub fn handle(&self) -> SensorHandle {
        SensorHandle {
            sensor: self.sensor.clone(),
        }
    }

    /// Queue the behaviour of upcoming frames.
    pub fn script(&mut self, frames: impl IntoIterator<Item = FrameScript>) {
        self.sensor.lock().script.extend(frames);
    }

    /// Replace the compressed stream the sensor produces.
    pub fn set_jpeg(&mut self, stream: Vec<u8>) {
        self.sensor.lock().jpeg = stream;
    }

    /// The compressed stream of the current configuration.
    pub fn jpeg(&self) -> Vec<u8> {
        self.sensor.lock().jpeg.clone()
    }

    /// Emit one frame now, if enabled.
    pub fn emit_frame(&mut self) -> bool {
        self.sensor.lock().emit()
    }

    pub fn frames_posted(&self) -> u64 {
        self.sensor.lock().frames_posted
    }

    pub fn lines_posted(&self) -> u64 {
        self.sensor.lock().lines_posted
    }
}

impl CaptureInterface for SimInterface {
    fn configure(&mut self, config: &InterfaceConfig) -> Result<(), HwFault> {
        let mut sensor = self.sensor.lock();
        if config.compressed {
            let full = config.crop.line_start == 0
                && config.crop.line_count == sensor.height
                && config.crop.byte_start == 0
                && config.crop.byte_count == sensor.width as usize;
            if !full {
                return Err(HwFault::new(Engine::LineTransfer, FAULT_BUS_ERROR));
            }
            if sensor.jpeg.is_empty() {
                sensor.encode_test_card()?;
            }
        }
        sensor.config = Some(*config);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), HwFault> {
        let mut sensor = self.sensor.lock();
        if sensor.config.is_none() {
            return Err(HwFault::new(Engine::LineTransfer, FAULT_BUS_ERROR));
        }
        sensor.enabled = true;
        if sensor.pacing == Pacing::OnEnable {
            sensor.emit();
        }
        Ok(())
    }

    fn disable(&mut self) {
        self.sensor.lock().enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.sensor.lock().enabled
    }

    fn receive(&mut self, index: u32, dst: &mut [u8]) -> usize {
        let mut sensor = self.sensor.lock();
        let Some(config) = sensor.config else {
            return 0;
        };
        if config.compressed {
            let at = (index as usize * config.transfer_bytes).min(sensor.jpeg.len());
            let end = (at + config.transfer_bytes.min(dst.len())).min(sensor.jpeg.len());
            let len = end.saturating_sub(at);
            dst[..len].copy_from_slice(&sensor.jpeg[at..at + len]);
            return len;
        }
        if index == 0 {
            if sensor.started {
                sensor.frame += 1;
            }
            sensor.started = true;
        }
        let row = config.crop.line_start + index;
        let len = dst.len().min(config.crop.byte_count);
        for (b, out) in dst[..len].iter_mut().enumerate() {
            *out = pattern(sensor.frame, row, config.crop.byte_start + b);
        }
        len
    }

    fn drain(&mut self, dst: &mut [u8]) -> usize {
        let mut sensor = self.sensor.lock();
        let pending = std::mem::take(&mut sensor.fifo);
        let at = sensor.jpeg.len().saturating_sub(pending);
        let len = pending.min(dst.len());
        dst[..len].copy_from_slice(&sensor.jpeg[at..at + len]);
        pending
    }

    fn abort(&mut self, mode: AbortMode) {
        let mut sensor = self.sensor.lock();
        sensor.enabled = false;
        sensor.fifo = 0;
        trace!(?mode, "stream aborted");
    }
}

struct Link {
    transfer: BlockTransfer,
    step: usize,
    remaining: u32,
}

/// Software copy engine.
pub struct SimCopyEngine {
    irq: IrqLine,
    busy_polls: AtomicU32,
    lagging: bool,
    late_completion: AtomicBool,
    stall_next: u32,
    fail_next: Option<u32>,
    link: Option<Link>,
    transfers: u64,
    requests: u64,
}

impl SimCopyEngine {
    pub fn new(irq: IrqLine) -> Self {
        Self {
            irq,
            busy_polls: AtomicU32::new(0),
            lagging: false,
            late_completion: AtomicBool::new(false),
            stall_next: 0,
            fail_next: None,
            link: None,
            transfers: 0,
            requests: 0,
        }
    }

    /// Keep the next one-shot transfer busy for `polls` idle checks.
    pub fn stall_next(&mut self, polls: u32) {
        self.stall_next = polls;
    }

    /// Clear the busy flag as soon as a one-shot transfer is done but raise
    /// its completion only at the next idle check.
    pub fn with_late_completions(mut self) -> Self {
        self.lagging = true;
        self
    }

    /// Report fault `code` on the next one-shot transfer.
    pub fn fail_next(&mut self, code: u32) {
        self.fail_next = Some(code);
    }

    /// One-shot transfers executed.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Linked transfers executed on hardware request.
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

impl CopyEngine for SimCopyEngine {
    fn start(&mut self, transfer: &BlockTransfer, src: &[u8], dst: &mut [u8]) -> Result<(), HwFault> {
        if let Some(code) = self.fail_next.take() {
            self.irq
                .post(HwEvent::Fault(HwFault::new(Engine::LineRelay, code)));
            return Ok(());
        }
        transfer.execute(src, dst)?;
        self.transfers += 1;
        match std::mem::take(&mut self.stall_next) {
            0 if self.lagging => self.late_completion.store(true, Ordering::Release),
            0 => {
                self.irq.post(HwEvent::RelayComplete);
            }
            polls => self.busy_polls.store(polls, Ordering::Release),
        }
        Ok(())
    }

    fn link(&mut self, transfer: &BlockTransfer, dst_step: usize, repeat: u32) -> Result<(), HwFault> {
        self.link = Some(Link {
            transfer: *transfer,
            step: dst_step,
            remaining: repeat,
        });
        Ok(())
    }

    fn request(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(), HwFault> {
        let overrun = HwFault::new(Engine::LineRelay, FAULT_OVERRUN);
        if self.is_busy() {
            return Err(overrun);
        }
        let link = match self.link.as_mut() {
            Some(link) if link.remaining > 0 => link,
            _ => return Err(overrun),
        };
        link.transfer.execute(src, dst)?;
        link.transfer = link.transfer.advanced(link.step);
        link.remaining -= 1;
        self.requests += 1;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        if self.late_completion.swap(false, Ordering::AcqRel) {
            self.irq.post(HwEvent::RelayComplete);
        }
        let left = self.busy_polls.load(Ordering::Acquire);
        if left == 0 {
            return false;
        }
        self.busy_polls.store(left - 1, Ordering::Release);
        if left == 1 {
            self.irq.post(HwEvent::RelayComplete);
        }
        true
    }

    fn abort(&mut self, mode: AbortMode) {
        self.busy_polls.store(0, Ordering::Release);
        self.late_completion.store(false, Ordering::Release);
        self.link = None;
        trace!(?mode, "copy engine aborted");
    }
}

/// A cache maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Clean(Region),
    Invalidate(Region),
}

impl CacheOp {
    pub fn region(&self) -> Region {
        match self {
            CacheOp::Clean(r) | CacheOp::Invalidate(r) => *r,
        }
    }
}

/// Cache backend that records every operation.
#[derive(Debug, Default)]
pub struct RecordingCache {
    ops: Vec<CacheOp>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Whether any recorded operation touched `region`.
    pub fn touches(&self, region: &Region) -> bool {
        self.ops.iter().any(|op| op.region().overlaps(region))
    }
}

impl CacheMaintenance for RecordingCache {
    fn clean(&mut self, region: Region) {
        self.ops.push(CacheOp::Clean(region));
    }

    fn invalidate(&mut self, region: Region) {
        self.ops.push(CacheOp::Invalidate(region));
    }
}

/// A complete simulated hardware set wired to one interrupt queue.
pub struct SimRig {
    pub interface: SimInterface,
    pub engine: SimCopyEngine,
    pub cache: RecordingCache,
}

impl SimRig {
    pub fn new(irq: &Interrupts, width: u32, height: u32) -> Self {
        Self {
            interface: SimInterface::new(irq.bus_line(), width, height),
            engine: SimCopyEngine::new(irq.relay_line()),
            cache: RecordingCache::new(),
        }
    }
}
