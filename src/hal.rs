// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware seams of the capture pipeline.
//!
//! The pipeline drives two collaborators through traits, one implementation
//! per peripheral family, resolved at compile time through the generic
//! parameters of [`CaptureContext`](crate::controller::CaptureContext):
//!
//! - [`CaptureInterface`]: the parallel capture peripheral together with the
//!   DMA stream that drains its data register into line-buffers.
//! - [`CopyEngine`]: the memory-to-memory engine relaying finished lines into
//!   frame buffers. It exposes a one-shot sub-channel and a linked sub-channel
//!   that replays a transfer on every hardware line request.
//!
//! Completion signals do not call back into the controller. Each hardware
//! interrupt posts a [`HwEvent`] on an [`IrqLine`]; the controller drains the
//! [`Interrupts`] queues from its wait loop, relay completions first, which
//! mirrors the relay engine's higher interrupt priority.

use crate::{
    error::{Engine, HwFault},
    geometry::{LineAddressing, PeripheralCrop},
};
use std::time::Duration;
use tracing::trace;

/// Fault code raised when a transfer addresses memory outside its buffers.
pub const FAULT_BUS_ERROR: u32 = 0x01;
/// Fault code raised when the linked sub-channel is requested while busy.
pub const FAULT_OVERRUN: u32 = 0x02;

/// Longest single sleep of the caller's wait loop.
const WAIT_SLICE: Duration = Duration::from_millis(2);

/// How an engine abort is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortMode {
    /// Wait until the engine has stopped. Caller context only.
    Blocking,
    /// Request the stop and return at once. Safe in interrupt context; the
    /// caller completes the cleanup later with a blocking abort.
    Deferred,
}

/// Data bus width of the capture peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    Bits8,
    Bits10,
    Bits12,
    Bits14,
}

/// Synchronisation and sampling options of the parallel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub vsync_active_high: bool,
    pub hsync_active_high: bool,
    /// Sample data on the rising pixel clock edge.
    pub pclk_rising: bool,
    pub width: BusWidth,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            vsync_active_high: false,
            hsync_active_high: false,
            pclk_rising: true,
            width: BusWidth::Bits8,
        }
    }
}

/// Everything programmed into the peripheral and its DMA stream before a
/// capture is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub bus: BusConfig,
    pub crop: PeripheralCrop,
    /// Compressed (JPEG) capture; lines carry variable payload.
    pub compressed: bool,
    pub addressing: LineAddressing,
    /// Bytes per DMA transfer: one line, one chunk or one frame half.
    pub transfer_bytes: usize,
}

/// The capture peripheral plus the DMA stream feeding line-buffers.
pub trait CaptureInterface {
    /// Program polarity, crop, bus width and the stream's transfer size.
    fn configure(&mut self, config: &InterfaceConfig) -> Result<(), HwFault>;

    /// Start capturing. Line and frame completions are posted as events.
    fn enable(&mut self) -> Result<(), HwFault>;

    /// Stop capturing after the current line.
    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    /// Deposit the payload of transfer `index` into `dst` and return the
    /// number of bytes written. This is the DMA stream's memory write for the
    /// transfer that was signalled complete.
    fn receive(&mut self, index: u32, dst: &mut [u8]) -> usize;

    /// Flush bytes still held in the peripheral FIFO at end of frame into
    /// `dst`. Returns how many bytes the FIFO held; only the first
    /// `dst.len()` of them are written.
    fn drain(&mut self, dst: &mut [u8]) -> usize;

    /// Abort the DMA stream.
    fn abort(&mut self, mode: AbortMode);
}

/// Geometry of one copy-engine block transfer.
///
/// The engine copies `count` elements of `elem_bytes` each. Element `k` is
/// read at `src_offset + k * src_stride` and written at
/// `dst_offset + k * dst_stride`. A plain line copy is a single element;
/// channel extraction and transpose reinterpret the same line as many
/// small elements with non-unit strides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTransfer {
    pub src_offset: usize,
    pub src_stride: usize,
    pub dst_offset: usize,
    pub dst_stride: usize,
    pub elem_bytes: usize,
    pub count: usize,
}

impl BlockTransfer {
    pub fn contiguous(src_offset: usize, dst_offset: usize, len: usize) -> Self {
        Self {
            src_offset,
            src_stride: len,
            dst_offset,
            dst_stride: len,
            elem_bytes: len,
            count: 1,
        }
    }

    /// Payload bytes moved.
    pub fn len(&self) -> usize {
        self.elem_bytes * self.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the last source byte touched.
    pub fn src_end(&self) -> usize {
        match self.count {
            0 => self.src_offset,
            n => self.src_offset + (n - 1) * self.src_stride + self.elem_bytes,
        }
    }

    /// One past the last destination byte touched.
    pub fn dst_end(&self) -> usize {
        match self.count {
            0 => self.dst_offset,
            n => self.dst_offset + (n - 1) * self.dst_stride + self.elem_bytes,
        }
    }

    /// The same transfer with the destination moved by `step` bytes.
    pub fn advanced(&self, step: usize) -> Self {
        Self {
            dst_offset: self.dst_offset + step,
            ..*self
        }
    }

    /// Carry the transfer out in software.
    ///
    /// # Errors
    ///
    /// Returns a bus error fault when either side falls outside its buffer.
    pub fn execute(&self, src: &[u8], dst: &mut [u8]) -> Result<(), HwFault> {
        if self.src_end() > src.len() || self.dst_end() > dst.len() {
            return Err(HwFault::new(Engine::LineRelay, FAULT_BUS_ERROR));
        }
        if self.count == 1 {
            dst[self.dst_offset..self.dst_offset + self.elem_bytes]
                .copy_from_slice(&src[self.src_offset..self.src_offset + self.elem_bytes]);
            return Ok(());
        }
        for k in 0..self.count {
            let s = self.src_offset + k * self.src_stride;
            let d = self.dst_offset + k * self.dst_stride;
            dst[d..d + self.elem_bytes].copy_from_slice(&src[s..s + self.elem_bytes]);
        }
        Ok(())
    }
}

/// The relay copy engine.
pub trait CopyEngine {
    /// Start a one-shot transfer from `src` into `dst` and return without
    /// waiting. Completion is posted as [`HwEvent::RelayComplete`].
    fn start(&mut self, transfer: &BlockTransfer, src: &[u8], dst: &mut [u8])
        -> Result<(), HwFault>;

    /// Arm the linked sub-channel: each of the next `repeat` hardware
    /// requests replays `transfer`, advancing the destination by `dst_step`
    /// every time. Linked transfers raise no completion interrupt.
    fn link(&mut self, transfer: &BlockTransfer, dst_step: usize, repeat: u32)
        -> Result<(), HwFault>;

    /// A hardware line request from the capture peripheral, consumed by the
    /// linked sub-channel.
    fn request(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(), HwFault>;

    fn is_busy(&self) -> bool;

    fn abort(&mut self, mode: AbortMode);
}

/// A hardware completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwEvent {
    /// The line DMA stream finished transfer `index` carrying `len` bytes.
    LineComplete { index: u32, len: usize },
    /// The peripheral saw the end of frame.
    FrameComplete,
    /// The relay engine finished a one-shot transfer.
    RelayComplete,
    /// An engine reported an error.
    Fault(HwFault),
}

/// Sending side of one interrupt line.
#[derive(Clone)]
pub struct IrqLine {
    tx: kanal::Sender<HwEvent>,
    wake: kanal::Sender<()>,
}

impl IrqLine {
    /// Raise `event`. Returns false if the controller is gone.
    pub fn post(&self, event: HwEvent) -> bool {
        if self.tx.send(event).is_err() {
            return false;
        }
        // A full wake queue already has a wake-up pending.
        let _ = self.wake.try_send(());
        true
    }
}

/// Pending interrupts, one queue per priority level.
pub struct Interrupts {
    relay_tx: kanal::Sender<HwEvent>,
    relay_rx: kanal::Receiver<HwEvent>,
    bus_tx: kanal::Sender<HwEvent>,
    bus_rx: kanal::Receiver<HwEvent>,
    wake_tx: kanal::Sender<()>,
    wake_rx: kanal::Receiver<()>,
}

impl Interrupts {
    pub fn new() -> Self {
        let (relay_tx, relay_rx) = kanal::unbounded();
        let (bus_tx, bus_rx) = kanal::unbounded();
        let (wake_tx, wake_rx) = kanal::bounded(1);
        Self {
            relay_tx,
            relay_rx,
            bus_tx,
            bus_rx,
            wake_tx,
            wake_rx,
        }
    }

    /// Line for peripheral signals: line, frame and stream faults.
    pub fn bus_line(&self) -> IrqLine {
        IrqLine {
            tx: self.bus_tx.clone(),
            wake: self.wake_tx.clone(),
        }
    }

    /// Line for relay engine signals, served ahead of the bus line.
    pub fn relay_line(&self) -> IrqLine {
        IrqLine {
            tx: self.relay_tx.clone(),
            wake: self.wake_tx.clone(),
        }
    }

    fn pending(&self) -> Option<HwEvent> {
        if let Ok(Some(event)) = self.relay_rx.try_recv() {
            return Some(event);
        }
        if let Ok(Some(event)) = self.bus_rx.try_recv() {
            return Some(event);
        }
        None
    }

    /// Next pending relay event, without waiting.
    pub(crate) fn take_relay(&self) -> Option<HwEvent> {
        self.relay_rx.try_recv().ok().flatten()
    }

    /// Return the next pending event, sleeping for at most one short slice
    /// of `timeout`. Either line wakes the sleeper; relay events are still
    /// returned first.
    pub fn wait(&self, timeout: Duration) -> Option<HwEvent> {
        if let Some(event) = self.pending() {
            return Some(event);
        }
        let slice = timeout.min(WAIT_SLICE);
        if slice.is_zero() {
            return None;
        }
        // Events are queued before their wake-up, so a wake-up left over
        // from an event already taken only costs one empty pass.
        let _ = self.wake_rx.recv_timeout(slice);
        self.pending()
    }

    /// Discard every pending event and return how many were dropped.
    pub fn flush(&self) -> usize {
        let mut count = 0;
        while self.pending().is_some() {
            count += 1;
        }
        while let Ok(Some(())) = self.wake_rx.try_recv() {}
        if count > 0 {
            trace!(count, "stale interrupts flushed");
        }
        count
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}
