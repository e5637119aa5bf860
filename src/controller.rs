// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The capture controller.
//!
//! [`CaptureContext`] owns the frame buffer pool, both engines and the cache
//! front end, and runs the capture state machine:
//!
//! ```text
//! IDLE --snapshot--> ARMED --first line--> STREAMING --end of frame--> FRAME_DONE
//!   ^                  |                       |                           |
//!   |                  +---- fault/timeout ----+----> ABORTING ------------+--> IDLE
//!   +---------------------- observed by snapshot (or re-armed) -----------+
//! ```
//!
//! Interrupt handling is the [`CaptureContext::dispatch`] method. It is
//! driven from the blocking wait loop of [`CaptureContext::snapshot`], which
//! takes the next [`HwEvent`] from the [`Interrupts`] queues; exclusive
//! `&mut` access is the critical section between handler and caller. Relay
//! completions are always dispatched ahead of bus events.

use crate::{
    cache::{is_aligned, CacheMaintenance, Coherency, COHERENCY_GRANULE},
    error::{CaptureError, HwFault},
    geometry::{CaptureGeometry, LineAddressing, TransferLimits, TransferPlan},
    hal::{AbortMode, BusConfig, CaptureInterface, CopyEngine, HwEvent, Interrupts, FAULT_OVERRUN},
    image::Image,
    jpeg::JpegAdapter,
    line::{CaptureMode, LineTransferEngine},
    pool::{FrameBufferPool, FrameInfo},
    relay::RelayEngine,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn};

/// Capture state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Armed,
    Streaming,
    FrameDone,
    Aborting,
}

/// Payload of the line event callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    /// Window line (raw) or chunk index (compressed).
    pub line: u32,
    /// Bytes the line transfer delivered.
    pub bytes: usize,
}

/// Running counters of a capture context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// End-of-frame signals observed.
    pub frames: u64,
    /// Frames published to the head role.
    pub retires: u64,
    pub drops: u64,
    pub timeouts: u64,
    pub overflows: u64,
    pub faults: u64,
    /// Line completions handled by the CPU.
    pub line_irqs: u64,
    /// Lines relayed by the linked sub-channel without CPU involvement.
    pub hw_line_triggers: u64,
    /// Payload bytes delivered in published frames.
    pub bytes: u64,
}

/// Capture context configuration.
///
/// ```
/// use edgefirst_capture::controller::ContextConfig;
/// use std::time::Duration;
///
/// let config = ContextConfig::default()
///     .with_buffers(3)
///     .with_timeout(Duration::from_millis(500))
///     .with_continuous(true);
/// assert_eq!(config.buffers, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Frame buffers in the pool, 2 to 4.
    pub buffers: usize,
    /// Capacity of each frame buffer.
    pub buffer_bytes: usize,
    /// Capacity of each line-buffer slot.
    pub line_slot_bytes: usize,
    /// Wall-clock deadline of one snapshot.
    pub timeout: Duration,
    /// Re-arm on the next free buffer after every frame.
    pub continuous: bool,
    /// Allow full offload of untransformed frames to the relay chain.
    pub chaining: bool,
    /// Compressed data is streamed straight into the frame buffer.
    pub frame_direct_compressed: bool,
    /// Largest block the relay engine moves in one transfer.
    pub max_block_bytes: usize,
    /// Idle checks of the relay engine at end of frame.
    pub relay_spin_budget: u32,
    pub bus: BusConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            buffers: 2,
            buffer_bytes: 640 * 480 * 2,
            line_slot_bytes: 4096,
            timeout: Duration::from_secs(3),
            continuous: false,
            chaining: true,
            frame_direct_compressed: false,
            max_block_bytes: 65536,
            relay_spin_budget: 100_000,
            bus: BusConfig::default(),
        }
    }
}

impl ContextConfig {
    pub fn with_buffers(mut self, buffers: usize) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_buffer_bytes(mut self, bytes: usize) -> Self {
        self.buffer_bytes = bytes;
        self
    }

    pub fn with_line_slot_bytes(mut self, bytes: usize) -> Self {
        self.line_slot_bytes = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_chaining(mut self, chaining: bool) -> Self {
        self.chaining = chaining;
        self
    }

    pub fn with_frame_direct_compressed(mut self, direct: bool) -> Self {
        self.frame_direct_compressed = direct;
        self
    }

    pub fn with_max_block_bytes(mut self, bytes: usize) -> Self {
        self.max_block_bytes = bytes;
        self
    }

    pub fn with_relay_spin_budget(mut self, budget: u32) -> Self {
        self.relay_spin_budget = budget;
        self
    }

    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    /// Limits a geometry is planned against.
    pub fn limits(&self) -> TransferLimits {
        TransferLimits {
            line_slot_bytes: self.line_slot_bytes,
            frame_bytes: self.buffer_bytes,
            max_block_bytes: self.max_block_bytes,
            chaining: self.chaining,
            frame_direct_compressed: self.frame_direct_compressed,
        }
    }
}

type FrameCallback = Box<dyn FnMut(&FrameInfo) + Send>;
type LineCallback = Box<dyn FnMut(&LineEvent) + Send>;

/// Bookkeeping of the frame currently being captured.
#[derive(Debug)]
struct Active {
    plan: TransferPlan,
    armed_at: Instant,
    lines_relayed: u32,
    /// Window line of the one-shot relay transfer in flight.
    relay_inflight: Option<u32>,
    /// Prefix of the frame already invalidated line by line.
    invalidated: usize,
    dropped_at: Option<u32>,
    frame_ended: bool,
}

impl Active {
    fn new(plan: TransferPlan) -> Self {
        Self {
            plan,
            armed_at: Instant::now(),
            lines_relayed: 0,
            relay_inflight: None,
            invalidated: 0,
            dropped_at: None,
            frame_ended: false,
        }
    }
}

/// A parallel capture pipeline over one peripheral `I`, one relay engine
/// `E` and the cache maintenance backend `C`.
pub struct CaptureContext<I, E, C> {
    config: ContextConfig,
    state: CaptureState,
    pool: FrameBufferPool,
    line: LineTransferEngine<I>,
    relay: RelayEngine<E>,
    coherency: Coherency<C>,
    jpeg: JpegAdapter,
    irq: Interrupts,
    armed: Option<TransferPlan>,
    active: Option<Active>,
    outcome: Option<Result<(), CaptureError>>,
    pending_error: Option<CaptureError>,
    sequence: u64,
    stats: CaptureStats,
    frame_cb: Option<FrameCallback>,
    line_cb: Option<LineCallback>,
}

impl<I, E, C> CaptureContext<I, E, C>
where
    I: CaptureInterface,
    E: CopyEngine,
    C: CacheMaintenance,
{
    /// Build a context. The pool and line-buffers are allocated here and
    /// never again. `irq` must be the queue the hardware posts events to.
    ///
    /// # Panics
    ///
    /// Panics if `config.buffers` is 0.
    pub fn new(interface: I, engine: E, cache: C, irq: Interrupts, config: ContextConfig) -> Self {
        if !(2..=4).contains(&config.buffers) {
            warn!(buffers = config.buffers, "frame buffer count outside 2..=4");
        }
        let pool = FrameBufferPool::new(config.buffers, config.buffer_bytes);
        let line = LineTransferEngine::new(interface, config.line_slot_bytes, config.bus);
        info!(
            buffers = config.buffers,
            buffer_bytes = config.buffer_bytes,
            line_slot_bytes = config.line_slot_bytes,
            continuous = config.continuous,
            chaining = config.chaining,
            "capture context created"
        );
        Self {
            config,
            state: CaptureState::Idle,
            pool,
            line,
            relay: RelayEngine::new(engine),
            coherency: Coherency::new(cache),
            jpeg: JpegAdapter::new(),
            irq,
            armed: None,
            active: None,
            outcome: None,
            pending_error: None,
            sequence: 0,
            stats: CaptureStats::default(),
            frame_cb: None,
            line_cb: None,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    pub fn interface(&self) -> &I {
        self.line.interface()
    }

    pub fn interface_mut(&mut self) -> &mut I {
        self.line.interface_mut()
    }

    pub fn engine(&self) -> &E {
        self.relay.engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.relay.engine_mut()
    }

    pub fn cache(&self) -> &C {
        self.coherency.inner()
    }

    pub fn cache_mut(&mut self) -> &mut C {
        self.coherency.inner_mut()
    }

    /// Called with the metadata of every published frame.
    pub fn register_frame_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&FrameInfo) + Send + 'static,
    {
        self.frame_cb = Some(Box::new(callback));
    }

    /// Called for every line (or chunk) the CPU handles.
    pub fn register_line_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&LineEvent) + Send + 'static,
    {
        self.line_cb = Some(Box::new(callback));
    }

    /// Capture a frame and return it.
    ///
    /// Arms a capture if none is pending, then blocks until the frame
    /// completes, fails or the configured timeout expires. The returned
    /// image borrows the head buffer.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::InvalidGeometry`] and
    ///   [`CaptureError::BufferUnavailable`] before any hardware is touched.
    /// - [`CaptureError::CaptureTimeout`] after aborting the pipeline.
    /// - [`CaptureError::FrameDropped`], [`CaptureError::CompressedOverflow`]
    ///   and [`CaptureError::EngineFault`] as observed on the frame.
    pub fn snapshot(&mut self, geometry: &CaptureGeometry) -> Result<Image<'_>, CaptureError> {
        let span = info_span!(
            "snapshot",
            width = geometry.window.width,
            height = geometry.window.height,
            format = %geometry.format
        );
        let _enter = span.enter();

        let plan = geometry.plan(&self.config.limits())?;

        if self.state == CaptureState::Aborting {
            return Err(self.finish_failed_abort());
        }
        if self.state != CaptureState::Idle && self.armed != Some(plan) {
            debug!(state = ?self.state, "geometry changed, aborting armed capture");
            self.abort_capture();
        }
        if self.state == CaptureState::FrameDone && self.outcome.is_none() && self.active.is_none()
        {
            self.state = CaptureState::Idle;
        }
        if self.state == CaptureState::Idle {
            self.arm(plan)?;
        }

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(outcome) = self.outcome.take() {
                if self.state == CaptureState::FrameDone {
                    self.line.stop();
                    self.state = CaptureState::Idle;
                }
                outcome?;
                return self.head_image();
            }
            if self.state == CaptureState::Aborting {
                return Err(self.finish_failed_abort());
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(timeout = ?self.config.timeout, state = ?self.state, "capture timeout");
                self.state = CaptureState::Aborting;
                self.finish_abort();
                self.stats.timeouts += 1;
                return Err(CaptureError::CaptureTimeout {
                    timeout: self.config.timeout,
                });
            }
            if let Some(event) = self.irq.wait(deadline - now) {
                self.dispatch(event);
            }
        }
    }

    /// The newest complete frame, if any.
    pub fn peek_head(&self) -> Option<Image<'_>> {
        self.pool.peek_head().and_then(Image::from_buffer)
    }

    /// Hand the head buffer back to the pool once the caller is done with
    /// it. Returns false if there was no head.
    pub fn release_frame(&mut self) -> bool {
        self.pool.consume_head().is_some()
    }

    /// Abort any capture in progress from caller context. Waits for both
    /// engines to stop and resets the pool to its idle layout.
    pub fn abort_capture(&mut self) {
        if self.state != CaptureState::Idle {
            info!(state = ?self.state, "capture aborted");
        }
        self.state = CaptureState::Aborting;
        self.finish_abort();
        self.outcome = None;
        self.pending_error = None;
    }

    /// Stop everything and hand the hardware back.
    pub fn shutdown(mut self) -> (I, E, C) {
        self.abort_capture();
        debug!(stats = ?self.stats, "capture context shut down");
        let Self {
            line,
            relay,
            coherency,
            ..
        } = self;
        (line.into_interface(), relay.into_engine(), coherency.into_inner())
    }

    /// Interrupt entry point: handle one hardware event.
    pub fn dispatch(&mut self, event: HwEvent) {
        trace!(?event, state = ?self.state, "dispatch");
        match event {
            HwEvent::Fault(fault) => self.on_fault(fault),
            _ if self.state == CaptureState::Aborting => {}
            HwEvent::LineComplete { index, len } => self.on_line(index, len),
            HwEvent::RelayComplete => self.on_relay_complete(),
            HwEvent::FrameComplete => self.on_frame_end(),
        }
    }

    fn head_image(&self) -> Result<Image<'_>, CaptureError> {
        self.peek_head().ok_or(CaptureError::BufferUnavailable)
    }

    fn arm(&mut self, plan: TransferPlan) -> Result<(), CaptureError> {
        let target = self
            .pool
            .acquire_target()
            .ok_or(CaptureError::BufferUnavailable)?;
        self.coherency.publish(self.pool.buffer(target).data());
        self.irq.flush();

        if let Err(fault) = self.start_engines(&plan) {
            self.line.abort(AbortMode::Blocking);
            self.relay.abort(AbortMode::Blocking);
            self.pool.discard_tail();
            self.stats.faults += 1;
            return Err(fault.into());
        }

        self.active = Some(Active::new(plan));
        self.armed = Some(plan);
        self.outcome = None;
        self.state = CaptureState::Armed;
        debug!(
            target,
            lines = plan.lines(),
            frame_bytes = plan.frame_bytes,
            chained = plan.chained,
            "capture armed"
        );
        Ok(())
    }

    fn start_engines(&mut self, plan: &TransferPlan) -> Result<(), HwFault> {
        self.line.configure(plan, &mut self.coherency)?;
        if plan.is_compressed() {
            self.jpeg.begin();
        }
        if plan.chained {
            self.relay.link_frame(plan)?;
        }
        let mode = if self.config.continuous {
            CaptureMode::Continuous
        } else {
            CaptureMode::Snapshot
        };
        self.line.start(mode)
    }

    /// Re-arm for the next frame while the peripheral keeps running.
    fn rearm(&mut self) {
        if !self.config.continuous || self.state != CaptureState::FrameDone {
            return;
        }
        let Some(plan) = self.armed else {
            return;
        };
        let Some(target) = self.pool.acquire_target() else {
            debug!("no free buffer, continuous capture paused");
            self.line.stop();
            return;
        };
        self.coherency.publish(self.pool.buffer(target).data());
        if plan.is_compressed() {
            self.jpeg.begin();
        }
        if plan.chained {
            if let Err(fault) = self.relay.link_frame(&plan) {
                self.abort_deferred(fault);
                return;
            }
        }
        self.active = Some(Active::new(plan));
        self.state = CaptureState::Armed;
        trace!(target, "capture re-armed");
    }

    fn on_line(&mut self, index: u32, len: usize) {
        let Some(active) = self.active.as_mut() else {
            trace!(index, "line outside capture");
            return;
        };
        if self.state == CaptureState::Armed {
            self.state = CaptureState::Streaming;
        }
        let plan = active.plan;
        if plan.is_compressed() {
            self.on_chunk(index, len);
            return;
        }

        let hw_path = plan.chained && index > 0;
        if hw_path {
            self.stats.hw_line_triggers += 1;
        } else {
            self.stats.line_irqs += 1;
        }
        let (slot, written) = self.line.receive(index, len.min(plan.line_bytes));
        if active.dropped_at.is_some() || active.frame_ended {
            return;
        }
        if written < plan.line_bytes || index >= plan.lines() {
            warn!(index, written, expected = plan.line_bytes, "malformed line");
            active.dropped_at = Some(index);
            return;
        }
        if hw_path {
            let Some(tail) = self.pool.tail_mut() else {
                return;
            };
            let src = self.line.slot(slot);
            match self.relay.request(src, tail.data_mut()) {
                Ok(()) => {
                    active.lines_relayed += 1;
                    tail.advance(1);
                }
                Err(fault) if fault.code == FAULT_OVERRUN => {
                    warn!(line = index, "relay chain overrun");
                    active.dropped_at = Some(index);
                }
                Err(fault) => self.abort_deferred(fault),
            }
            return;
        }

        if !self.relay_settled() {
            if let Some(active) = self.active.as_mut() {
                warn!(line = index, "relay engine busy, dropping frame");
                active.dropped_at = Some(index);
            }
            return;
        }
        if self.state == CaptureState::Aborting {
            return;
        }
        let (Some(active), Some(tail)) = (self.active.as_mut(), self.pool.tail_mut()) else {
            return;
        };
        let src = self.line.slot(slot);
        if let Err(fault) = self.relay.relay_line(&plan, index, src, tail.data_mut()) {
            self.abort_deferred(fault);
            return;
        }
        active.relay_inflight = Some(index);
        if let Some(cb) = self.line_cb.as_mut() {
            cb(&LineEvent {
                line: index,
                bytes: written,
            });
        }
    }

    /// Whether the previous one-shot relay transfer is finished and its
    /// completion handled. Completions already raised are handled here, so
    /// an engine that drops its busy flag ahead of the event is not
    /// mistaken for one that fell behind.
    fn relay_settled(&mut self) -> bool {
        if self.relay.is_busy() {
            return false;
        }
        self.dispatch_relay_events();
        self.active
            .as_ref()
            .map_or(true, |active| active.relay_inflight.is_none())
    }

    fn dispatch_relay_events(&mut self) {
        while let Some(event) = self.irq.take_relay() {
            self.dispatch(event);
        }
    }

    fn on_chunk(&mut self, index: u32, len: usize) {
        self.stats.line_irqs += 1;
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.frame_ended {
            return;
        }
        let addressing = active.plan.addressing;
        let Some(tail) = self.pool.tail_mut() else {
            return;
        };
        let accepted = match addressing {
            LineAddressing::FrameDirect { .. } => {
                let at = tail.write_cursor();
                let fit = len.min(tail.remaining());
                let written = self
                    .line
                    .receive_into(index, &mut tail.data_mut()[at..at + fit]);
                self.jpeg.commit(tail, len, written)
            }
            _ => {
                let (slot, written) = self.line.receive(index, len);
                self.coherency.invalidate(self.line.slot(slot));
                self.jpeg.append(tail, &self.line.slot(slot)[..written])
            }
        };
        if accepted {
            if let Some(cb) = self.line_cb.as_mut() {
                cb(&LineEvent {
                    line: index,
                    bytes: len,
                });
            }
        }
    }

    fn on_relay_complete(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(line) = active.relay_inflight.take() else {
            trace!("relay completion without transfer");
            return;
        };
        if active.dropped_at.is_none() {
            active.lines_relayed += 1;
            if let Some(tail) = self.pool.tail_mut() {
                tail.advance(1);
                // Rows that start and end on a granule are invalidated as
                // soon as the engine is done with them; the rest of the frame
                // is invalidated once at the end.
                let plan = active.plan;
                let row = plan.line_pixels() * plan.dst_bpp;
                let start = line as usize * row;
                if !plan.geometry.transpose
                    && is_aligned(row, COHERENCY_GRANULE)
                    && start == active.invalidated
                {
                    self.coherency.invalidate(&tail.data()[start..start + row]);
                    active.invalidated = start + row;
                }
            }
        }
        if active.frame_ended {
            self.try_finalize();
        }
    }

    fn on_frame_end(&mut self) {
        let Some(active) = self.active.as_mut() else {
            trace!("frame end outside capture");
            return;
        };
        self.stats.frames += 1;
        active.frame_ended = true;
        let compressed = active.plan.is_compressed();
        self.line.frame_ended();
        self.state = CaptureState::FrameDone;
        if compressed {
            self.finalize_compressed();
            return;
        }
        if !self.relay.wait_idle(self.config.relay_spin_budget) {
            debug!("relay engine still busy at end of frame");
        }
        self.dispatch_relay_events();
        self.try_finalize();
    }

    fn on_fault(&mut self, fault: HwFault) {
        warn!(%fault, state = ?self.state, "engine fault");
        if self.active.is_none() || self.state == CaptureState::Aborting {
            self.stats.faults += 1;
            return;
        }
        self.abort_deferred(fault);
    }

    /// Abort from interrupt context. The caller finishes the cleanup.
    fn abort_deferred(&mut self, fault: HwFault) {
        self.line.abort(AbortMode::Deferred);
        self.relay.abort(AbortMode::Deferred);
        self.stats.faults += 1;
        self.pending_error = Some(fault.into());
        self.state = CaptureState::Aborting;
    }

    fn finish_abort(&mut self) {
        self.line.abort(AbortMode::Blocking);
        self.relay.abort(AbortMode::Blocking);
        self.pool.flush();
        self.active = None;
        self.irq.flush();
        self.state = CaptureState::Idle;
    }

    fn finish_failed_abort(&mut self) -> CaptureError {
        let err = self
            .pending_error
            .take()
            .unwrap_or(CaptureError::CaptureTimeout {
                timeout: self.config.timeout,
            });
        self.finish_abort();
        err
    }

    /// Close the raw frame once the last relay transfer has landed.
    fn try_finalize(&mut self) {
        if self.state == CaptureState::Aborting {
            return;
        }
        // A started transfer without an observed completion keeps the frame
        // open; its completion finalizes it.
        let ready = match &self.active {
            Some(active) => active.frame_ended && active.relay_inflight.is_none(),
            None => false,
        };
        if ready && !self.relay.is_busy() {
            self.finalize_raw();
        }
    }

    fn finalize_raw(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let plan = active.plan;
        let short = (active.lines_relayed < plan.lines()).then_some(active.lines_relayed);
        if let Some(line) = active.dropped_at.or(short) {
            self.pool.discard_tail();
            self.stats.drops += 1;
            warn!(line, relayed = active.lines_relayed, "frame dropped");
            self.outcome = Some(Err(CaptureError::FrameDropped { line }));
        } else {
            if let Some(tail) = self.pool.tail_mut() {
                if active.invalidated < plan.frame_bytes {
                    self.coherency
                        .invalidate_covering(tail.data(), active.invalidated..plan.frame_bytes);
                }
            }
            self.publish(&plan, plan.frame_bytes, active.armed_at);
        }
        self.rearm();
    }

    fn finalize_compressed(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let plan = active.plan;
        let Some(tail) = self.pool.tail_mut() else {
            return;
        };
        self.jpeg.drain(tail, &mut self.line);
        let written = tail.write_cursor();
        if tail.overflowed() {
            let capacity = tail.size();
            self.pool.discard_tail();
            self.stats.overflows += 1;
            self.outcome = Some(Err(CaptureError::CompressedOverflow { capacity, written }));
        } else if written == 0 {
            self.pool.discard_tail();
            self.stats.drops += 1;
            warn!("compressed frame ended without payload");
            self.outcome = Some(Err(CaptureError::FrameDropped { line: 0 }));
        } else {
            if matches!(plan.addressing, LineAddressing::FrameDirect { .. }) {
                self.coherency.invalidate_covering(tail.data(), 0..written);
            }
            self.publish(&plan, written, active.armed_at);
        }
        self.rearm();
    }

    /// Retire the tail to head with its metadata.
    fn publish(&mut self, plan: &TransferPlan, used: usize, armed_at: Instant) {
        let info = FrameInfo {
            sequence: self.sequence,
            width: plan.out_width,
            height: plan.out_height,
            format: plan.geometry.format,
            size: used,
            duration: armed_at.elapsed(),
        };
        if let Some(tail) = self.pool.tail_mut() {
            tail.complete(used, info);
        }
        let Some(head) = self.pool.retire_tail_to_head() else {
            return;
        };
        self.sequence += 1;
        self.stats.retires += 1;
        self.stats.bytes += used as u64;
        debug!(
            sequence = info.sequence,
            head,
            size = used,
            duration = ?info.duration,
            "frame retired"
        );
        if let Some(cb) = self.frame_cb.as_mut() {
            cb(&info);
        }
        self.outcome = Some(Ok(()));
    }
}
