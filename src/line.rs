// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Line transfer engine: capture peripheral to line-buffers.
//!
//! The engine owns the capture interface and two line-buffer slots carved
//! from one pinned, granule-aligned allocation. Depending on the plan the
//! DMA stream alternates between both slots, keeps overwriting slot 0 while
//! a relay chain drains it, or bypasses the slots and writes straight into
//! the frame buffer.

use crate::{
    cache::{align_up, CacheMaintenance, Coherency, GranuleBuffer, COHERENCY_GRANULE},
    error::HwFault,
    geometry::{LineAddressing, TransferPlan},
    hal::{AbortMode, BusConfig, CaptureInterface, InterfaceConfig},
};
use tracing::{debug, trace};

const SLOTS: usize = 2;

/// Whether the peripheral stops by itself after one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Capture a single frame, then disable.
    Snapshot,
    /// Keep capturing frames until stopped.
    Continuous,
}

pub struct LineTransferEngine<I> {
    interface: I,
    slots: GranuleBuffer,
    slot_stride: usize,
    bus: BusConfig,
    config: Option<InterfaceConfig>,
    mode: CaptureMode,
    active: bool,
}

impl<I: CaptureInterface> LineTransferEngine<I> {
    /// Wrap `interface` with two line-buffers of `slot_bytes` each.
    pub fn new(interface: I, slot_bytes: usize, bus: BusConfig) -> Self {
        let slot_stride = align_up(slot_bytes.max(1), COHERENCY_GRANULE);
        Self {
            interface,
            slots: GranuleBuffer::new(slot_stride * SLOTS),
            slot_stride,
            bus,
            config: None,
            mode: CaptureMode::Snapshot,
            active: false,
        }
    }

    /// Capacity of a single line-buffer.
    pub fn slot_capacity(&self) -> usize {
        self.slot_stride
    }

    /// Program the peripheral and DMA stream for `plan`.
    ///
    /// Line-buffers are cleaned first so no dirty cache line can later be
    /// evicted over data the stream wrote.
    pub fn configure<C: CacheMaintenance>(
        &mut self,
        plan: &TransferPlan,
        coherency: &mut Coherency<C>,
    ) -> Result<(), HwFault> {
        let config = InterfaceConfig {
            bus: self.bus,
            crop: plan.crop,
            compressed: plan.is_compressed(),
            addressing: plan.addressing,
            transfer_bytes: plan.line_bytes,
        };
        coherency.publish(self.slots.as_slice());
        self.interface.configure(&config)?;
        debug!(
            addressing = ?config.addressing,
            transfer_bytes = config.transfer_bytes,
            line_start = config.crop.line_start,
            line_count = config.crop.line_count,
            byte_start = config.crop.byte_start,
            "line transfer configured"
        );
        self.config = Some(config);
        Ok(())
    }

    pub fn start(&mut self, mode: CaptureMode) -> Result<(), HwFault> {
        self.mode = mode;
        self.interface.enable()?;
        self.active = true;
        trace!(?mode, "line transfer started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.active {
            self.interface.disable();
            self.active = false;
            trace!("line transfer stopped");
        }
    }

    /// Stop the peripheral and abort the stream.
    pub fn abort(&mut self, mode: AbortMode) {
        self.interface.disable();
        self.interface.abort(mode);
        self.active = false;
    }

    /// End of frame: snapshot captures stop here.
    pub fn frame_ended(&mut self) {
        if self.mode == CaptureMode::Snapshot {
            self.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn addressing(&self) -> Option<LineAddressing> {
        self.config.map(|c| c.addressing)
    }

    /// Slot written by transfer `index`.
    pub fn slot_index(&self, index: u32) -> usize {
        match self.addressing() {
            Some(LineAddressing::CircularRepeat) => 0,
            _ => index as usize % SLOTS,
        }
    }

    /// The whole granule-aligned line-buffer `slot`.
    pub fn slot(&self, slot: usize) -> &[u8] {
        &self.slots.as_slice()[slot * self.slot_stride..(slot + 1) * self.slot_stride]
    }

    /// Let the stream deposit transfer `index` (`len` bytes) into its slot.
    /// Returns the slot used and the byte count written.
    pub fn receive(&mut self, index: u32, len: usize) -> (usize, usize) {
        let slot = self.slot_index(index);
        let start = slot * self.slot_stride;
        let len = len.min(self.slot_stride);
        let written = self
            .interface
            .receive(index, &mut self.slots.as_mut_slice()[start..start + len]);
        (slot, written)
    }

    /// Let the stream deposit transfer `index` straight into `dst`.
    pub fn receive_into(&mut self, index: u32, dst: &mut [u8]) -> usize {
        self.interface.receive(index, dst)
    }

    pub fn drain(&mut self, dst: &mut [u8]) -> usize {
        self.interface.drain(dst)
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    pub fn into_interface(self) -> I {
        self.interface
    }
}
