// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Line relay engine: line-buffer to frame buffer.
//!
//! Each finished line is moved by a single copy-engine block transfer. Crop
//! remainders, transposition and luma extraction are not done by the CPU;
//! they are folded into the block geometry (source offset, element size and
//! the two strides) so the engine does the work while the next line is
//! still arriving.
//!
//! When a frame needs none of those transformations the controller can hand
//! the whole frame to the engine: line 0 goes through the one-shot
//! sub-channel and the linked sub-channel replays the same transfer for every
//! later line on the peripheral's hardware request, advancing the
//! destination by one row each time.

use crate::{
    error::HwFault,
    geometry::TransferPlan,
    hal::{AbortMode, BlockTransfer, CopyEngine},
};
use std::hint;
use tracing::{debug, trace};

/// Block transfer relaying window line `line` of `plan` out of a line-buffer.
pub fn line_transfer(plan: &TransferPlan, line: u32) -> BlockTransfer {
    let width = plan.line_pixels();
    let line = line as usize;
    let first = plan.dst_offset(line, 0);
    if plan.geometry.transpose {
        BlockTransfer {
            src_offset: plan.crop_remainder,
            src_stride: plan.bus_bpp,
            dst_offset: first,
            dst_stride: plan.dst_offset(line, 1) - first,
            elem_bytes: plan.dst_bpp,
            count: width,
        }
    } else if plan.bus_bpp != plan.dst_bpp {
        BlockTransfer {
            src_offset: plan.crop_remainder,
            src_stride: plan.bus_bpp,
            dst_offset: first,
            dst_stride: plan.dst_bpp,
            elem_bytes: plan.dst_bpp,
            count: width,
        }
    } else {
        BlockTransfer::contiguous(plan.crop_remainder, first, width * plan.dst_bpp)
    }
}

pub struct RelayEngine<E> {
    engine: E,
    linked: u32,
}

impl<E: CopyEngine> RelayEngine<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, linked: 0 }
    }

    /// Start relaying `line` from `src` (a line-buffer) into `dst` (the
    /// target frame buffer). Returns once the transfer is queued.
    pub fn relay_line(
        &mut self,
        plan: &TransferPlan,
        line: u32,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<(), HwFault> {
        let transfer = line_transfer(plan, line);
        trace!(line, ?transfer, "relay line");
        self.engine.start(&transfer, src, dst)
    }

    /// Arm the self-retriggering chain for lines `1..plan.lines()`.
    pub fn link_frame(&mut self, plan: &TransferPlan) -> Result<(), HwFault> {
        let repeat = plan.lines().saturating_sub(1);
        if repeat == 0 {
            return Ok(());
        }
        let template = line_transfer(plan, 1);
        let step = plan.line_pixels() * plan.dst_bpp;
        self.engine.link(&template, step, repeat)?;
        self.linked = repeat;
        debug!(repeat, step, "relay chain linked");
        Ok(())
    }

    /// Hardware line request routed to the linked sub-channel.
    pub fn request(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(), HwFault> {
        self.engine.request(src, dst)
    }

    /// Lines the current chain was armed for.
    pub fn linked_lines(&self) -> u32 {
        self.linked
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    /// Spin until the engine is idle, checking at most `budget` times.
    pub fn wait_idle(&self, budget: u32) -> bool {
        for _ in 0..budget {
            if !self.engine.is_busy() {
                return true;
            }
            hint::spin_loop();
        }
        !self.engine.is_busy()
    }

    pub fn abort(&mut self, mode: AbortMode) {
        self.engine.abort(mode);
        self.linked = 0;
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }
}
