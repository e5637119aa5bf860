// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Fixed-capacity frame buffer pool.
//!
//! The pool is an arena of [`VBuffer`]s allocated once when the capture
//! context is created. Captures never allocate: each cycle only relabels the
//! role of a buffer between [`Role::Free`], [`Role::Tail`] (being written by
//! the active capture) and [`Role::Head`] (the newest complete frame).
//!
//! Invariants held after every operation:
//!
//! - at most one buffer is `Tail` and at most one is `Head`;
//! - every buffer has exactly one role;
//! - `Head` is never the buffer being written, and never overflowed.

use crate::{cache::GranuleBuffer, geometry::PixelFormat};
use std::{fmt, time::Duration};
use tracing::{debug, info};

/// Role currently assigned to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Free,
    Tail,
    Head,
}

/// Metadata stamped on a buffer when its frame is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Monotonic frame counter of the capture context.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Valid payload bytes.
    pub size: usize,
    /// Time from arming to end of frame.
    pub duration: Duration,
}

/// One frame-sized region and its write state.
pub struct VBuffer {
    index: usize,
    data: GranuleBuffer,
    write_cursor: usize,
    used: usize,
    overflow: bool,
    info: Option<FrameInfo>,
}

impl VBuffer {
    fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            data: GranuleBuffer::new(capacity),
            write_cursor: 0,
            used: 0,
            overflow: false,
            info: None,
        }
    }

    /// Position of this buffer in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Capacity in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lines relayed so far (raw) or compressed bytes written so far.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Valid bytes of the completed frame.
    pub fn size_used(&self) -> usize {
        self.used
    }

    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    pub fn info(&self) -> Option<&FrameInfo> {
        self.info.as_ref()
    }

    /// The whole backing region, including bytes beyond the frame.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The valid frame payload.
    pub fn bytes(&self) -> &[u8] {
        &self.data.as_slice()[..self.used]
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.size() - self.write_cursor
    }

    pub(crate) fn advance(&mut self, count: usize) {
        self.write_cursor += count;
    }

    pub(crate) fn mark_overflow(&mut self) {
        self.overflow = true;
    }

    pub(crate) fn complete(&mut self, used: usize, info: FrameInfo) {
        self.used = used;
        self.info = Some(info);
    }

    fn reset(&mut self) {
        self.write_cursor = 0;
        self.used = 0;
        self.overflow = false;
        self.info = None;
    }
}

impl fmt::Debug for VBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VBuffer")
            .field("index", &self.index)
            .field("size", &self.size())
            .field("write_cursor", &self.write_cursor)
            .field("used", &self.used)
            .field("overflow", &self.overflow)
            .finish()
    }
}

/// Ring of frame buffers with free / tail / head roles.
pub struct FrameBufferPool {
    buffers: Vec<VBuffer>,
    roles: Vec<Role>,
    tail: Option<usize>,
    head: Option<usize>,
    next_free: usize,
}

impl FrameBufferPool {
    /// Allocate `count` buffers of at least `capacity` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0.
    pub fn new(count: usize, capacity: usize) -> Self {
        assert!(count > 0, "pool needs at least one buffer");
        let buffers: Vec<VBuffer> = (0..count).map(|i| VBuffer::new(i, capacity)).collect();
        info!(
            count,
            capacity = buffers[0].size(),
            pinned = buffers.iter().all(|b| b.data.is_pinned()),
            "frame buffer pool allocated"
        );
        Self {
            roles: vec![Role::Free; count],
            buffers,
            tail: None,
            head: None,
            next_free: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer(&self, index: usize) -> &VBuffer {
        &self.buffers[index]
    }

    pub fn buffers(&self) -> impl Iterator<Item = &VBuffer> {
        self.buffers.iter()
    }

    pub fn role(&self, index: usize) -> Role {
        self.roles[index]
    }

    /// The buffer that would become the next capture target.
    pub fn free(&self) -> Option<usize> {
        let n = self.buffers.len();
        (0..n)
            .map(|step| (self.next_free + step) % n)
            .find(|&i| self.roles[i] == Role::Free)
    }

    pub fn free_count(&self) -> usize {
        self.roles.iter().filter(|&&r| r == Role::Free).count()
    }

    pub fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn tail_mut(&mut self) -> Option<&mut VBuffer> {
        self.tail.map(|i| &mut self.buffers[i])
    }

    /// Mark the free buffer as the capture target and return its index.
    ///
    /// Returns `None` when nothing is free or a capture target already
    /// exists.
    pub fn acquire_target(&mut self) -> Option<usize> {
        if self.tail.is_some() {
            return None;
        }
        let index = self.free()?;
        self.roles[index] = Role::Tail;
        self.tail = Some(index);
        self.next_free = (index + 1) % self.buffers.len();
        self.buffers[index].reset();
        debug!(index, "frame buffer acquired");
        Some(index)
    }

    /// Promote the capture target to head, demoting the previous head to
    /// free. Returns the new head index.
    pub fn retire_tail_to_head(&mut self) -> Option<usize> {
        let tail = self.tail.take()?;
        if let Some(old) = self.head.replace(tail) {
            self.roles[old] = Role::Free;
        }
        self.roles[tail] = Role::Head;
        debug!(index = tail, "frame buffer retired to head");
        Some(tail)
    }

    /// Return the capture target to the free set without publishing it.
    pub fn discard_tail(&mut self) -> Option<usize> {
        let tail = self.tail.take()?;
        self.roles[tail] = Role::Free;
        self.buffers[tail].reset();
        debug!(index = tail, "frame buffer discarded");
        Some(tail)
    }

    pub fn peek_head(&self) -> Option<&VBuffer> {
        self.head.map(|i| &self.buffers[i])
    }

    /// Release the head buffer back to the free set.
    pub fn consume_head(&mut self) -> Option<usize> {
        let head = self.head.take()?;
        self.roles[head] = Role::Free;
        Some(head)
    }

    /// Reset every role to free except an existing head.
    pub fn flush(&mut self) {
        self.discard_tail();
        for (i, role) in self.roles.iter_mut().enumerate() {
            if Some(i) != self.head {
                *role = Role::Free;
            }
        }
    }

    /// Verify the role bookkeeping is consistent.
    pub fn check_invariants(&self) -> bool {
        let tails = self.roles.iter().filter(|&&r| r == Role::Tail).count();
        let heads = self.roles.iter().filter(|&&r| r == Role::Head).count();
        let tail_ok = match self.tail {
            Some(i) => tails == 1 && self.roles[i] == Role::Tail,
            None => tails == 0,
        };
        let head_ok = match self.head {
            Some(i) => heads == 1 && self.roles[i] == Role::Head && !self.buffers[i].overflow,
            None => heads == 0,
        };
        tail_ok && head_ok && (self.tail.is_none() || self.tail != self.head)
    }
}

impl fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBufferPool")
            .field("roles", &self.roles)
            .field("tail", &self.tail)
            .field("head", &self.head)
            .finish()
    }
}
