// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Line handling for compressed (JPEG) captures.
//!
//! In compressed mode a completed transfer is a chunk of arbitrary length
//! rather than a scanline. The adapter appends each chunk at the target
//! buffer's write cursor, either by copying out of a line-buffer or, when the
//! stream writes the frame buffer directly, by only accounting for bytes that
//! are already in place. Any byte that does not fit marks the buffer as
//! overflowed; the frame is then unusable and later chunks are ignored.

use crate::{
    hal::CaptureInterface,
    line::LineTransferEngine,
    pool::VBuffer,
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct JpegAdapter {
    chunks: u32,
}

impl JpegAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new compressed frame.
    pub fn begin(&mut self) {
        self.chunks = 0;
    }

    /// Chunks accepted in the current frame.
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Copy `chunk` (read from a line-buffer) to the end of `tail`.
    /// Returns false once the buffer has overflowed.
    pub fn append(&mut self, tail: &mut VBuffer, chunk: &[u8]) -> bool {
        if tail.overflowed() {
            return false;
        }
        if chunk.len() > tail.remaining() {
            self.overflow(tail, chunk.len());
            return false;
        }
        let at = tail.write_cursor();
        tail.data_mut()[at..at + chunk.len()].copy_from_slice(chunk);
        tail.advance(chunk.len());
        self.chunks += 1;
        true
    }

    /// Account for a chunk of `reported` bytes the stream wrote in place, of
    /// which `written` fit in the buffer.
    pub fn commit(&mut self, tail: &mut VBuffer, reported: usize, written: usize) -> bool {
        if tail.overflowed() {
            return false;
        }
        if reported > written {
            tail.advance(written);
            self.overflow(tail, reported);
            return false;
        }
        tail.advance(written);
        self.chunks += 1;
        true
    }

    /// Pull the bytes the peripheral still holds after end of frame.
    pub fn drain<I: CaptureInterface>(
        &mut self,
        tail: &mut VBuffer,
        line: &mut LineTransferEngine<I>,
    ) -> bool {
        if tail.overflowed() {
            return false;
        }
        let at = tail.write_cursor();
        let space = tail.remaining();
        let pending = line.drain(&mut tail.data_mut()[at..]);
        if pending > space {
            tail.advance(space);
            self.overflow(tail, pending);
            return false;
        }
        tail.advance(pending);
        if pending > 0 {
            debug!(pending, total = tail.write_cursor(), "compressed fifo drained");
        }
        true
    }

    fn overflow(&self, tail: &mut VBuffer, incoming: usize) {
        warn!(
            capacity = tail.size(),
            written = tail.write_cursor(),
            incoming,
            chunk = self.chunks,
            "compressed frame overflow"
        );
        tail.mark_overflow();
    }
}
