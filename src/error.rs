// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error types for the capture pipeline.
//!
//! Errors split into two families. Synchronous errors
//! ([`CaptureError::InvalidGeometry`], [`CaptureError::BufferUnavailable`])
//! are returned before any hardware is touched. Everything else originates in
//! interrupt context, is recorded on the controller, and only surfaces when
//! the caller's blocking [`snapshot`](crate::controller::CaptureContext::snapshot)
//! observes the end of the frame or the abort.

use std::{fmt, time::Duration};
use thiserror::Error;

/// Identifies which hardware mover reported a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// The capture peripheral and its line DMA stream.
    LineTransfer,
    /// The copy engine moving lines into frame buffers.
    LineRelay,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Engine::LineTransfer => "line-transfer",
            Engine::LineRelay => "line-relay",
        };
        write!(f, "{label}")
    }
}

/// A hardware error code raised by one of the engines.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{engine} engine fault (code {code:#x})")]
pub struct HwFault {
    pub engine: Engine,
    pub code: u32,
}

impl HwFault {
    pub fn new(engine: Engine, code: u32) -> Self {
        Self { engine, code }
    }
}

/// Every failure a capture call can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The requested window, width or alignment cannot be met by the
    /// hardware transfer granularity. Never retried automatically.
    #[error("invalid capture geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// No buffer is free for a new capture; the previous frame has not been
    /// consumed.
    #[error("no free frame buffer available")]
    BufferUnavailable,

    /// The frame did not complete within the wall-clock deadline. The
    /// pipeline was aborted and is ready for another attempt.
    #[error("capture timed out after {timeout:?}")]
    CaptureTimeout { timeout: Duration },

    /// The relay engine fell behind the transfer engine; the frame was
    /// discarded.
    #[error("frame dropped at line {line}")]
    FrameDropped { line: u32 },

    /// The compressed payload did not fit in the destination buffer.
    #[error("compressed payload overflowed {capacity} byte buffer ({written} bytes written)")]
    CompressedOverflow { capacity: usize, written: usize },

    /// A copy engine reported a hardware error; the pipeline was aborted.
    #[error("{engine} engine fault (code {code:#x})")]
    EngineFault { engine: Engine, code: u32 },
}

impl CaptureError {
    pub(crate) fn geometry(reason: impl Into<String>) -> Self {
        CaptureError::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Transient errors are expected to clear on the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CaptureError::CaptureTimeout { .. } | CaptureError::FrameDropped { .. }
        )
    }
}

impl From<HwFault> for CaptureError {
    fn from(fault: HwFault) -> Self {
        CaptureError::EngineFault {
            engine: fault.engine,
            code: fault.code,
        }
    }
}
