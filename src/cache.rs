// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Cache coherency management between the CPU and the copy engines.
//!
//! Neither the line DMA stream nor the relay engine snoops the CPU data
//! cache. Every hand-off therefore goes through one of two maintenance
//! operations:
//!
//! - [`Coherency::publish`] cleans CPU writes out to memory before a DMA
//!   engine reads or overwrites the region. A dirty line that is evicted
//!   after the engine wrote the same address would silently clobber fresh
//!   pixel data.
//! - [`Coherency::invalidate`] discards stale cached copies after an engine
//!   finished writing and before the CPU reads.
//!
//! Maintenance is only defined for whole coherency granules. The helpers here
//! assert alignment instead of rounding silently; the one place a region is
//! allowed to be rounded outward is [`Coherency::invalidate_covering`], which
//! checks that the rounded region still lies inside the owning allocation.
//! All allocations handed to the engines come from [`GranuleBuffer`], which
//! guarantees that property.

use std::{fmt, ops::Range, slice};
use tracing::{trace, warn};

/// Cache line size of the target data cache, in bytes.
pub const COHERENCY_GRANULE: usize = 32;

/// Round `value` down to a multiple of `align` (a power of two).
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align` (a power of two).
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

/// A span of memory subject to cache maintenance.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub addr: usize,
    pub len: usize,
}

impl Region {
    pub fn of(bytes: &[u8]) -> Self {
        Region {
            addr: bytes.as_ptr() as usize,
            len: bytes.len(),
        }
    }

    pub fn end(&self) -> usize {
        self.addr + self.len
    }

    pub fn is_granule_aligned(&self) -> bool {
        is_aligned(self.addr, COHERENCY_GRANULE) && is_aligned(self.len, COHERENCY_GRANULE)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.addr < other.end() && other.addr < self.end()
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.addr >= self.addr && other.end() <= self.end()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{}", self.addr, self.len)
    }
}

/// Architecture cache maintenance primitives.
///
/// Implementations receive only granule-aligned regions.
pub trait CacheMaintenance {
    /// Write back dirty lines covering `region` (clean).
    fn clean(&mut self, region: Region);
    /// Drop cached lines covering `region` without writing them back.
    fn invalidate(&mut self, region: Region);
}

/// Cache maintenance for hosts whose DMA is cache coherent.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostCache;

impl CacheMaintenance for HostCache {
    fn clean(&mut self, region: Region) {
        trace!(?region, "clean");
    }

    fn invalidate(&mut self, region: Region) {
        trace!(?region, "invalidate");
    }
}

/// Alignment-checked front end over a [`CacheMaintenance`] implementation.
pub struct Coherency<C> {
    cache: C,
}

impl<C: CacheMaintenance> Coherency<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    /// Make CPU writes to `bytes` visible to a non-coherent reader or writer.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not granule-aligned in address and length.
    pub fn publish(&mut self, bytes: &[u8]) {
        let region = Region::of(bytes);
        assert!(
            region.is_granule_aligned(),
            "publish of unaligned region {region:?}"
        );
        if region.len > 0 {
            self.cache.clean(region);
        }
    }

    /// Discard stale cached copies of `bytes` after an engine wrote it.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not granule-aligned in address and length.
    pub fn invalidate(&mut self, bytes: &[u8]) {
        let region = Region::of(bytes);
        assert!(
            region.is_granule_aligned(),
            "invalidate of unaligned region {region:?}"
        );
        if region.len > 0 {
            self.cache.invalidate(region);
        }
    }

    /// Invalidate `range` of `owner`, rounded outward to whole granules.
    ///
    /// Used for the final, non-aligned tail of a frame. The rounded region
    /// must stay inside `owner`, which holds for every [`GranuleBuffer`].
    ///
    /// # Panics
    ///
    /// Panics if the rounded region escapes `owner`.
    pub fn invalidate_covering(&mut self, owner: &[u8], range: Range<usize>) {
        let outer = Region::of(owner);
        let start = align_down(outer.addr + range.start, COHERENCY_GRANULE);
        let end = align_up(outer.addr + range.end, COHERENCY_GRANULE);
        let region = Region {
            addr: start,
            len: end - start,
        };
        assert!(
            outer.contains(&region),
            "covering invalidate {region:?} escapes {outer:?}"
        );
        if region.len > 0 {
            self.cache.invalidate(region);
        }
    }

    pub fn inner(&self) -> &C {
        &self.cache
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn into_inner(self) -> C {
        self.cache
    }
}

#[derive(Clone, Copy)]
#[repr(C, align(32))]
struct Granule([u8; COHERENCY_GRANULE]);

const _: () = assert!(std::mem::align_of::<Granule>() == COHERENCY_GRANULE);

/// A granule-aligned, granule-sized allocation made once and reused.
///
/// The backing memory is pinned with `mlock` where the platform allows so
/// that engine addresses stay resident for the lifetime of the pipeline.
pub struct GranuleBuffer {
    blocks: Box<[Granule]>,
    pinned: bool,
}

impl GranuleBuffer {
    /// Allocate at least `len` bytes, rounded up to whole granules.
    pub fn new(len: usize) -> Self {
        let count = align_up(len.max(1), COHERENCY_GRANULE) / COHERENCY_GRANULE;
        let blocks = vec![Granule([0; COHERENCY_GRANULE]); count].into_boxed_slice();
        let mut buffer = Self {
            blocks,
            pinned: false,
        };
        buffer.pin();
        buffer
    }

    #[cfg(unix)]
    fn pin(&mut self) {
        let len = self.len();
        let ret = unsafe { libc::mlock(self.blocks.as_ptr().cast::<libc::c_void>(), len) };
        if ret == 0 {
            self.pinned = true;
        } else {
            warn!(
                len,
                err = %std::io::Error::last_os_error(),
                "unable to pin capture memory"
            );
        }
    }

    #[cfg(not(unix))]
    fn pin(&mut self) {}

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Capacity in bytes, always a multiple of [`COHERENCY_GRANULE`].
    pub fn len(&self) -> usize {
        self.blocks.len() * COHERENCY_GRANULE
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        // Granule is a plain byte array with no padding.
        unsafe { slice::from_raw_parts(self.blocks.as_ptr().cast::<u8>(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        unsafe { slice::from_raw_parts_mut(self.blocks.as_mut_ptr().cast::<u8>(), len) }
    }
}

impl Drop for GranuleBuffer {
    fn drop(&mut self) {
        #[cfg(unix)]
        if self.pinned {
            let len = self.len();
            unsafe { libc::munlock(self.blocks.as_ptr().cast::<libc::c_void>(), len) };
        }
    }
}

impl fmt::Debug for GranuleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GranuleBuffer({:?}, pinned: {})", Region::of(self.as_slice()), self.pinned)
    }
}
