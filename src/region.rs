//! This module provides the [`CodeRegion`] struct, the process-wide executable pool all
//! translated blocks live in.
//!
//! The region is mapped writable and executable up front (the [`UnsafeMmapFlags::JIT`] path);
//! allocation is a bump pointer and there is no per-block free. When the bump allocator refuses
//! an allocation the whole region is reset, which logically frees every translation at once —
//! the translation cache must be flushed alongside.
//!
//! While the x86-64 host guarantees coherency between the instruction and data caches, the
//! instruction cache is still flushed before a block is published, keeping the publication
//! protocol (write bytes, flush, release-store the valid flag) host-independent.

use crate::error::Error;
use mmap_rs::{MmapMut, MmapOptions, UnsafeMmapFlags};

/// Default region capacity.
pub const DEFAULT_SIZE: usize = 16 << 20;
/// Smallest permitted region capacity.
pub const MIN_SIZE: usize = 1 << 20;
/// Largest permitted region capacity.
pub const MAX_SIZE: usize = 256 << 20;

const PAGE_SIZE: usize = 4096;
const ALLOC_ALIGN: usize = 16;

/// A read-only snapshot of the region counters.
#[derive(Clone, Copy, Debug)]
pub struct RegionStats {
    /// Host address of the region base.
    pub base: u64,
    /// Total capacity in bytes.
    pub capacity: usize,
    /// Bytes consumed by committed blocks (including alignment padding).
    pub used: usize,
    /// Bytes still available.
    pub free: usize,
    /// Number of committed blocks since the last reset.
    pub block_count: usize,
}

/// The executable code region.
pub struct CodeRegion {
    map: MmapMut,
    offset: usize,
    block_count: usize,
}

impl CodeRegion {
    /// Maps a new region of `size` bytes. The size must be page aligned and within
    /// [`MIN_SIZE`]..=[`MAX_SIZE`].
    pub fn new(size: usize) -> Result<Self, Error> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&size) || size % PAGE_SIZE != 0 {
            return Err(Error::InvalidRegionSize(size));
        }

        let options = MmapOptions::new(size)?;
        let options = unsafe { options.with_unsafe_flags(UnsafeMmapFlags::JIT) };
        let map = options.map_mut()?;

        let map = match unsafe { map.make_exec_mut() } {
            Ok(map) => map,
            Err((_, e)) => return Err(e.into()),
        };

        Ok(Self {
            map,
            offset: 0,
            block_count: 0,
        })
    }

    /// Host address of the region base.
    #[inline]
    pub fn base(&self) -> u64 {
        self.map.as_ptr() as u64
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.size()
    }

    /// Resolves a region offset to a host address.
    #[inline]
    pub fn host_addr(&self, offset: usize) -> u64 {
        self.base() + offset as u64
    }

    /// The writable tail of the region, used as the emit window for the next block. Fails with
    /// [`Error::RegionExhausted`] when no usable space remains.
    pub fn window_mut(&mut self) -> Result<&mut [u8], Error> {
        let offset = self.offset;

        if offset >= self.map.size() {
            return Err(Error::RegionExhausted);
        }

        Ok(&mut self.map.as_mut_slice()[offset..])
    }

    /// Commits `len` bytes at the current bump position, flushes the instruction cache for the
    /// emitted range, and returns the region offset of the new block.
    pub fn commit(&mut self, len: usize) -> Result<usize, Error> {
        let start = self.offset;
        let len = (len + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1);

        if start + len > self.map.size() {
            return Err(Error::RegionExhausted);
        }

        self.map.flush_icache()?;

        self.offset = start + len;
        self.block_count += 1;

        Ok(start)
    }

    /// Returns the bump pointer to the base, logically invalidating every translation. The
    /// caller must flush the translation cache before handing out new blocks.
    pub fn reset(&mut self) {
        log::warn!(
            "code region reset after {} blocks ({} bytes)",
            self.block_count,
            self.offset,
        );

        self.offset = 0;
        self.block_count = 0;
    }

    /// Rewrites a 32-bit field of committed code; used to patch inter-block chain
    /// displacements. The store is a single 4-byte write so a concurrently executing thread
    /// observes either the old or the new displacement, never a mix; the translator aligns
    /// every patchable field accordingly.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        debug_assert_eq!(offset % 4, 0);

        let slice = &mut self.map.as_mut_slice()[offset..offset + 4];

        unsafe {
            (slice.as_mut_ptr() as *mut u32).write_volatile(value.to_le());
        }
    }

    /// Reads back committed code; used by tests to inspect emitted encodings.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.map.as_slice()[offset..offset + len]
    }

    /// A read-only snapshot of the counters.
    pub fn stats(&self) -> RegionStats {
        RegionStats {
            base: self.base(),
            capacity: self.capacity(),
            used: self.offset,
            free: self.capacity() - self.offset,
            block_count: self.block_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_bounds_sizes() {
        assert!(matches!(CodeRegion::new(0), Err(Error::InvalidRegionSize(_))));
        assert!(matches!(CodeRegion::new(MIN_SIZE - 1), Err(Error::InvalidRegionSize(_))));
        assert!(matches!(
            CodeRegion::new(MAX_SIZE + PAGE_SIZE),
            Err(Error::InvalidRegionSize(_)),
        ));
    }

    #[test]
    fn bump_allocation_and_reset() {
        let mut region = CodeRegion::new(MIN_SIZE).unwrap();

        {
            let window = region.window_mut().unwrap();
            window[0] = 0xc3;
        }

        let first = region.commit(1).unwrap();
        assert_eq!(first, 0);

        // Commits are 16-byte aligned.
        let second = region.commit(20).unwrap();
        assert_eq!(second, 16);

        let stats = region.stats();
        assert_eq!(stats.used, 48);
        assert_eq!(stats.block_count, 2);
        assert_eq!(stats.free, MIN_SIZE - 48);

        region.reset();
        assert_eq!(region.stats().used, 0);
        assert_eq!(region.stats().block_count, 0);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut region = CodeRegion::new(MIN_SIZE).unwrap();
        assert!(matches!(region.commit(MIN_SIZE + 1), Err(Error::RegionExhausted)));
    }
}
