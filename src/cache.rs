//! This module provides the [`TranslationCache`] struct, the direct-mapped table from guest
//! program counter to the host address of its translated block.
//!
//! Lookups are lock-free: every entry field is an atomic, and an inserter release-stores the
//! `VALID` flag only after every other field (and the emitted code itself) is in place, pairing
//! with the acquire load in [`TranslationCache::lookup`]. Inserts and invalidations are expected
//! to be serialized by the runtime's writer lock.
//!
//! Collisions evict the incumbent, except that a `HOT` incumbent deflects the newcomer to a
//! secondary slot derived from the hash (`hash ^ (hash >> 16)`); only if that slot is hot too is
//! its incumbent evicted. Lookups probe the same two slots.

use bitflags::bitflags;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Fibonacci hashing constant; the index is taken from the top 32 bits of the product.
const HASH_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Default table size exponent (2^12 entries).
pub const DEFAULT_BITS: u32 = 12;

/// Lookups past this refcount promote the entry to `HOT`.
pub const DEFAULT_HOT_THRESHOLD: u32 = 16;

const NO_CHAIN: u32 = u32::MAX;

bitflags! {
    /// Per-entry state bits.
    pub struct EntryFlags: u32 {
        /// The entry holds a published translation.
        const VALID  = 1 << 0;
        /// The entry survived enough lookups to resist eviction.
        const HOT    = 1 << 1;
        /// At least one outgoing edge was patched to jump directly to a peer block.
        const LINKED = 1 << 2;
        /// The guest code backing this entry was reported modified.
        const DIRTY  = 1 << 3;
    }
}

/// One direct-mapped slot. `host_pc` is a borrow into the code region, guarded by `VALID`.
struct Entry {
    guest_pc: AtomicU64,
    host_pc: AtomicU64,
    hash: AtomicU64,
    block_size: AtomicU32,
    flags: AtomicU32,
    refcount: AtomicU32,
    /// Cache index of the chained successor per edge, or `NO_CHAIN`.
    chain: [AtomicU32; 2],
    /// Guest address of the successor per edge.
    chain_pc: [AtomicU64; 2],
    /// Offset of the patchable rel32 field within the block per edge, or `NO_CHAIN`.
    chain_site: [AtomicU32; 2],
}

impl Entry {
    fn empty() -> Self {
        Self {
            guest_pc: AtomicU64::new(0),
            host_pc: AtomicU64::new(0),
            hash: AtomicU64::new(0),
            block_size: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            refcount: AtomicU32::new(0),
            chain: [AtomicU32::new(NO_CHAIN), AtomicU32::new(NO_CHAIN)],
            chain_pc: [AtomicU64::new(0), AtomicU64::new(0)],
            chain_site: [AtomicU32::new(NO_CHAIN), AtomicU32::new(NO_CHAIN)],
        }
    }

    fn flags(&self, ordering: Ordering) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.flags.load(ordering))
    }
}

/// An outgoing edge of a freshly translated block: the guest address it continues at and the
/// region-relative offset of the rel32 displacement reserved for chaining.
#[derive(Clone, Copy, Debug)]
pub struct ChainEdge {
    pub target_pc: u64,
    pub patch_site: u32,
}

/// A read-only snapshot of the cache counters.
#[derive(Clone, Copy, Debug)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub valid_entries: usize,
    pub capacity: usize,
}

/// The translation cache.
pub struct TranslationCache {
    entries: Box<[Entry]>,
    mask: u64,
    hot_threshold: u32,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranslationCache {
    /// Creates a cache with `2^bits` entries.
    pub fn new(bits: u32, hot_threshold: u32) -> Self {
        let size = 1usize << bits;

        Self {
            entries: (0..size).map(|_| Entry::empty()).collect(),
            mask: size as u64 - 1,
            hot_threshold,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[inline]
    fn hash(pc: u64) -> u64 {
        pc.wrapping_mul(HASH_MULTIPLIER) >> 32
    }

    #[inline]
    fn primary_index(hash: u64, mask: u64) -> usize {
        (hash & mask) as usize
    }

    #[inline]
    fn secondary_index(hash: u64, mask: u64) -> usize {
        ((hash ^ (hash >> 16)) & mask) as usize
    }

    /// Looks up the translation for `pc`. On a hit the entry refcount is bumped and the host
    /// address returned; the acquire load of the flags synchronizes with the inserter's release
    /// store, so the returned address points at fully published code.
    pub fn lookup(&self, pc: u64) -> Option<u64> {
        let hash = Self::hash(pc);

        for index in [
            Self::primary_index(hash, self.mask),
            Self::secondary_index(hash, self.mask),
        ] {
            let entry = &self.entries[index];
            let flags = entry.flags(Ordering::Acquire);

            if flags.contains(EntryFlags::VALID) && entry.guest_pc.load(Ordering::Relaxed) == pc {
                let refs = entry.refcount.fetch_add(1, Ordering::Relaxed) + 1;

                if refs >= self.hot_threshold && !flags.contains(EntryFlags::HOT) {
                    entry.flags.fetch_or(EntryFlags::HOT.bits(), Ordering::Relaxed);
                }

                self.hits.fetch_add(1, Ordering::Relaxed);

                return Some(entry.host_pc.load(Ordering::Relaxed));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        None
    }

    /// Looks up the cache slot holding `pc`, without touching the counters.
    pub fn slot_of(&self, pc: u64) -> Option<usize> {
        let hash = Self::hash(pc);

        [
            Self::primary_index(hash, self.mask),
            Self::secondary_index(hash, self.mask),
        ]
        .into_iter()
        .find(|&index| {
            let entry = &self.entries[index];

            entry.flags(Ordering::Acquire).contains(EntryFlags::VALID)
                && entry.guest_pc.load(Ordering::Relaxed) == pc
        })
    }

    /// Installs a translation and returns the slot it landed in. Must run under the runtime's
    /// writer lock, after the emitted bytes have been committed and the instruction cache
    /// flushed.
    pub fn insert(&self, pc: u64, host_pc: u64, size: u32, edges: [Option<ChainEdge>; 2]) -> usize {
        let hash = Self::hash(pc);
        let primary = Self::primary_index(hash, self.mask);

        let index = {
            let incumbent = &self.entries[primary];
            let flags = incumbent.flags(Ordering::Relaxed);

            if flags.contains(EntryFlags::VALID | EntryFlags::HOT)
                && incumbent.guest_pc.load(Ordering::Relaxed) != pc
            {
                // Deflect to the secondary slot; its incumbent is evicted hot or not.
                Self::secondary_index(hash, self.mask)
            } else {
                primary
            }
        };

        let entry = &self.entries[index];

        if entry.flags(Ordering::Relaxed).contains(EntryFlags::VALID) {
            log::debug!(
                "evicting translation of {:#x} for {:#x}",
                entry.guest_pc.load(Ordering::Relaxed),
                pc,
            );
        }

        // Unpublish first so a concurrent lookup never pairs old fields with new ones.
        entry.flags.store(0, Ordering::Release);

        entry.guest_pc.store(pc, Ordering::Relaxed);
        entry.host_pc.store(host_pc, Ordering::Relaxed);
        entry.hash.store(hash, Ordering::Relaxed);
        entry.block_size.store(size, Ordering::Relaxed);
        entry.refcount.store(1, Ordering::Relaxed);

        for edge in 0..2 {
            entry.chain[edge].store(NO_CHAIN, Ordering::Relaxed);

            match edges[edge] {
                Some(ChainEdge { target_pc, patch_site }) => {
                    entry.chain_pc[edge].store(target_pc, Ordering::Relaxed);
                    entry.chain_site[edge].store(patch_site, Ordering::Relaxed);
                }
                None => {
                    entry.chain_pc[edge].store(0, Ordering::Relaxed);
                    entry.chain_site[edge].store(NO_CHAIN, Ordering::Relaxed);
                }
            }
        }

        entry.flags.store(EntryFlags::VALID.bits(), Ordering::Release);

        index
    }

    /// Clears the `VALID` bit of the entry translating `pc`, if any.
    pub fn invalidate(&self, pc: u64) {
        if let Some(index) = self.slot_of(pc) {
            self.entries[index]
                .flags
                .fetch_and(!EntryFlags::VALID.bits(), Ordering::Release);
        }
    }

    /// Clears `VALID` on every slot. Code region memory is not reclaimed; orphaned blocks stay
    /// executable until the region is reset.
    pub fn flush(&self) {
        for entry in self.entries.iter() {
            entry.flags.store(0, Ordering::Release);
            entry.refcount.store(0, Ordering::Relaxed);
        }
    }

    /// The guest address a block continues at through `edge`, together with the patchable rel32
    /// site, when that edge exists and has not been chained yet.
    pub fn chain_candidate(&self, slot: usize, edge: usize) -> Option<ChainEdge> {
        let entry = &self.entries[slot];

        if !entry.flags(Ordering::Acquire).contains(EntryFlags::VALID) {
            return None;
        }

        if entry.chain[edge].load(Ordering::Relaxed) != NO_CHAIN {
            return None;
        }

        let patch_site = entry.chain_site[edge].load(Ordering::Relaxed);

        if patch_site == NO_CHAIN {
            return None;
        }

        Some(ChainEdge {
            target_pc: entry.chain_pc[edge].load(Ordering::Relaxed),
            patch_site,
        })
    }

    /// Records that `edge` of `from` now jumps directly into `to`, and marks `from` as linked.
    /// Chain slots hold cache indices, not host pointers; they are meaningful only while the
    /// target entry stays valid.
    pub fn chain(&self, from: usize, edge: usize, to: usize) {
        let entry = &self.entries[from];

        entry.chain[edge].store(to as u32, Ordering::Relaxed);
        entry.flags.fetch_or(EntryFlags::LINKED.bits(), Ordering::Relaxed);
    }

    /// The host address stored in `slot`, when it is valid.
    pub fn host_pc_of(&self, slot: usize) -> Option<u64> {
        let entry = &self.entries[slot];

        if entry.flags(Ordering::Acquire).contains(EntryFlags::VALID) {
            Some(entry.host_pc.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Marks the entry translating `pc` as dirty (guest code modified).
    pub fn mark_dirty(&self, pc: u64) {
        if let Some(index) = self.slot_of(pc) {
            self.entries[index]
                .flags
                .fetch_or(EntryFlags::DIRTY.bits(), Ordering::Relaxed);
        }
    }

    /// A read-only snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            valid_entries: self
                .entries
                .iter()
                .filter(|e| e.flags(Ordering::Relaxed).contains(EntryFlags::VALID))
                .count(),
            capacity: self.entries.len(),
        }
    }
}
