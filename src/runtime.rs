//! This module provides the [`Runtime`] struct, the handle owning the process-wide pieces of
//! the translator — the code region, the translation cache, and the syscall bridge — and the
//! [`RuntimeBuilder`] used to configure them before they become immutable.
//!
//! Guest threads share one runtime: translation serializes on the region's writer lock while
//! cache lookups stay lock-free, per the publication protocol described in the cache module.

use crate::cache::{CacheStats, TranslationCache, DEFAULT_BITS, DEFAULT_HOT_THRESHOLD};
use crate::error::Error;
use crate::region::{CodeRegion, RegionStats, DEFAULT_SIZE};
use crate::syscall::SyscallTable;
use crate::translate::{TranslatorConfig, UnknownPolicy};
use std::sync::Mutex;

/// The `RuntimeBuilder` allows for the configuration of certain properties for the new runtime
/// before constructing it, as these properties are immutable once the runtime has been built.
pub struct RuntimeBuilder {
    region_size: usize,
    cache_bits: u32,
    hot_threshold: u32,
    translator: TranslatorConfig,
    syscalls: SyscallTable,
}

impl RuntimeBuilder {
    /// The size of the executable code region in bytes; page aligned, 1 MiB to 256 MiB.
    pub fn with_region_size(mut self, size: usize) -> Self {
        self.region_size = size;
        self
    }

    /// The translation cache holds `2^bits` entries.
    pub fn with_cache_bits(mut self, bits: u32) -> Self {
        self.cache_bits = bits;
        self
    }

    /// Lookups past this refcount protect an entry from collision eviction.
    pub fn with_hot_threshold(mut self, threshold: u32) -> Self {
        self.hot_threshold = threshold;
        self
    }

    /// Maximum guest instructions per translated block.
    pub fn with_max_block_insns(mut self, max: usize) -> Self {
        self.translator.max_block_insns = max;
        self
    }

    /// What the translator does with instructions it cannot decode.
    pub fn with_unknown_policy(mut self, policy: UnknownPolicy) -> Self {
        self.translator.unknown_policy = policy;
        self
    }

    /// The syscall bridge translated `SVC` instructions dispatch through.
    pub fn with_syscall_table(mut self, table: SyscallTable) -> Self {
        self.syscalls = table;
        self
    }

    /// Builds the runtime, mapping the code region.
    pub fn build(self) -> Result<Runtime, Error> {
        Ok(Runtime {
            region: Mutex::new(CodeRegion::new(self.region_size)?),
            cache: TranslationCache::new(self.cache_bits, self.hot_threshold),
            syscalls: self.syscalls,
            translator: self.translator,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            region_size: DEFAULT_SIZE,
            cache_bits: DEFAULT_BITS,
            hot_threshold: DEFAULT_HOT_THRESHOLD,
            translator: TranslatorConfig::default(),
            syscalls: SyscallTable::with_defaults(),
        }
    }
}

/// The process-wide translator state.
pub struct Runtime {
    region: Mutex<CodeRegion>,
    cache: TranslationCache,
    syscalls: SyscallTable,
    translator: TranslatorConfig,
}

impl Runtime {
    /// Returns a [`RuntimeBuilder`] with the default configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Builds a runtime with the default configuration.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub(crate) fn region(&self) -> &Mutex<CodeRegion> {
        &self.region
    }

    pub(crate) fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub(crate) fn translator_config(&self) -> TranslatorConfig {
        self.translator
    }

    /// The syscall bridge.
    pub fn syscalls(&self) -> &SyscallTable {
        &self.syscalls
    }

    /// Drops the translation of the block starting at `pc`, if cached. This is the
    /// icache-invalidate notification for self-modified guest code.
    pub fn invalidate(&self, pc: u64) {
        self.cache.invalidate(pc);
    }

    /// Drops every translation. Region memory is reclaimed only by [`Runtime::reset_region`].
    pub fn flush_translations(&self) {
        self.cache.flush();
    }

    /// Resets the code region and flushes the cache with it.
    pub fn reset_region(&self) {
        self.region.lock().unwrap().reset();
        self.cache.flush();
    }

    /// A read-only snapshot of the translation cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// A read-only snapshot of the code region counters.
    pub fn region_stats(&self) -> RegionStats {
        self.region.lock().unwrap().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_region_size() {
        assert!(Runtime::builder().with_region_size(0x1000).build().is_err());
        assert!(Runtime::builder()
            .with_region_size(2 << 20)
            .with_cache_bits(8)
            .build()
            .is_ok());
    }

    #[test]
    fn stats_snapshots() {
        let runtime = Runtime::builder()
            .with_region_size(1 << 20)
            .with_cache_bits(6)
            .build()
            .unwrap();

        let cache = runtime.cache_stats();
        assert_eq!(cache.capacity, 64);
        assert_eq!(cache.valid_entries, 0);

        let region = runtime.region_stats();
        assert_eq!(region.capacity, 1 << 20);
        assert_eq!(region.used, 0);
        assert_ne!(region.base, 0);
    }
}
