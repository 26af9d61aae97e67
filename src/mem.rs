//! This module provides the [`GuestMemory`] struct which manages the guest address space.
//!
//! Guest virtual addresses are identity-mapped: a guest address *is* a host address, and the
//! guest space is a subset of the host's. Mapping a region therefore means placing an anonymous
//! host mapping at exactly the requested address (`MAP_FIXED_NOREPLACE`, so an address already
//! claimed by the host process fails instead of being clobbered). The mapped ranges and their
//! protections are tracked in a [`RangeMap`] so guest-to-host translation can answer "not
//! mapped".

use crate::error::Error;
use bitflags::bitflags;
use nix::sys::mman::{mmap, mprotect, munmap, MapFlags as HostMapFlags, ProtFlags};
use rangemap::RangeMap;
use std::num::NonZeroUsize;
use std::os::fd::BorrowedFd;

bitflags! {
    /// The protection flags of a guest mapping.
    pub struct ProtectionFlags: u32 {
        /// The guest is allowed to read from the memory.
        const READ  = 1 << 0;
        /// The guest is allowed to write to the memory.
        const WRITE = 1 << 1;
        /// The guest is allowed to execute from the memory.
        const EXEC  = 1 << 2;
    }
}

bitflags! {
    /// Mapping kind flags, following the mmap conventions.
    pub struct MapFlags: u32 {
        const ANONYMOUS = 1 << 0;
        const PRIVATE   = 1 << 1;
        const SHARED    = 1 << 2;
        const FIXED     = 1 << 3;
    }
}

fn to_host_prot(protection: ProtectionFlags) -> ProtFlags {
    let mut prot = ProtFlags::PROT_NONE;

    if protection.contains(ProtectionFlags::READ) {
        prot |= ProtFlags::PROT_READ;
    }

    if protection.contains(ProtectionFlags::WRITE) {
        prot |= ProtFlags::PROT_WRITE;
    }

    if protection.contains(ProtectionFlags::EXEC) {
        prot |= ProtFlags::PROT_EXEC;
    }

    prot
}

/// The guest address space: identity mappings plus their bookkeeping.
pub struct GuestMemory {
    ranges: RangeMap<u64, ProtectionFlags>,
}

impl GuestMemory {
    pub fn new() -> Self {
        Self {
            ranges: RangeMap::new(),
        }
    }

    /// Maps an anonymous region at exactly `guest_address` with the given protection. The
    /// address and size must be page aligned.
    pub fn map_anonymous(
        &mut self,
        guest_address: u64,
        size: usize,
        protection: ProtectionFlags,
        flags: MapFlags,
    ) -> Result<(), Error> {
        let length = NonZeroUsize::new(size).ok_or(Error::NotMapped(guest_address))?;

        let mut host_flags = HostMapFlags::MAP_ANONYMOUS;

        host_flags |= if flags.contains(MapFlags::SHARED) {
            HostMapFlags::MAP_SHARED
        } else {
            HostMapFlags::MAP_PRIVATE
        };

        if flags.contains(MapFlags::FIXED) {
            host_flags |= HostMapFlags::MAP_FIXED_NOREPLACE;
        }

        unsafe {
            mmap(
                NonZeroUsize::new(guest_address as usize),
                length,
                to_host_prot(protection),
                host_flags,
                None::<BorrowedFd>,
                0,
            )?;
        }

        self.ranges
            .insert(guest_address..guest_address + size as u64, protection);

        log::debug!(
            "mapped guest {:#x}..{:#x} ({:?})",
            guest_address,
            guest_address + size as u64,
            protection,
        );

        Ok(())
    }

    /// Unmaps `[guest_address, guest_address + size)`.
    pub fn unmap(&mut self, guest_address: u64, size: usize) -> Result<(), Error> {
        let ptr = guest_address as *mut std::ffi::c_void;

        unsafe {
            munmap(ptr, size)?;
        }

        self.ranges.remove(guest_address..guest_address + size as u64);

        Ok(())
    }

    /// Changes the protection of an already-mapped range.
    pub fn protect(
        &mut self,
        guest_address: u64,
        size: usize,
        protection: ProtectionFlags,
    ) -> Result<(), Error> {
        if self.ranges.get(&guest_address).is_none() {
            return Err(Error::NotMapped(guest_address));
        }

        let ptr = guest_address as *mut std::ffi::c_void;

        unsafe {
            mprotect(ptr, size, to_host_prot(protection))?;
        }

        self.ranges
            .insert(guest_address..guest_address + size as u64, protection);

        Ok(())
    }

    /// Translates a guest address to the host address backing it — the identity, unless the
    /// address is not covered by any mapping.
    pub fn translate(&self, guest_address: u64) -> Result<u64, Error> {
        if self.ranges.get(&guest_address).is_some() {
            Ok(guest_address)
        } else {
            Err(Error::NotMapped(guest_address))
        }
    }

    /// The protection of the mapping covering `guest_address`, if any.
    pub fn protection_of(&self, guest_address: u64) -> Option<ProtectionFlags> {
        self.ranges.get(&guest_address).copied()
    }
}

impl Default for GuestMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_without_fixed_placement() {
        // The range bookkeeping is testable without touching the host address space.
        let mut memory = GuestMemory::new();

        memory
            .ranges
            .insert(0x1000..0x3000, ProtectionFlags::READ | ProtectionFlags::WRITE);

        assert_eq!(memory.translate(0x1000).unwrap(), 0x1000);
        assert_eq!(memory.translate(0x2fff).unwrap(), 0x2fff);
        assert!(matches!(memory.translate(0x3000), Err(Error::NotMapped(_))));

        assert_eq!(
            memory.protection_of(0x1500),
            Some(ProtectionFlags::READ | ProtectionFlags::WRITE),
        );
        assert_eq!(memory.protection_of(0x4000), None);
    }

    #[test]
    fn map_protect_unmap_cycle() {
        let mut memory = GuestMemory::new();

        // An address far above the usual heap/stack placement on x86-64 Linux.
        let base = 0x5_5555_0000u64;
        let size = 0x4000;

        memory
            .map_anonymous(
                base,
                size,
                ProtectionFlags::READ | ProtectionFlags::WRITE,
                MapFlags::ANONYMOUS | MapFlags::PRIVATE | MapFlags::FIXED,
            )
            .unwrap();

        assert_eq!(memory.translate(base).unwrap(), base);

        // The mapping is usable through the identity address.
        unsafe {
            std::ptr::write_volatile(base as *mut u64, 0xdead_beef);
            assert_eq!(std::ptr::read_volatile(base as *const u64), 0xdead_beef);
        }

        memory
            .protect(base, size, ProtectionFlags::READ)
            .unwrap();
        assert_eq!(memory.protection_of(base), Some(ProtectionFlags::READ));

        memory.unmap(base, size).unwrap();
        assert!(memory.translate(base).is_err());
    }
}
