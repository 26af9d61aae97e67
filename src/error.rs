//! This module provides an `Error` type for the crate using the [`thiserror`] crate.
use thiserror::Error;

/// The `Error` type.
#[derive(Debug, Error)]
pub enum Error {
    /// An emit exceeded the code buffer; the current block is abandoned and not installed.
    #[error("code buffer overflow")]
    BufferOverflow,
    /// The code region bump allocator refused an allocation; the region must be reset and the
    /// block retranslated.
    #[error("code region exhausted")]
    RegionExhausted,
    /// The decoder did not recognize the instruction word.
    #[error("unknown instruction {word:#010x} at {pc:#x}")]
    DecodeUnknown {
        /// The raw instruction word.
        word: u32,
        /// The guest address of the instruction.
        pc: u64,
    },
    /// A direct inter-block jump would exceed a ±2 GiB displacement.
    #[error("chain displacement out of rel32 range")]
    ChainRangeExceeded,
    /// A memory access in translated code faulted.
    #[error("guest fault at {pc:#x} (address {address:#x})")]
    GuestFault {
        /// The guest program counter recovered from the context.
        pc: u64,
        /// The faulting data address.
        address: u64,
    },
    /// The requested code region size is outside the permitted bounds or not page aligned.
    #[error("invalid code region size {0:#x}")]
    InvalidRegionSize(usize),
    /// The guest address is not covered by any mapping.
    #[error("guest address {0:#x} not mapped")]
    NotMapped(u64),
    /// A translation was requested at a program counter that is not a multiple of 4.
    #[error("misaligned guest pc {0:#x}")]
    MisalignedPc(u64),
    /// Wraps [`std::io::Error`].
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Wraps [`mmap_rs::Error`].
    #[error(transparent)]
    Mmap(#[from] mmap_rs::Error),
    /// Wraps an error that originates from any calls to the [`nix`] crate.
    #[error(transparent)]
    Nix(#[from] nix::Error),
}
