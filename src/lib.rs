//! The dbt-rs crate provides a dynamic binary translator that executes 64-bit ARM (AArch64)
//! user-mode programs on 64-bit x86 Linux hosts. Guest machine code is translated one basic
//! block at a time into native x86, the translations are cached by guest program counter, and a
//! dispatch loop transfers control between host-executed translated code and the runtime.
//!
//! The crate is organized around the translation pipeline:
//!  * [`guest`] — the architectural AArch64 context of one guest thread.
//!  * [`decode`] — the pure AArch64 instruction decoder.
//!  * [`x86`] and [`buffer`] — the x86-64 instruction encoders and the bounded code buffer
//!    they emit into.
//!  * [`translate`] — the per-basic-block translator.
//!  * [`cache`] and [`region`] — the translation cache and the executable code region.
//!  * [`dispatch`] and [`runtime`] — the dispatch loop and the process-wide runtime handle.
//!  * [`mem`], [`syscall`] and [`signal`] — the guest memory map, the system-call bridge, and
//!    the synchronous fault hooks.

pub mod buffer;
pub mod cache;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod guest;
pub mod mem;
pub mod region;
pub mod runtime;
pub mod signal;
pub mod syscall;
pub mod translate;
pub mod x86;

pub use cache::{CacheStats, TranslationCache};
pub use dispatch::{Dispatcher, ExitReason};
pub use error::Error;
pub use guest::GuestContext;
pub use mem::{GuestMemory, MapFlags, ProtectionFlags};
pub use region::{CodeRegion, RegionStats};
pub use runtime::{Runtime, RuntimeBuilder};
pub use signal::{FaultInfo, FaultPolicy};
pub use syscall::{SyscallTable, UNIMPLEMENTED};
pub use translate::{TranslatorConfig, UnknownPolicy};
