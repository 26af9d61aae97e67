//! This module provides the [`SyscallTable`] struct, the bridge between translated `SVC`
//! instructions and the host.
//!
//! The core only dispatches: it reads the AArch64 Linux convention (number in x8, arguments in
//! x0–x5, result in x0) and routes through a number-to-handler table the embedder fills in.
//! Unregistered numbers return the [`UNIMPLEMENTED`] sentinel, which no errno can collide with.

use crate::guest::GuestContext;
use std::collections::HashMap;

/// Returned for syscall numbers with no registered handler. Distinct from any valid errno
/// (those occupy the small negative range).
pub const UNIMPLEMENTED: i64 = i64::MIN;

/// Linux AArch64 syscall numbers the runtime knows by name.
pub mod nr {
    pub const OPENAT: u32 = 56;
    pub const CLOSE: u32 = 57;
    pub const READ: u32 = 63;
    pub const WRITE: u32 = 64;
    pub const EXIT: u32 = 93;
    pub const EXIT_GROUP: u32 = 94;
    pub const CLOCK_GETTIME: u32 = 113;
    pub const BRK: u32 = 214;
    pub const MUNMAP: u32 = 215;
    pub const MMAP: u32 = 222;
}

/// A syscall handler: receives the guest context and the six argument registers, returns the
/// value for x0.
pub type SyscallHandler = fn(&mut GuestContext, [u64; 6]) -> i64;

/// The number-to-handler table.
pub struct SyscallTable {
    handlers: HashMap<u32, SyscallHandler>,
}

impl SyscallTable {
    /// An empty table: every syscall reports [`UNIMPLEMENTED`].
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A table with the process-lifecycle calls registered: `exit` and `exit_group` raise the
    /// cooperative exit flag.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();

        table.register(nr::EXIT, sys_exit);
        table.register(nr::EXIT_GROUP, sys_exit);

        table
    }

    /// Registers (or replaces) the handler for `number`.
    pub fn register(&mut self, number: u32, handler: SyscallHandler) {
        self.handlers.insert(number, handler);
    }

    /// Dispatches one syscall. Unregistered numbers return [`UNIMPLEMENTED`].
    pub fn dispatch_syscall(&self, ctx: &mut GuestContext, number: u32, args: [u64; 6]) -> i64 {
        match self.handlers.get(&number) {
            Some(handler) => handler(ctx, args),
            None => {
                log::warn!("unimplemented syscall {number}");
                UNIMPLEMENTED
            }
        }
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn sys_exit(ctx: &mut GuestContext, _args: [u64; 6]) -> i64 {
    ctx.request_exit();
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys_double(_ctx: &mut GuestContext, args: [u64; 6]) -> i64 {
        (args[0] as i64) * 2
    }

    #[test]
    fn dispatch_registered_and_unknown() {
        let mut table = SyscallTable::new();
        let mut ctx = GuestContext::new(0);

        table.register(1000, sys_double);

        assert_eq!(table.dispatch_syscall(&mut ctx, 1000, [21, 0, 0, 0, 0, 0]), 42);
        assert_eq!(
            table.dispatch_syscall(&mut ctx, 9999, [0; 6]),
            UNIMPLEMENTED,
        );
    }

    #[test]
    fn exit_raises_the_stop_flag() {
        let table = SyscallTable::with_defaults();
        let mut ctx = GuestContext::new(0);

        table.dispatch_syscall(&mut ctx, nr::EXIT, [0; 6]);
        assert!(ctx.exit_requested());
    }
}
