//! This module provides the synchronous fault hooks: SIGSEGV/SIGBUS for memory faults taken in
//! translated code, SIGILL for an invalid host instruction (a translator bug), and SIGTRAP for
//! breakpoints.
//!
//! The handler recovers the guest program counter from the context the dispatcher registered,
//! records a [`FaultInfo`] in async-signal-safe storage, and applies the configured policy.
//! Re-entering the dispatcher from a handler would need `siglongjmp`, which is not exposed to
//! Rust; the shipped policies therefore end with the signal's default action, and the recorded
//! fault is available to whatever crash reporting the embedder runs.

use crate::error::Error;
use crate::guest::GuestContext;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

/// What to do after recording a fatal fault.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultPolicy {
    /// Record the fault, restore the default handler, and re-raise, so the process dies with
    /// the faithful signal disposition (core dumps intact).
    Report,
    /// Record the fault and abort immediately.
    Terminate,
}

/// A recorded synchronous fault.
#[derive(Clone, Copy, Debug)]
pub struct FaultInfo {
    /// The delivered signal number.
    pub signal: i32,
    /// The faulting data address (SIGSEGV/SIGBUS), or zero.
    pub fault_address: u64,
    /// The guest program counter recovered from the context's PC slot.
    pub guest_pc: u64,
}

static POLICY: AtomicU32 = AtomicU32::new(0);
static CURRENT_CONTEXT: AtomicPtr<GuestContext> = AtomicPtr::new(std::ptr::null_mut());

static FAULT_RECORDED: AtomicBool = AtomicBool::new(false);
static FAULT_SIGNAL: AtomicU32 = AtomicU32::new(0);
static FAULT_ADDRESS: AtomicU64 = AtomicU64::new(0);
static FAULT_GUEST_PC: AtomicU64 = AtomicU64::new(0);

/// Registers the guest context whose PC slot the fault handler should read. The dispatcher
/// calls this before entering translated code; pass null on the way out.
pub fn set_current_context(ctx: *mut GuestContext) {
    CURRENT_CONTEXT.store(ctx, Ordering::Release);
}

/// Installs the SIGSEGV/SIGBUS/SIGILL/SIGTRAP hooks with the given policy.
pub fn install(policy: FaultPolicy) -> Result<(), Error> {
    POLICY.store(policy as u32, Ordering::Relaxed);

    let action = SigAction::new(
        SigHandler::SigAction(fault_handler),
        SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );

    for signal in [Signal::SIGSEGV, Signal::SIGBUS, Signal::SIGILL, Signal::SIGTRAP] {
        unsafe {
            sigaction(signal, &action)?;
        }
    }

    Ok(())
}

/// Takes the most recently recorded fault, if any.
pub fn take_last_fault() -> Option<FaultInfo> {
    if !FAULT_RECORDED.swap(false, Ordering::Acquire) {
        return None;
    }

    Some(FaultInfo {
        signal: FAULT_SIGNAL.load(Ordering::Relaxed) as i32,
        fault_address: FAULT_ADDRESS.load(Ordering::Relaxed),
        guest_pc: FAULT_GUEST_PC.load(Ordering::Relaxed),
    })
}

extern "C" fn fault_handler(
    signo: libc::c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    // Only async-signal-safe operations below: atomics, raw reads, abort/raise.
    let fault_address = if signo == libc::SIGSEGV || signo == libc::SIGBUS {
        unsafe { (*info).si_addr() as u64 }
    } else {
        0
    };

    let ctx = CURRENT_CONTEXT.load(Ordering::Acquire);
    let guest_pc = if ctx.is_null() { 0 } else { unsafe { (*ctx).pc() } };

    FAULT_SIGNAL.store(signo as u32, Ordering::Relaxed);
    FAULT_ADDRESS.store(fault_address, Ordering::Relaxed);
    FAULT_GUEST_PC.store(guest_pc, Ordering::Relaxed);
    FAULT_RECORDED.store(true, Ordering::Release);

    // Breakpoints resume after the trapping instruction; everything else is fatal.
    if signo == libc::SIGTRAP {
        return;
    }

    if POLICY.load(Ordering::Relaxed) == FaultPolicy::Terminate as u32 {
        std::process::abort();
    }

    unsafe {
        let signal = Signal::try_from(signo).unwrap_or(Signal::SIGSEGV);
        let _ = nix::sys::signal::signal(signal, SigHandler::SigDfl);
        let _ = nix::sys::signal::raise(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_record_roundtrip() {
        FAULT_SIGNAL.store(libc::SIGSEGV as u32, Ordering::Relaxed);
        FAULT_ADDRESS.store(0x1234, Ordering::Relaxed);
        FAULT_GUEST_PC.store(0x4000, Ordering::Relaxed);
        FAULT_RECORDED.store(true, Ordering::Release);

        let fault = take_last_fault().unwrap();
        assert_eq!(fault.signal, libc::SIGSEGV);
        assert_eq!(fault.fault_address, 0x1234);
        assert_eq!(fault.guest_pc, 0x4000);

        // Consumed on read.
        assert!(take_last_fault().is_none());
    }
}
