//! This module provides the [`Dispatcher`] struct, the runtime loop that resolves a guest
//! program counter to host code, executes it, and decides what to do with the exit.
//!
//! One dispatcher drives one guest thread: look the PC up in the shared translation cache,
//! translate and install the basic block on a miss (under the runtime's writer lock), transfer
//! control, and read the next PC the epilogue wrote back. Consecutively executed blocks are
//! chained — the predecessor's exit jump is patched to enter the successor's body directly,
//! bypassing the dispatcher on later iterations.

use crate::cache::ChainEdge;
use crate::error::Error;
use crate::guest::{BlockExit, GuestContext};
use crate::region::CodeRegion;
use crate::runtime::Runtime;
use crate::syscall::SyscallTable;
use crate::translate::{translate_block, TranslatedBlock, PROLOGUE_LEN};

/// The reason [`Dispatcher::run`] handed control back to the caller.
#[derive(Debug)]
pub enum ExitReason {
    /// The cooperative exit flag was set, by a syscall handler or another thread.
    ExitRequested,
    /// The guest executed `BRK #imm`.
    Breakpoint {
        /// The breakpoint immediate.
        imm: u16,
        /// The guest address of the BRK instruction.
        pc: u64,
    },
    /// Translated code reached an instruction the decoder does not understand.
    UnknownInstruction {
        /// The raw instruction word.
        word: u32,
        /// The guest address of the instruction.
        pc: u64,
    },
}

/// The dispatch loop for one guest thread.
pub struct Dispatcher<'r> {
    runtime: &'r Runtime,
}

impl<'r> Dispatcher<'r> {
    pub fn new(runtime: &'r Runtime) -> Self {
        Self { runtime }
    }

    /// Runs the guest from its current program counter until an exit condition arises.
    ///
    /// # Safety
    ///
    /// Guest addresses are identity-mapped. The guest program counter (and every address the
    /// guest code computes) must reference memory this process may legitimately access;
    /// running an untrusted or corrupt guest image is undefined behavior exactly as running
    /// native untrusted code would be.
    pub unsafe fn run(&mut self, ctx: &mut GuestContext) -> Result<ExitReason, Error> {
        ctx.bridge = self.runtime.syscalls() as *const SyscallTable as *mut std::ffi::c_void;

        // Let the fault hooks recover the guest PC while this context is executing.
        crate::signal::set_current_context(ctx as *mut GuestContext);

        let result = self.run_inner(ctx);

        crate::signal::set_current_context(std::ptr::null_mut());

        result
    }

    unsafe fn run_inner(&mut self, ctx: &mut GuestContext) -> Result<ExitReason, Error> {
        let mut pending_chain: Option<(usize, usize)> = None;

        loop {
            if ctx.exit_requested() {
                ctx.clear_exit_request();
                return Ok(ExitReason::ExitRequested);
            }

            let pc = ctx.pc();

            let host_pc = match self.runtime.cache().lookup(pc) {
                Some(host_pc) => host_pc,
                None => self.translate_and_install(pc)?,
            };

            // Patch the edge the previous block left through, so the next time around it jumps
            // straight into this block's body.
            if let Some((from_slot, edge)) = pending_chain.take() {
                self.try_chain(from_slot, edge, pc);
            }

            let slot = self.runtime.cache().slot_of(pc);

            ctx.set_exit_reason(BlockExit::Branch);

            let block: unsafe extern "C" fn(*mut GuestContext) =
                std::mem::transmute(host_pc as usize);
            block(ctx as *mut GuestContext);

            match ctx.exit_reason() {
                BlockExit::Branch => {
                    // Remember which outgoing edge matches the PC we are about to dispatch;
                    // chaining happens once the successor is known to be installed.
                    if let Some(slot) = slot {
                        let next = ctx.pc();

                        for edge in 0..2 {
                            if let Some(candidate) = self.runtime.cache().chain_candidate(slot, edge)
                            {
                                if candidate.target_pc == next {
                                    pending_chain = Some((slot, edge));
                                    break;
                                }
                            }
                        }
                    }
                }
                BlockExit::Breakpoint => {
                    return Ok(ExitReason::Breakpoint {
                        imm: ctx.exit_payload() as u16,
                        pc: ctx.pc(),
                    });
                }
                BlockExit::Unknown => {
                    return Ok(ExitReason::UnknownInstruction {
                        word: ctx.exit_payload() as u32,
                        pc: ctx.pc(),
                    });
                }
            }
        }
    }

    /// Translates the block at `pc`, commits it to the region, installs it in the cache, and
    /// returns its host address. A full region triggers a reset-and-retranslate cycle.
    fn translate_and_install(&self, pc: u64) -> Result<u64, Error> {
        let mut region = self.runtime.region().lock().unwrap();

        // Another thread may have installed the block while this one waited for the lock.
        if let Some(host_pc) = self.runtime.cache().lookup(pc) {
            return Ok(host_pc);
        }

        let config = self.runtime.translator_config();

        let (offset, block) = match Self::emit_into(&mut region, pc, config) {
            Ok(result) => result,
            Err(Error::RegionExhausted | Error::BufferOverflow) => {
                region.reset();
                self.runtime.cache().flush();
                Self::emit_into(&mut region, pc, config)?
            }
            Err(e) => return Err(e),
        };

        let host_pc = region.host_addr(offset);

        let edges = block.edges.map(|edge| {
            edge.map(|edge| ChainEdge {
                target_pc: edge.target_pc,
                patch_site: (offset + edge.patch_site) as u32,
            })
        });

        self.runtime.cache().insert(pc, host_pc, block.len as u32, edges);

        log::debug!(
            "translated block {:#x} -> {:#x} ({} insns, {} bytes)",
            pc,
            host_pc,
            block.insns,
            block.len,
        );

        Ok(host_pc)
    }

    fn emit_into(
        region: &mut CodeRegion,
        pc: u64,
        config: crate::translate::TranslatorConfig,
    ) -> Result<(usize, TranslatedBlock), Error> {
        let window = region.window_mut()?;
        let block = unsafe { translate_block(window, pc, config) }?;
        let offset = region.commit(block.len)?;

        Ok((offset, block))
    }

    /// Best-effort block chaining: patches `edge` of the block in `from_slot` to jump directly
    /// into the body of the block translating `to_pc`. Out-of-range displacements leave the
    /// edge going through the dispatcher.
    fn try_chain(&self, from_slot: usize, edge: usize, to_pc: u64) {
        let cache = self.runtime.cache();

        let Some(candidate) = cache.chain_candidate(from_slot, edge) else {
            return;
        };

        if candidate.target_pc != to_pc {
            return;
        }

        let Some(to_slot) = cache.slot_of(to_pc) else {
            return;
        };

        let Some(to_host) = cache.host_pc_of(to_slot) else {
            return;
        };

        let mut region = self.runtime.region().lock().unwrap();

        let site = candidate.patch_site as usize;
        let site_addr = region.host_addr(site);
        let target = to_host + PROLOGUE_LEN as u64;
        let disp = target as i64 - (site_addr as i64 + 4);

        if i32::try_from(disp).is_err() {
            // ChainRangeExceeded: fall back silently to the dispatcher path.
            log::debug!("chain {:#x} -> {:#x} out of rel32 range", site_addr, target);
            return;
        }

        region.patch_u32(site, disp as i32 as u32);
        cache.chain(from_slot, edge, to_slot);

        log::trace!("chained slot {} edge {} -> {:#x}", from_slot, edge, to_pc);
    }
}

/// The function translated `SVC` instructions call. Reads the AArch64 syscall convention from
/// the context (number in x8, arguments in x0–x5), dispatches through the bridge the dispatcher
/// installed, and writes the result to x0.
pub(crate) unsafe extern "C" fn syscall_entry(ctx: *mut GuestContext) {
    let ctx = &mut *ctx;

    let number = ctx.x(8) as u32;
    let args = [ctx.x(0), ctx.x(1), ctx.x(2), ctx.x(3), ctx.x(4), ctx.x(5)];

    let result = if ctx.bridge.is_null() {
        crate::syscall::UNIMPLEMENTED
    } else {
        let table = &*(ctx.bridge as *const SyscallTable);
        table.dispatch_syscall(ctx, number, args)
    };

    ctx.set_x(0, result as u64);
}
