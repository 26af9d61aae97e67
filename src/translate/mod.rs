//! This module provides the per-basic-block translator: it walks guest instructions from a
//! starting program counter, decodes each word, and emits equivalent x86 through the
//! [`Emitter`](crate::x86::Emitter) until the block terminates at a control transfer, an
//! unknown instruction, or the instruction cap.
//!
//! The per-class handlers live in the submodules ([`alu`](self), branch, memory, atomic, SIMD),
//! all as methods on [`Translator`]; this file holds the block skeleton — prologue, exit stubs,
//! the shared epilogue thunk — and the helpers every handler shares (guest register access,
//! condition evaluation, NZCV materialization).
//!
//! # Block ABI
//!
//! A translated block is entered as `extern "C" fn(*mut GuestContext)`. The prologue saves R15
//! and points it at the context; every guest register access goes through R15. Computation uses
//! caller-saved host registers only (RAX/RCX/RDX/RSI/RDI/R8–R11), so nothing else needs saving.
//! Every exit stub writes the next guest program counter into the context, checks the
//! cooperative exit flag, and jumps through a patchable `jmp rel32` — initially aimed at the
//! shared thunk (`pop r15; ret`, returning to the dispatcher), later patched by block chaining
//! to jump straight into the successor's body.
//!
//! # Condition flags
//!
//! Host EFLAGS follow the x86 CMP convention: the carry holds the *borrow*, the inverse of the
//! ARM carry. `SUBS`/`CMP` produce it natively, `ADDS` appends `CMC`, `ANDS` appends `STC`.
//! After every flag-setting instruction the architectural NZCV is materialized into the guest
//! context (EFLAGS-preserving), so flags survive block boundaries; a consumer uses the direct
//! Jcc mapping while host flags are live and NZCV bit tests from the context otherwise.

mod alu;
mod atomic;
mod branch;
mod mem;
mod simd;

use crate::buffer::CodeBuffer;
use crate::decode::{decode, Cond, Inst};
use crate::error::Error;
use crate::guest::{BlockExit, GuestContext, NZCV_C, NZCV_N, NZCV_V, NZCV_Z};
use crate::x86::{AluOp, Cc, Emitter, Reg, ShiftOp};

/// What to do when the decoder reports an unknown instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnknownPolicy {
    /// Emit a fault exit that hands the raw word to the dispatcher (the default).
    Trap,
    /// Abort the translation with [`Error::DecodeUnknown`]; the block is not installed.
    Abort,
}

/// Tunables for the translator.
#[derive(Clone, Copy, Debug)]
pub struct TranslatorConfig {
    /// Maximum guest instructions per block before a forced fallthrough edge.
    pub max_block_insns: usize,
    /// Unknown-instruction strategy.
    pub unknown_policy: UnknownPolicy,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_block_insns: 128,
            unknown_policy: UnknownPolicy::Trap,
        }
    }
}

/// An outgoing edge of a translated block, eligible for chaining.
#[derive(Clone, Copy, Debug)]
pub struct BlockEdge {
    /// Guest address the block continues at through this edge.
    pub target_pc: u64,
    /// Offset (within the block) of the rel32 displacement of the exit jump.
    pub patch_site: usize,
}

/// The result of translating one basic block into an emit window.
#[derive(Debug)]
pub struct TranslatedBlock {
    /// Bytes emitted.
    pub len: usize,
    /// Guest instructions consumed.
    pub insns: usize,
    /// Taken/fallthrough successor edges, where statically known.
    pub edges: [Option<BlockEdge>; 2],
}

/// Byte length of the block prologue (`push r15; mov r15, rdi`). Chained jumps enter a block
/// just past it, since the chaining predecessor already holds the context in R15.
pub(crate) const PROLOGUE_LEN: usize = 5;

/// The per-block translation state.
pub(crate) struct Translator<'a, 'b> {
    e: Emitter<'a, 'b>,
    config: TranslatorConfig,
    /// Guest address of the instruction currently being translated.
    pc: u64,
    /// True while host EFLAGS still hold the last translated flag-setter's result.
    flags_live: bool,
    /// Statically known register values, maintained across move-wide sequences.
    known: [Option<u64>; 32],
    /// Successor edges recorded by the exit stubs.
    edges: [Option<BlockEdge>; 2],
    /// Rel32 sites to patch to the shared epilogue thunk.
    thunk_sites: Vec<usize>,
}

impl<'a, 'b> Translator<'a, 'b> {
    fn new(buf: &'a mut CodeBuffer<'b>, pc: u64, config: TranslatorConfig) -> Self {
        Self {
            e: Emitter::new(buf),
            config,
            pc,
            flags_live: false,
            known: [None; 32],
            edges: [None, None],
            thunk_sites: Vec::new(),
        }
    }

    // ── Guest register access ──
    //
    // Register index 31 reads as zero and discards writes, except where `sp` says the
    // instruction names the stack pointer.

    fn load_gp(&mut self, dst: Reg, idx: u8, sp: bool) {
        if idx == 31 {
            if sp {
                self.e.mov_load(true, dst, Reg::R15, GuestContext::SP_OFFSET);
            } else {
                // B8+r does not touch EFLAGS, unlike xor.
                self.e.mov_ri32(dst, 0);
            }
        } else {
            self.e.mov_load(true, dst, Reg::R15, GuestContext::x_offset(idx));
        }
    }

    fn store_gp(&mut self, idx: u8, src: Reg, sp: bool) {
        if idx == 31 {
            if sp {
                self.e.mov_store(true, Reg::R15, GuestContext::SP_OFFSET, src);
            }
        } else {
            self.e.mov_store(true, Reg::R15, GuestContext::x_offset(idx), src);
        }
    }

    // ── Condition flags ──

    /// Materializes architectural NZCV from live host EFLAGS into the context. EFLAGS are
    /// preserved; RAX/RCX/RDX/RSI are clobbered.
    fn save_nzcv(&mut self) {
        let e = &mut self.e;

        e.pushfq();
        e.pop_r(Reg::Rax);
        e.mov_rr(true, Reg::Rcx, Reg::Rax);
        // Host CF is the borrow; flip bit 0 so it reads as the ARM carry.
        e.alu_ri(AluOp::Xor, false, Reg::Rax, 1);
        e.mov_rr(false, Reg::Rdx, Reg::Rax);
        e.shift_ri(ShiftOp::Shl, false, Reg::Rdx, 24);
        e.alu_ri(AluOp::And, false, Reg::Rdx, (NZCV_N | NZCV_Z) as i32);
        e.mov_rr(false, Reg::Rsi, Reg::Rax);
        e.shift_ri(ShiftOp::Shl, false, Reg::Rsi, 29);
        e.alu_ri(AluOp::And, false, Reg::Rsi, NZCV_C as i32);
        e.alu_rr(AluOp::Or, false, Reg::Rdx, Reg::Rsi);
        e.mov_rr(false, Reg::Rsi, Reg::Rax);
        e.shift_ri(ShiftOp::Shl, false, Reg::Rsi, 17);
        e.alu_ri(AluOp::And, false, Reg::Rsi, NZCV_V as i32);
        e.alu_rr(AluOp::Or, false, Reg::Rdx, Reg::Rsi);
        e.mov_store(false, Reg::R15, GuestContext::NZCV_OFFSET, Reg::Rdx);
        e.push_r(Reg::Rcx);
        e.popfq();

        self.flags_live = true;
    }

    /// The spec mapping from ARM conditions onto x86 condition codes, valid while host EFLAGS
    /// hold the last flag-setter's result in the CMP convention.
    fn cond_to_cc(cond: Cond) -> Cc {
        match cond {
            Cond::Eq => Cc::E,
            Cond::Ne => Cc::Ne,
            Cond::Cs => Cc::Ae,
            Cond::Cc => Cc::B,
            Cond::Mi => Cc::S,
            Cond::Pl => Cc::Ns,
            Cond::Vs => Cc::O,
            Cond::Vc => Cc::No,
            Cond::Hi => Cc::A,
            Cond::Ls => Cc::Be,
            Cond::Ge => Cc::Ge,
            Cond::Lt => Cc::L,
            Cond::Gt => Cc::G,
            Cond::Le => Cc::Le,
            Cond::Al | Cond::Nv => unreachable!("handled by the callers"),
        }
    }

    /// Emits a conditional jump taken when `cond` holds, returning the rel32 patch site.
    ///
    /// With live flags this is the direct Jcc mapping. Otherwise the condition is recomputed
    /// from the NZCV word stored in the context (clobbering RAX/RCX and EFLAGS). `AL` emits an
    /// unconditional jump; `NV` must be filtered out by the caller.
    fn emit_branch_cond(&mut self, cond: Cond) -> usize {
        if cond == Cond::Al {
            return self.e.jmp();
        }

        if self.flags_live {
            return self.e.jcc(Self::cond_to_cc(cond));
        }

        let e = &mut self.e;
        e.mov_load(false, Reg::Rax, Reg::R15, GuestContext::NZCV_OFFSET);

        match cond {
            Cond::Eq => {
                e.test_ri(false, Reg::Rax, NZCV_Z as i32);
                e.jcc(Cc::Ne)
            }
            Cond::Ne => {
                e.test_ri(false, Reg::Rax, NZCV_Z as i32);
                e.jcc(Cc::E)
            }
            Cond::Cs => {
                e.test_ri(false, Reg::Rax, NZCV_C as i32);
                e.jcc(Cc::Ne)
            }
            Cond::Cc => {
                e.test_ri(false, Reg::Rax, NZCV_C as i32);
                e.jcc(Cc::E)
            }
            Cond::Mi => {
                e.test_ri(false, Reg::Rax, NZCV_N as i32);
                e.jcc(Cc::Ne)
            }
            Cond::Pl => {
                e.test_ri(false, Reg::Rax, NZCV_N as i32);
                e.jcc(Cc::E)
            }
            Cond::Vs => {
                e.test_ri(false, Reg::Rax, NZCV_V as i32);
                e.jcc(Cc::Ne)
            }
            Cond::Vc => {
                e.test_ri(false, Reg::Rax, NZCV_V as i32);
                e.jcc(Cc::E)
            }
            Cond::Hi | Cond::Ls => {
                // C set and Z clear, i.e. (nzcv & (C|Z)) == C.
                e.alu_ri(AluOp::And, false, Reg::Rax, (NZCV_C | NZCV_Z) as i32);
                e.alu_ri(AluOp::Cmp, false, Reg::Rax, NZCV_C as i32);
                e.jcc(if cond == Cond::Hi { Cc::E } else { Cc::Ne })
            }
            Cond::Ge | Cond::Lt => {
                // N == V, i.e. bit 28 of (nzcv >> 3) ^ nzcv is clear.
                e.mov_rr(false, Reg::Rcx, Reg::Rax);
                e.shift_ri(ShiftOp::Shr, false, Reg::Rcx, 3);
                e.alu_rr(AluOp::Xor, false, Reg::Rcx, Reg::Rax);
                e.test_ri(false, Reg::Rcx, NZCV_V as i32);
                e.jcc(if cond == Cond::Ge { Cc::E } else { Cc::Ne })
            }
            Cond::Gt | Cond::Le => {
                // Z clear and N == V: fold N^V (at bit 28) and Z (at bit 30) into one word.
                e.mov_rr(false, Reg::Rcx, Reg::Rax);
                e.shift_ri(ShiftOp::Shr, false, Reg::Rcx, 3);
                e.alu_rr(AluOp::Xor, false, Reg::Rcx, Reg::Rax);
                e.alu_ri(AluOp::And, false, Reg::Rcx, NZCV_V as i32);
                e.alu_ri(AluOp::And, false, Reg::Rax, NZCV_Z as i32);
                e.alu_rr(AluOp::Or, false, Reg::Rcx, Reg::Rax);
                e.jcc(if cond == Cond::Gt { Cc::E } else { Cc::Ne })
            }
            Cond::Al | Cond::Nv => unreachable!("handled above and by the callers"),
        }
    }

    // ── Block skeleton ──

    fn emit_prologue(&mut self) {
        let start = self.e.offset();

        self.e.push_r(Reg::R15);
        self.e.mov_rr(true, Reg::R15, Reg::Rdi);

        debug_assert_eq!(self.e.offset() - start, PROLOGUE_LEN);
    }

    /// Emits an exit stub continuing at the statically known `target_pc`. The stub's chainable
    /// jump is recorded in edge slot `edge` when given.
    fn emit_exit(&mut self, target_pc: u64, edge: Option<usize>) {
        self.e.mov_ri64(Reg::Rax, target_pc);
        self.e.mov_store(true, Reg::R15, GuestContext::PC_OFFSET, Reg::Rax);

        self.e.mov_load(false, Reg::Rcx, Reg::R15, GuestContext::EXIT_REQUESTED_OFFSET);
        self.e.test_rr(false, Reg::Rcx, Reg::Rcx);
        let bail = self.e.jcc(Cc::Ne);
        self.thunk_sites.push(bail);

        // The displacement gets rewritten while other threads may be executing this block;
        // keeping it 4-byte aligned makes the patch store atomic (blocks start 16-aligned).
        while (self.e.offset() + 1) % 4 != 0 {
            self.e.nop();
        }

        let chain_site = self.e.jmp();
        self.thunk_sites.push(chain_site);

        if let Some(slot) = edge {
            self.edges[slot] = Some(BlockEdge { target_pc, patch_site: chain_site });
        }
    }

    /// Emits an exit whose target was already written to the context's PC slot (register
    /// branches). Not chainable.
    fn emit_exit_dynamic(&mut self) {
        let site = self.e.jmp();
        self.thunk_sites.push(site);
    }

    /// Emits a fault exit: records the reason and payload in the context, restores the faulting
    /// instruction's address as the guest PC, and leaves through the thunk.
    fn emit_fault_exit(&mut self, reason: BlockExit, payload: u64) {
        self.e
            .mov_store_imm32(Reg::R15, GuestContext::EXIT_REASON_OFFSET, reason as u32);
        self.e.mov_ri64(Reg::Rax, payload);
        self.e
            .mov_store(true, Reg::R15, GuestContext::EXIT_PAYLOAD_OFFSET, Reg::Rax);
        self.e.mov_ri64(Reg::Rax, self.pc);
        self.e.mov_store(true, Reg::R15, GuestContext::PC_OFFSET, Reg::Rax);

        let site = self.e.jmp();
        self.thunk_sites.push(site);
    }

    /// Emits the shared epilogue thunk and patches every pending site to it.
    fn emit_thunk(&mut self) {
        let thunk = self.e.offset();

        for site in std::mem::take(&mut self.thunk_sites) {
            self.e.patch_rel32(site, thunk);
        }

        self.e.pop_r(Reg::R15);
        self.e.ret();
    }

    // ── Per-instruction dispatch ──

    /// Translates one decoded instruction; `Ok(true)` ends the block.
    fn translate_inst(&mut self, inst: Inst, word: u32) -> Result<bool, Error> {
        // Static value tracking only survives move-wide sequences.
        if !matches!(inst, Inst::MoveWide { .. }) {
            self.known = [None; 32];
        }

        match inst {
            Inst::MoveWide { kind, sf, rd, imm16, shift } => {
                self.emit_move_wide(kind, sf, rd, imm16, shift);
                Ok(false)
            }
            Inst::Alu { op, sf, set_flags, rd, rn, operand } => {
                self.emit_alu(op, sf, set_flags, rd, rn, operand);
                Ok(false)
            }
            Inst::Adr { rd, imm, page } => {
                self.emit_adr(rd, imm, page);
                Ok(false)
            }
            Inst::Bitfield { kind, sf, rd, rn, immr, imms } => {
                self.emit_bitfield(kind, sf, rd, rn, immr, imms);
                Ok(false)
            }
            Inst::Extract { sf, rd, rn, rm, lsb } => {
                self.emit_extract(sf, rd, rn, rm, lsb);
                Ok(false)
            }
            Inst::VarShift { op, sf, rd, rn, rm } => {
                self.emit_var_shift(op, sf, rd, rn, rm);
                Ok(false)
            }
            Inst::Unary { op, sf, rd, rn } => {
                self.emit_unary(op, sf, rd, rn);
                Ok(false)
            }
            Inst::Mul { op, sf, rd, rn, rm, ra } => {
                self.emit_mul(op, sf, rd, rn, rm, ra);
                Ok(false)
            }
            Inst::Div { sf, signed, rd, rn, rm } => {
                self.emit_div(sf, signed, rd, rn, rm);
                Ok(false)
            }
            Inst::Crc32c { size, rd, rn, rm } => {
                self.emit_crc32c(size, rd, rn, rm);
                Ok(false)
            }
            Inst::CondSelect { kind, sf, rd, rn, rm, cond } => {
                self.emit_cond_select(kind, sf, rd, rn, rm, cond);
                Ok(false)
            }
            Inst::CondCompare { sf, sub, rn, imm, rm_or_imm, cond, nzcv } => {
                self.emit_cond_compare(sf, sub, rn, imm, rm_or_imm, cond, nzcv);
                Ok(false)
            }
            Inst::Mem { load, size, signed, sf, vector, rt, rn, addr } => {
                self.emit_mem(load, size, signed, sf, vector, rt, rn, addr);
                Ok(false)
            }
            Inst::MemPair { load, size, signed, vector, rt, rt2, rn, mode, imm } => {
                self.emit_mem_pair(load, size, signed, vector, rt, rt2, rn, mode, imm);
                Ok(false)
            }
            Inst::LoadLiteral { rt, offset, size, signed, vector } => {
                self.emit_load_literal(rt, offset, size, signed, vector);
                Ok(false)
            }
            Inst::Branch { link, offset } => {
                self.emit_branch(link, offset);
                Ok(true)
            }
            Inst::BranchReg { kind, rn } => {
                self.emit_branch_reg(kind, rn);
                Ok(true)
            }
            Inst::BranchCond { cond, offset } => Ok(self.emit_cond_branch(cond, offset)),
            Inst::CmpBranch { sf, nonzero, rt, offset } => {
                self.emit_cmp_branch(sf, nonzero, rt, offset);
                Ok(true)
            }
            Inst::TestBranch { nonzero, rt, bit, offset } => {
                self.emit_test_branch(nonzero, rt, bit, offset);
                Ok(true)
            }
            Inst::Svc { imm } => {
                self.emit_svc(imm);
                Ok(true)
            }
            Inst::Brk { imm } => {
                self.emit_fault_exit(BlockExit::Breakpoint, u64::from(imm));
                Ok(true)
            }
            Inst::Nop => Ok(false),
            Inst::Barrier { kind } => {
                self.emit_barrier(kind);
                Ok(false)
            }
            Inst::SysRegMove { read, rt, reg } => self.emit_sysreg_move(read, rt, reg, word),
            Inst::LoadEx { size, acquire, rt, rn } => {
                self.emit_load_exclusive(size, acquire, rt, rn);
                Ok(false)
            }
            Inst::StoreEx { size, release, rs, rt, rn } => {
                self.emit_store_exclusive(size, release, rs, rt, rn);
                Ok(false)
            }
            Inst::LoadAcquire { size, rt, rn } => {
                self.emit_load_acquire(size, rt, rn);
                Ok(false)
            }
            Inst::StoreRelease { size, rt, rn } => {
                self.emit_store_release(size, rt, rn);
                Ok(false)
            }
            Inst::AtomicRmw { op, size, acquire, release, rs, rt, rn } => {
                self.emit_atomic_rmw(op, size, rs, rt, rn, acquire, release);
                Ok(false)
            }
            Inst::Cas { size, acquire, release, rs, rt, rn } => {
                self.emit_cas(size, rs, rt, rn, acquire, release);
                Ok(false)
            }
            Inst::VecRrr { op, esize, q, rd, rn, rm } => {
                self.emit_vec_rrr(op, esize, q, rd, rn, rm);
                Ok(false)
            }
            Inst::VecFloatRrr { op, double, q, rd, rn, rm } => {
                self.emit_vec_float_rrr(op, double, q, rd, rn, rm);
                Ok(false)
            }
            Inst::VecMulti { load, regs, interleave, esize, q, rt, rn, post } => {
                self.emit_vec_multi(load, regs, interleave, esize, q, rt, rn, post);
                Ok(false)
            }
            Inst::VecMovImm { q, rd, imm } => {
                self.emit_vec_mov_imm(q, rd, imm);
                Ok(false)
            }
            Inst::VecDup { esize, q, rd, rn } => {
                self.emit_vec_dup(esize, q, rd, rn);
                Ok(false)
            }
            Inst::VecDupElem { esize, q, rd, rn, index } => {
                self.emit_vec_dup_elem(esize, q, rd, rn, index);
                Ok(false)
            }
            Inst::VecInsGeneral { esize, rd, index, rn } => {
                self.emit_vec_ins_general(esize, rd, index, rn);
                Ok(false)
            }
            Inst::VecInsElem { esize, rd, dst, rn, src } => {
                self.emit_vec_ins_elem(esize, rd, dst, rn, src);
                Ok(false)
            }
            Inst::VecMovToGeneral { esize, signed, sf, rd, rn, index } => {
                self.emit_vec_mov_to_general(esize, signed, sf, rd, rn, index);
                Ok(false)
            }
            Inst::FmovGeneral { to_vec, double, rd, rn } => {
                self.emit_fmov_general(to_vec, double, rd, rn);
                Ok(false)
            }
            Inst::Unknown { word } => match self.config.unknown_policy {
                UnknownPolicy::Trap => {
                    self.emit_fault_exit(BlockExit::Unknown, u64::from(word));
                    Ok(true)
                }
                UnknownPolicy::Abort => Err(Error::DecodeUnknown { word, pc: self.pc }),
            },
        }
    }
}

/// Translates the basic block starting at `start_pc` into `window`.
///
/// # Safety
///
/// Guest addresses are identity-mapped: `start_pc` must point at readable memory holding valid
/// instruction words for as long as the translator walks the block (at most
/// `config.max_block_insns` words).
pub(crate) unsafe fn translate_block(
    window: &mut [u8],
    start_pc: u64,
    config: TranslatorConfig,
) -> Result<TranslatedBlock, Error> {
    if start_pc % 4 != 0 {
        return Err(Error::MisalignedPc(start_pc));
    }

    let mut buf = CodeBuffer::new(window);
    let mut t = Translator::new(&mut buf, start_pc, config);
    let mut insns = 0;

    t.emit_prologue();

    loop {
        let word = (t.pc as *const u32).read_unaligned();
        let inst = decode(word);

        log::trace!("translate {:#x}: {:#010x} {:?}", t.pc, word, inst);

        let ended = t.translate_inst(inst, word)?;
        insns += 1;

        if ended {
            break;
        }

        t.pc += 4;

        if insns >= config.max_block_insns {
            let next = t.pc;
            t.emit_exit(next, Some(0));
            break;
        }
    }

    t.emit_thunk();

    let edges = t.edges;
    let len = buf.offset();

    if buf.error() {
        return Err(Error::BufferOverflow);
    }

    Ok(TranslatedBlock { len, insns, edges })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(words: &[u32], config: TranslatorConfig) -> Result<(Vec<u8>, TranslatedBlock), Error> {
        let mut window = vec![0u8; 4096];
        let block = unsafe { translate_block(&mut window, words.as_ptr() as u64, config) }?;
        window.truncate(block.len);

        Ok((window, block))
    }

    #[test]
    fn rejects_misaligned_pc() {
        let words = [0xd503_201f_u32];
        let mut window = vec![0u8; 256];

        let result = unsafe {
            translate_block(&mut window, words.as_ptr() as u64 + 2, TranslatorConfig::default())
        };

        assert!(matches!(result, Err(Error::MisalignedPc(_))));
    }

    #[test]
    fn abort_policy_surfaces_unknown_words() {
        let words = [0x0000_0000_u32];

        let config = TranslatorConfig {
            unknown_policy: UnknownPolicy::Abort,
            ..TranslatorConfig::default()
        };

        match translate(&words, config) {
            Err(Error::DecodeUnknown { word: 0, .. }) => {}
            other => panic!("expected DecodeUnknown, got {other:?}"),
        }
    }

    #[test]
    fn overflowing_window_reports_buffer_overflow() {
        let words = [0xd280_0540_u32, 0xd65f_03c0];
        let mut window = vec![0u8; 8];

        let result = unsafe {
            translate_block(&mut window, words.as_ptr() as u64, TranslatorConfig::default())
        };

        assert!(matches!(result, Err(Error::BufferOverflow)));
    }

    #[test]
    fn block_shape_for_return() {
        // MOVZ X0, #42; RET.
        let words = [0xd280_0540_u32, 0xd65f_03c0];
        let (bytes, block) = translate(&words, TranslatorConfig::default()).unwrap();

        assert_eq!(block.insns, 2);
        // push r15; mov r15, rdi.
        assert_eq!(&bytes[..PROLOGUE_LEN], &[0x41, 0x57, 0x4c, 0x8b, 0xff]);
        // A register branch has no statically known successor.
        assert!(block.edges[0].is_none());
        assert!(block.edges[1].is_none());
        // The shared thunk ends the block.
        assert_eq!(&bytes[bytes.len() - 3..], &[0x41, 0x5f, 0xc3]);
    }

    #[test]
    fn conditional_branch_records_both_edges() {
        // ADDS X2, X0, X1; B.EQ +8.
        let words = [0xab01_0002_u32, 0x5400_0040];
        let pc = words.as_ptr() as u64;
        let (_, block) = translate(&words, TranslatorConfig::default()).unwrap();

        let taken = block.edges[0].expect("taken edge");
        let fallthrough = block.edges[1].expect("fallthrough edge");

        assert_eq!(taken.target_pc, pc + 4 + 8);
        assert_eq!(fallthrough.target_pc, pc + 4 + 4);

        // Chain sites are 4-byte aligned so patches are atomic.
        assert_eq!(taken.patch_site % 4, 0);
        assert_eq!(fallthrough.patch_site % 4, 0);
    }

    #[test]
    fn block_caps_at_max_instructions() {
        // An endless run of NOP-like ADDs.
        let words = vec![0x9100_0421_u32; 16];
        let pc = words.as_ptr() as u64;

        let config = TranslatorConfig {
            max_block_insns: 8,
            ..TranslatorConfig::default()
        };

        let (_, block) = translate(&words, config).unwrap();

        assert_eq!(block.insns, 8);
        assert_eq!(block.edges[0].expect("fallthrough edge").target_pc, pc + 8 * 4);
    }
}
