//! Atomic and ordered-access translators.
//!
//! x86 loads carry acquire and stores carry release semantics, so `LDAR` is a plain load and
//! `STLR` a store followed by `MFENCE` (the conservative StoreLoad placement). Exclusive pairs
//! are emulated with a software monitor in the guest context and a `LOCK CMPXCHG` at the store;
//! the LSE read-modify-write group uses `LOCK XADD`/`LOCK OR`/... where the host has a direct
//! equivalent and a compare-exchange retry loop everywhere else. Locked operations are full
//! barriers on the host, which subsumes every acquire/release qualifier.

use super::Translator;
use crate::decode::RmwOp;
use crate::guest::GuestContext;
use crate::x86::{AluOp, Cc, Reg};

impl Translator<'_, '_> {
    fn cmpxchg_sized(&mut self, size: u8, base: Reg, src: Reg) {
        match size {
            1 => self.e.cmpxchg8_mr(base, 0, src),
            2 => self.e.cmpxchg16_mr(base, 0, src),
            4 => self.e.cmpxchg_mr(false, base, 0, src),
            _ => self.e.cmpxchg_mr(true, base, 0, src),
        }
    }

    pub(super) fn emit_load_exclusive(&mut self, size: u8, _acquire: bool, rt: u8, rn: u8) {
        self.load_gp(Reg::Rcx, rn, true);
        self.e.load_sized(size, false, false, Reg::Rax, Reg::Rcx, 0);
        self.store_gp(rt, Reg::Rax, false);

        // Arm the monitor with the observed address and value.
        self.e
            .mov_store(true, Reg::R15, GuestContext::EXCL_ADDR_OFFSET, Reg::Rcx);
        self.e
            .mov_store(true, Reg::R15, GuestContext::EXCL_VAL_OFFSET, Reg::Rax);

        self.flags_live = false;
    }

    pub(super) fn emit_store_exclusive(&mut self, size: u8, _release: bool, rs: u8, rt: u8, rn: u8) {
        self.load_gp(Reg::Rcx, rn, true);

        // The store succeeds only if the monitor still covers this address and the memory
        // still holds the value the exclusive load observed.
        self.e
            .alu_mr(AluOp::Cmp, true, Reg::R15, GuestContext::EXCL_ADDR_OFFSET, Reg::Rcx);
        let wrong_addr = self.e.jcc(Cc::Ne);

        self.e
            .mov_load(true, Reg::Rax, Reg::R15, GuestContext::EXCL_VAL_OFFSET);
        self.load_gp(Reg::Rdx, rt, false);
        self.e.lock();
        self.cmpxchg_sized(size, Reg::Rcx, Reg::Rdx);
        let contended = self.e.jcc(Cc::Ne);

        self.e.mov_ri32(Reg::Rax, 0);
        let done = self.e.jmp();

        let fail = self.e.offset();
        self.e.patch_rel32(wrong_addr, fail);
        self.e.patch_rel32(contended, fail);
        self.e.mov_ri32(Reg::Rax, 1);

        let end = self.e.offset();
        self.e.patch_rel32(done, end);
        self.store_gp(rs, Reg::Rax, false);

        // The monitor is consumed either way.
        self.e.mov_ri64(Reg::Rax, u64::MAX);
        self.e
            .mov_store(true, Reg::R15, GuestContext::EXCL_ADDR_OFFSET, Reg::Rax);

        self.flags_live = false;
    }

    pub(super) fn emit_load_acquire(&mut self, size: u8, rt: u8, rn: u8) {
        self.load_gp(Reg::Rcx, rn, true);
        self.e.load_sized(size, false, false, Reg::Rax, Reg::Rcx, 0);
        self.store_gp(rt, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_store_release(&mut self, size: u8, rt: u8, rn: u8) {
        self.load_gp(Reg::Rcx, rn, true);
        self.load_gp(Reg::Rdx, rt, false);
        self.e.store_sized(size, Reg::Rcx, 0, Reg::Rdx);
        self.e.mfence();
        self.flags_live = false;
    }

    pub(super) fn emit_atomic_rmw(
        &mut self,
        op: RmwOp,
        size: u8,
        rs: u8,
        rt: u8,
        rn: u8,
        _acquire: bool,
        _release: bool,
    ) {
        self.load_gp(Reg::Rcx, rn, true);
        self.load_gp(Reg::Rsi, rs, false);

        let discard = rt == 31;

        // Direct host equivalents first.
        match op {
            RmwOp::Add if size >= 4 => {
                self.e.mov_rr(true, Reg::Rax, Reg::Rsi);
                self.e.lock();
                self.e.xadd_mr(size == 8, Reg::Rcx, 0, Reg::Rax);
                self.store_gp(rt, Reg::Rax, false);
                self.flags_live = false;
                return;
            }
            RmwOp::Set if discard && size >= 4 => {
                self.e.lock();
                self.e.alu_mr(AluOp::Or, size == 8, Reg::Rcx, 0, Reg::Rsi);
                self.flags_live = false;
                return;
            }
            RmwOp::Clr if discard && size >= 4 => {
                self.e.not_r(true, Reg::Rsi);
                self.e.lock();
                self.e.alu_mr(AluOp::And, size == 8, Reg::Rcx, 0, Reg::Rsi);
                self.flags_live = false;
                return;
            }
            RmwOp::Eor if discard && size >= 4 => {
                self.e.lock();
                self.e.alu_mr(AluOp::Xor, size == 8, Reg::Rcx, 0, Reg::Rsi);
                self.flags_live = false;
                return;
            }
            _ => {}
        }

        // Everything else becomes a compare-exchange retry loop. The clear mask is inverted
        // once, outside the loop.
        if op == RmwOp::Clr {
            self.e.not_r(true, Reg::Rsi);
        }

        let w = size == 8;
        let signed_cmp = matches!(op, RmwOp::Smax | RmwOp::Smin);

        self.e
            .load_sized(size, signed_cmp && size < 4, false, Reg::Rax, Reg::Rcx, 0);

        let retry = self.e.offset();

        // A failed narrow CMPXCHG rewrites only the low part of RAX; renormalize so the
        // min/max comparisons below see a coherent 32-bit value.
        if size < 4 {
            if signed_cmp {
                if size == 1 {
                    self.e.movsx8_rr(false, Reg::Rax, Reg::Rax);
                } else {
                    self.e.movsx16_rr(false, Reg::Rax, Reg::Rax);
                }
            } else if size == 1 {
                self.e.movzx8_rr(Reg::Rax, Reg::Rax);
            } else {
                self.e.movzx16_rr(Reg::Rax, Reg::Rax);
            }
        }

        self.e.mov_rr(true, Reg::Rdx, Reg::Rax);

        match op {
            RmwOp::Add => self.e.alu_rr(AluOp::Add, w, Reg::Rdx, Reg::Rsi),
            RmwOp::Clr => self.e.alu_rr(AluOp::And, w, Reg::Rdx, Reg::Rsi),
            RmwOp::Eor => self.e.alu_rr(AluOp::Xor, w, Reg::Rdx, Reg::Rsi),
            RmwOp::Set => self.e.alu_rr(AluOp::Or, w, Reg::Rdx, Reg::Rsi),
            RmwOp::Swp => self.e.mov_rr(true, Reg::Rdx, Reg::Rsi),
            RmwOp::Smax => {
                self.e.alu_rr(AluOp::Cmp, w, Reg::Rdx, Reg::Rsi);
                self.e.cmovcc(Cc::L, w, Reg::Rdx, Reg::Rsi);
            }
            RmwOp::Smin => {
                self.e.alu_rr(AluOp::Cmp, w, Reg::Rdx, Reg::Rsi);
                self.e.cmovcc(Cc::G, w, Reg::Rdx, Reg::Rsi);
            }
            RmwOp::Umax => {
                self.e.alu_rr(AluOp::Cmp, w, Reg::Rdx, Reg::Rsi);
                self.e.cmovcc(Cc::B, w, Reg::Rdx, Reg::Rsi);
            }
            RmwOp::Umin => {
                self.e.alu_rr(AluOp::Cmp, w, Reg::Rdx, Reg::Rsi);
                self.e.cmovcc(Cc::A, w, Reg::Rdx, Reg::Rsi);
            }
        }

        self.e.lock();
        self.cmpxchg_sized(size, Reg::Rcx, Reg::Rdx);
        let back = self.e.jcc(Cc::Ne);
        self.e.patch_rel32(back, retry);

        if !discard {
            // The architectural result is the zero-extended old value.
            if size == 1 {
                self.e.movzx8_rr(Reg::Rax, Reg::Rax);
            } else if size == 2 {
                self.e.movzx16_rr(Reg::Rax, Reg::Rax);
            }

            self.store_gp(rt, Reg::Rax, false);
        }

        self.flags_live = false;
    }

    pub(super) fn emit_cas(
        &mut self,
        size: u8,
        rs: u8,
        rt: u8,
        rn: u8,
        _acquire: bool,
        _release: bool,
    ) {
        self.load_gp(Reg::Rcx, rn, true);
        self.load_gp(Reg::Rax, rs, false);
        self.load_gp(Reg::Rdx, rt, false);

        self.e.lock();
        self.cmpxchg_sized(size, Reg::Rcx, Reg::Rdx);

        // RAX now holds the value observed in memory; CAS returns it through Rs.
        if size == 1 {
            self.e.movzx8_rr(Reg::Rax, Reg::Rax);
        } else if size == 2 {
            self.e.movzx16_rr(Reg::Rax, Reg::Rax);
        }

        self.store_gp(rs, Reg::Rax, false);
        self.flags_live = false;
    }
}
