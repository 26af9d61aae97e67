//! Load/store translators. Guest addresses are identity-mapped, so an effective address is a
//! host address: the handlers compute it into RAX and access memory through it directly.
//! Vector transfers stage through XMM0 (all guest vector state lives in the context record, so
//! host XMM registers are pure scratch).

use super::Translator;
use crate::decode::{AddrMode, Extend, PairMode};
use crate::guest::GuestContext;
use crate::x86::sse::Xmm;
use crate::x86::{AluOp, Reg};

impl Translator<'_, '_> {
    /// `reg += imm` without disturbing EFLAGS when the displacement is small.
    pub(super) fn add_imm_to(&mut self, reg: Reg, imm: i64) {
        if imm == 0 {
            return;
        }

        if i32::try_from(imm).is_ok() {
            self.e.lea(reg, reg, imm as i32);
        } else {
            self.e.mov_ri64(Reg::Rcx, imm as u64);
            self.e.alu_rr(AluOp::Add, true, reg, Reg::Rcx);
        }
    }

    /// Leaves the access address in RAX and performs any base writeback. Base register 31 is
    /// the stack pointer.
    fn emit_ea(&mut self, rn: u8, addr: AddrMode) {
        match addr {
            AddrMode::Offset(imm) => {
                self.load_gp(Reg::Rax, rn, true);
                self.add_imm_to(Reg::Rax, imm);
            }
            AddrMode::PreIndex(imm) => {
                self.load_gp(Reg::Rax, rn, true);
                self.add_imm_to(Reg::Rax, imm);
                self.store_gp(rn, Reg::Rax, true);
            }
            AddrMode::PostIndex(imm) => {
                self.load_gp(Reg::Rax, rn, true);
                self.e.mov_rr(true, Reg::Rcx, Reg::Rax);
                self.add_imm_to(Reg::Rcx, imm);
                self.store_gp(rn, Reg::Rcx, true);
            }
            AddrMode::RegOffset { rm, extend, shift } => {
                self.load_gp(Reg::Rax, rn, true);
                self.load_gp(Reg::Rcx, rm, false);

                match extend {
                    Extend::Uxtw => self.e.mov_rr(false, Reg::Rcx, Reg::Rcx),
                    Extend::Sxtw => self.e.movsx32_rr(Reg::Rcx, Reg::Rcx),
                    _ => {}
                }

                if shift > 0 {
                    self.e.shift_ri(crate::x86::ShiftOp::Shl, true, Reg::Rcx, shift);
                }

                self.e.alu_rr(AluOp::Add, true, Reg::Rax, Reg::Rcx);
            }
        }
    }

    /// Loads one register from `[base + disp]` and retires it into the guest register file.
    pub(super) fn emit_load_reg(
        &mut self,
        vector: bool,
        size: u8,
        signed: bool,
        sf: bool,
        rt: u8,
        base: Reg,
        disp: i32,
    ) {
        if !vector {
            if signed && size == 4 {
                if sf {
                    self.e.movsx32_load(Reg::Rdx, base, disp);
                } else {
                    self.e.mov_load(false, Reg::Rdx, base, disp);
                }
            } else {
                self.e.load_sized(size, signed, sf, Reg::Rdx, base, disp);
            }

            // A load of the zero register still performs the access.
            self.store_gp(rt, Reg::Rdx, false);
            return;
        }

        let voff = GuestContext::v_offset(rt);

        match size {
            16 => {
                self.e.movdqu_load(Xmm(0), base, disp);
                self.e.movdqu_store(Reg::R15, voff, Xmm(0));
            }
            8 => {
                self.e.mov_load(true, Reg::Rdx, base, disp);
                self.e.mov_store(true, Reg::R15, voff, Reg::Rdx);
                self.emit_zero_vec_high(rt);
            }
            _ => {
                self.e.load_sized(size, false, false, Reg::Rdx, base, disp);
                self.e.mov_store(true, Reg::R15, voff, Reg::Rdx);
                self.emit_zero_vec_high(rt);
            }
        }
    }

    /// Stores one register to `[base + disp]`.
    pub(super) fn emit_store_reg(&mut self, vector: bool, size: u8, rt: u8, base: Reg, disp: i32) {
        if !vector {
            self.load_gp(Reg::Rdx, rt, false);
            self.e.store_sized(size, base, disp, Reg::Rdx);
            return;
        }

        let voff = GuestContext::v_offset(rt);

        match size {
            16 => {
                self.e.movdqu_load(Xmm(0), Reg::R15, voff);
                self.e.movdqu_store(base, disp, Xmm(0));
            }
            8 => {
                self.e.mov_load(true, Reg::Rdx, Reg::R15, voff);
                self.e.mov_store(true, base, disp, Reg::Rdx);
            }
            _ => {
                self.e.load_sized(size, false, false, Reg::Rdx, Reg::R15, voff);
                self.e.store_sized(size, base, disp, Reg::Rdx);
            }
        }
    }

    /// A sub-128-bit vector load clears the rest of the register.
    fn emit_zero_vec_high(&mut self, rt: u8) {
        self.e.mov_ri32(Reg::Rcx, 0);
        self.e
            .mov_store(true, Reg::R15, GuestContext::v_offset(rt) + 8, Reg::Rcx);
    }

    pub(super) fn emit_mem(
        &mut self,
        load: bool,
        size: u8,
        signed: bool,
        sf: bool,
        vector: bool,
        rt: u8,
        rn: u8,
        addr: AddrMode,
    ) {
        self.emit_ea(rn, addr);

        if load {
            self.emit_load_reg(vector, size, signed, sf, rt, Reg::Rax, 0);
        } else {
            self.emit_store_reg(vector, size, rt, Reg::Rax, 0);
        }

        self.flags_live = false;
    }

    pub(super) fn emit_mem_pair(
        &mut self,
        load: bool,
        size: u8,
        signed: bool,
        vector: bool,
        rt: u8,
        rt2: u8,
        rn: u8,
        mode: PairMode,
        imm: i64,
    ) {
        let addr = match mode {
            PairMode::Offset => AddrMode::Offset(imm),
            PairMode::PreIndex => AddrMode::PreIndex(imm),
            PairMode::PostIndex => AddrMode::PostIndex(imm),
        };

        self.emit_ea(rn, addr);

        if load {
            self.emit_load_reg(vector, size, signed, true, rt, Reg::Rax, 0);
            self.emit_load_reg(vector, size, signed, true, rt2, Reg::Rax, i32::from(size));
        } else {
            self.emit_store_reg(vector, size, rt, Reg::Rax, 0);
            self.emit_store_reg(vector, size, rt2, Reg::Rax, i32::from(size));
        }

        self.flags_live = false;
    }

    pub(super) fn emit_load_literal(
        &mut self,
        rt: u8,
        offset: i64,
        size: u8,
        signed: bool,
        vector: bool,
    ) {
        // The literal address is a translation-time constant.
        let addr = self.pc.wrapping_add(offset as u64);

        self.e.mov_ri64(Reg::Rax, addr);
        self.emit_load_reg(vector, size, signed, true, rt, Reg::Rax, 0);
        self.flags_live = false;
    }
}
