//! Data-processing translators: move-wide, two-operand ALU, bitfields, shifts, multiplies,
//! divides, conditional select/compare, and the one-source bit operations.
//!
//! Conventions shared by every handler: RAX holds the first operand and the result, RCX the
//! second operand, RDX/RSI are extra scratch. 32-bit (`sf = 0`) operations use 32-bit x86 forms,
//! whose implicit zero extension provides the architectural upper-half clearing.

use super::Translator;
use crate::decode::{BitfieldKind, Cond, CselKind, Extend, MoveKind, MulOp, Operand, ShiftKind, UnaryOp};
use crate::decode::AluOp as A64AluOp;
use crate::guest::{GuestContext, NZCV_C};
use crate::x86::{AluOp, Cc, Reg, ShiftOp};

fn shift_op(kind: ShiftKind) -> ShiftOp {
    match kind {
        ShiftKind::Lsl => ShiftOp::Shl,
        ShiftKind::Lsr => ShiftOp::Shr,
        ShiftKind::Asr => ShiftOp::Sar,
        ShiftKind::Ror => ShiftOp::Ror,
    }
}

impl Translator<'_, '_> {
    /// Loads the second operand into `dst`, with any shift or extension applied.
    fn load_operand(&mut self, dst: Reg, operand: Operand, sf: bool) {
        match operand {
            Operand::Imm(imm) => {
                if sf {
                    self.e.mov_ri64(dst, imm);
                } else {
                    self.e.mov_ri32(dst, imm as u32);
                }
            }
            Operand::Reg { rm, shift, amount } => {
                self.load_gp(dst, rm, false);

                if amount > 0 {
                    self.e.shift_ri(shift_op(shift), sf, dst, amount);
                }
            }
            Operand::Ext { rm, extend, shift } => {
                self.load_gp(dst, rm, false);

                match extend {
                    Extend::Uxtb => self.e.movzx8_rr(dst, dst),
                    Extend::Uxth => self.e.movzx16_rr(dst, dst),
                    Extend::Uxtw => self.e.mov_rr(false, dst, dst),
                    Extend::Sxtb => self.e.movsx8_rr(sf, dst, dst),
                    Extend::Sxth => self.e.movsx16_rr(sf, dst, dst),
                    Extend::Sxtw => {
                        if sf {
                            self.e.movsx32_rr(dst, dst);
                        }
                    }
                    Extend::Uxtx | Extend::Sxtx => {}
                }

                if shift > 0 {
                    self.e.shift_ri(ShiftOp::Shl, sf, dst, shift);
                }
            }
        }
    }

    fn set_known(&mut self, rd: u8, value: u64) {
        if rd < 31 {
            self.known[rd as usize] = Some(value);
        }
    }

    /// Materializes a constant into `rd`. Does not disturb EFLAGS.
    fn emit_mov_const(&mut self, rd: u8, value: u64, sf: bool) {
        if rd == 31 {
            return;
        }

        if sf {
            self.e.mov_ri64(Reg::Rax, value);
        } else {
            self.e.mov_ri32(Reg::Rax, value as u32);
        }

        self.store_gp(rd, Reg::Rax, false);
    }

    pub(super) fn emit_move_wide(&mut self, kind: MoveKind, sf: bool, rd: u8, imm16: u16, shift: u8) {
        let shifted = u64::from(imm16) << shift;
        let width_mask = if sf { u64::MAX } else { 0xffff_ffff };

        match kind {
            MoveKind::Movz => {
                let value = shifted & width_mask;
                self.emit_mov_const(rd, value, sf);
                self.set_known(rd, value);
            }
            MoveKind::Movn => {
                let value = !shifted & width_mask;
                self.emit_mov_const(rd, value, sf);
                self.set_known(rd, value);
            }
            MoveKind::Movk => {
                let keep_mask = !(0xffffu64 << shift);

                // A move-wide sequence with a statically known intermediate collapses into a
                // single constant load.
                if rd < 31 {
                    if let Some(prev) = self.known[rd as usize] {
                        let value = ((prev & keep_mask) | shifted) & width_mask;
                        self.emit_mov_const(rd, value, sf);
                        self.set_known(rd, value);
                        return;
                    }
                }

                if rd == 31 {
                    return;
                }

                self.load_gp(Reg::Rax, rd, false);

                if sf {
                    self.e.mov_ri64(Reg::Rcx, keep_mask);
                    self.e.alu_rr(AluOp::And, true, Reg::Rax, Reg::Rcx);
                    self.e.mov_ri64(Reg::Rcx, shifted);
                    self.e.alu_rr(AluOp::Or, true, Reg::Rax, Reg::Rcx);
                } else {
                    self.e.alu_ri(AluOp::And, false, Reg::Rax, keep_mask as u32 as i32);
                    self.e.alu_ri(AluOp::Or, false, Reg::Rax, shifted as u32 as i32);
                }

                self.store_gp(rd, Reg::Rax, false);
                self.known[rd as usize] = None;
                self.flags_live = false;
            }
        }
    }

    pub(super) fn emit_adr(&mut self, rd: u8, imm: i64, page: bool) {
        let base = if page { self.pc & !0xfff } else { self.pc };
        let value = base.wrapping_add(imm as u64);

        self.emit_mov_const(rd, value, true);
    }

    pub(super) fn emit_alu(
        &mut self,
        op: A64AluOp,
        sf: bool,
        set_flags: bool,
        rd: u8,
        rn: u8,
        operand: Operand,
    ) {
        if matches!(op, A64AluOp::Adc | A64AluOp::Sbc) {
            if let Operand::Reg { rm, .. } = operand {
                self.emit_adc_sbc(op == A64AluOp::Sbc, sf, set_flags, rd, rn, rm);
            }

            return;
        }

        // Register 31 names the stack pointer in the immediate and extended forms: as base for
        // add/sub, and as a non-flag-setting destination everywhere the forms allow it.
        let imm_or_ext = matches!(operand, Operand::Imm(_) | Operand::Ext { .. });
        let rn_sp = imm_or_ext && matches!(op, A64AluOp::Add | A64AluOp::Sub);
        let rd_sp = imm_or_ext && !set_flags;

        self.load_gp(Reg::Rax, rn, rn_sp);
        self.load_operand(Reg::Rcx, operand, sf);

        if matches!(op, A64AluOp::Bic | A64AluOp::Orn | A64AluOp::Eon) {
            self.e.not_r(sf, Reg::Rcx);
        }

        let host_op = match op {
            A64AluOp::Add => AluOp::Add,
            A64AluOp::Sub => AluOp::Sub,
            A64AluOp::And | A64AluOp::Bic => AluOp::And,
            A64AluOp::Orr | A64AluOp::Orn => AluOp::Or,
            A64AluOp::Eor | A64AluOp::Eon => AluOp::Xor,
            A64AluOp::Adc | A64AluOp::Sbc => unreachable!(),
        };

        self.e.alu_rr(host_op, sf, Reg::Rax, Reg::Rcx);

        if set_flags {
            match op {
                // The host carry convention stores the borrow; an additive carry-out and the
                // always-clear logical carry both need flipping into it.
                A64AluOp::Add => self.e.cmc(),
                A64AluOp::And | A64AluOp::Bic => self.e.stc(),
                _ => {}
            }

            self.save_nzcv();
        } else {
            self.flags_live = false;
        }

        self.store_gp(rd, Reg::Rax, rd_sp);
    }

    fn emit_adc_sbc(&mut self, sub: bool, sf: bool, set_flags: bool, rd: u8, rn: u8, rm: u8) {
        self.load_gp(Reg::Rax, rn, false);
        self.load_gp(Reg::Rcx, rm, false);

        if self.flags_live {
            // Host CF is the borrow (!C); ADC consumes the plain carry.
            if !sub {
                self.e.cmc();
            }
        } else {
            self.e.mov_load(false, Reg::Rdx, Reg::R15, GuestContext::NZCV_OFFSET);
            self.e.bt_ri(false, Reg::Rdx, NZCV_C.trailing_zeros() as u8);

            if sub {
                self.e.cmc();
            }
        }

        self.e.alu_rr(if sub { AluOp::Sbb } else { AluOp::Adc }, sf, Reg::Rax, Reg::Rcx);

        if !sub {
            self.e.cmc();
        }

        if set_flags {
            self.save_nzcv();
        } else {
            self.flags_live = false;
        }

        self.store_gp(rd, Reg::Rax, false);
    }

    /// `and reg, mask` through an immediate when it fits, a scratch register otherwise.
    fn emit_and_mask(&mut self, sf: bool, reg: Reg, mask: u64) {
        if !sf {
            self.e.alu_ri(AluOp::And, false, reg, mask as u32 as i32);
        } else if mask <= i32::MAX as u64 {
            self.e.alu_ri(AluOp::And, true, reg, mask as i32);
        } else {
            self.e.mov_ri64(Reg::Rcx, mask);
            self.e.alu_rr(AluOp::And, true, reg, Reg::Rcx);
        }
    }

    pub(super) fn emit_bitfield(
        &mut self,
        kind: BitfieldKind,
        sf: bool,
        rd: u8,
        rn: u8,
        immr: u8,
        imms: u8,
    ) {
        let ds = if sf { 64u32 } else { 32 };
        let immr = u32::from(immr);
        let imms = u32::from(imms);

        self.load_gp(Reg::Rax, rn, false);

        match kind {
            BitfieldKind::Ubfm => {
                if imms >= immr {
                    // Extract rn[imms:immr] into the low bits (LSR, UBFX, UXTB, UXTH).
                    if immr > 0 {
                        self.e.shift_ri(ShiftOp::Shr, sf, Reg::Rax, immr as u8);
                    }

                    let width = imms - immr + 1;

                    if width < ds {
                        self.emit_and_mask(sf, Reg::Rax, (1u64 << width) - 1);
                    }
                } else {
                    // Deposit rn[imms:0] at ds - immr (LSL, UBFIZ).
                    let width = imms + 1;
                    let pos = ds - immr;

                    if width < ds {
                        self.emit_and_mask(sf, Reg::Rax, (1u64 << width) - 1);
                    }

                    self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rax, pos as u8);
                }

                if !sf {
                    // The full-width no-shift case performs no 32-bit write of its own.
                    self.e.mov_rr(false, Reg::Rax, Reg::Rax);
                }

                self.store_gp(rd, Reg::Rax, false);
            }
            BitfieldKind::Sbfm => {
                if imms >= immr {
                    // Arithmetic extract (ASR, SBFX, SXTB, SXTH, SXTW).
                    let left = ds - 1 - imms;

                    if left > 0 {
                        self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rax, left as u8);
                    }

                    self.e.shift_ri(ShiftOp::Sar, sf, Reg::Rax, (left + immr) as u8);
                } else {
                    // Sign-extended deposit (SBFIZ).
                    let left = ds - 1 - imms;
                    let pos = ds - immr;

                    if left > 0 {
                        self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rax, left as u8);
                        self.e.shift_ri(ShiftOp::Sar, sf, Reg::Rax, left as u8);
                    }

                    self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rax, pos as u8);
                }

                if !sf {
                    self.e.mov_rr(false, Reg::Rax, Reg::Rax);
                }

                self.store_gp(rd, Reg::Rax, false);
            }
            BitfieldKind::Bfm => {
                if imms >= immr {
                    // BFXIL: copy rn[imms:immr] into rd[width-1:0], keeping the rest of rd.
                    let width = imms - immr + 1;
                    let mask = if width == ds { u64::MAX } else { (1u64 << width) - 1 };

                    if immr > 0 {
                        self.e.shift_ri(ShiftOp::Shr, sf, Reg::Rax, immr as u8);
                    }

                    self.emit_and_mask(sf, Reg::Rax, mask);
                    self.load_gp(Reg::Rdx, rd, false);
                    self.e.mov_ri64(Reg::Rcx, !mask);
                    self.e.alu_rr(AluOp::And, sf, Reg::Rdx, Reg::Rcx);
                    self.e.alu_rr(AluOp::Or, sf, Reg::Rax, Reg::Rdx);
                } else {
                    // BFI: copy rn[imms:0] into rd at ds - immr.
                    let width = imms + 1;
                    let pos = ds - immr;
                    let mask = (1u64 << width) - 1;

                    self.emit_and_mask(sf, Reg::Rax, mask);
                    self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rax, pos as u8);
                    self.load_gp(Reg::Rdx, rd, false);
                    self.e.mov_ri64(Reg::Rcx, !(mask << pos));
                    self.e.alu_rr(AluOp::And, sf, Reg::Rdx, Reg::Rcx);
                    self.e.alu_rr(AluOp::Or, sf, Reg::Rax, Reg::Rdx);
                }

                self.store_gp(rd, Reg::Rax, false);
            }
        }

        self.flags_live = false;
    }

    pub(super) fn emit_extract(&mut self, sf: bool, rd: u8, rn: u8, rm: u8, lsb: u8) {
        let ds = if sf { 64 } else { 32 };

        self.load_gp(Reg::Rax, rm, false);

        if lsb > 0 {
            self.e.shift_ri(ShiftOp::Shr, sf, Reg::Rax, lsb);
            self.load_gp(Reg::Rcx, rn, false);
            self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rcx, ds - lsb);
            self.e.alu_rr(AluOp::Or, sf, Reg::Rax, Reg::Rcx);
        } else if !sf {
            self.e.mov_rr(false, Reg::Rax, Reg::Rax);
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_var_shift(&mut self, op: ShiftKind, sf: bool, rd: u8, rn: u8, rm: u8) {
        self.load_gp(Reg::Rax, rn, false);
        self.load_gp(Reg::Rcx, rm, false);
        // Hardware masks CL by the operand size, matching the A64 modulo-datasize rule.
        self.e.shift_rc(shift_op(op), sf, Reg::Rax);

        if !sf {
            // A shift count of zero does not write the register, so the 64-bit load's upper
            // half would otherwise survive.
            self.e.mov_rr(false, Reg::Rax, Reg::Rax);
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_unary(&mut self, op: UnaryOp, sf: bool, rd: u8, rn: u8) {
        let ds = if sf { 64u32 } else { 32 };

        match op {
            UnaryOp::Clz => {
                self.load_gp(Reg::Rcx, rn, false);
                self.e.mov_ri32(Reg::Rdx, 2 * ds - 1);
                self.e.bsr_rr(sf, Reg::Rax, Reg::Rcx);
                self.e.cmovcc(Cc::E, sf, Reg::Rax, Reg::Rdx);
                self.e.alu_ri(AluOp::Xor, sf, Reg::Rax, (ds - 1) as i32);
            }
            UnaryOp::Cls => {
                // CLS(x) = CLZ(x ^ (x >> 1)) - 1.
                self.load_gp(Reg::Rcx, rn, false);
                self.e.mov_rr(sf, Reg::Rax, Reg::Rcx);
                self.e.shift_ri(ShiftOp::Sar, sf, Reg::Rax, 1);
                self.e.alu_rr(AluOp::Xor, sf, Reg::Rax, Reg::Rcx);
                self.e.mov_ri32(Reg::Rdx, 2 * ds - 1);
                self.e.bsr_rr(sf, Reg::Rcx, Reg::Rax);
                self.e.cmovcc(Cc::E, sf, Reg::Rcx, Reg::Rdx);
                self.e.alu_ri(AluOp::Xor, sf, Reg::Rcx, (ds - 1) as i32);
                self.e.alu_ri(AluOp::Sub, sf, Reg::Rcx, 1);
                self.e.mov_rr(sf, Reg::Rax, Reg::Rcx);
            }
            UnaryOp::Rbit => {
                self.load_gp(Reg::Rax, rn, false);
                self.emit_bit_reverse(sf);
            }
            UnaryOp::Rev16 => {
                self.load_gp(Reg::Rax, rn, false);
                self.emit_byte_swap_step(sf, 8, if sf { 0x00ff_00ff_00ff_00ff } else { 0x00ff_00ff });
            }
            UnaryOp::Rev32 => {
                self.load_gp(Reg::Rax, rn, false);

                if sf {
                    // Byte-reverse each 32-bit half: full bswap then swap the halves back.
                    self.e.bswap_r(true, Reg::Rax);
                    self.e.shift_ri(ShiftOp::Ror, true, Reg::Rax, 32);
                } else {
                    self.e.bswap_r(false, Reg::Rax);
                }
            }
            UnaryOp::Rev64 => {
                self.load_gp(Reg::Rax, rn, false);
                self.e.bswap_r(true, Reg::Rax);
            }
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    /// One swap step of the bit/byte reversal ladders:
    /// `rax = ((rax >> k) & mask) | ((rax & mask) << k)`.
    fn emit_byte_swap_step(&mut self, sf: bool, k: u8, mask: u64) {
        self.e.mov_rr(sf, Reg::Rcx, Reg::Rax);
        self.e.shift_ri(ShiftOp::Shr, sf, Reg::Rax, k);

        if sf {
            self.e.mov_ri64(Reg::Rdx, mask);
            self.e.alu_rr(AluOp::And, true, Reg::Rax, Reg::Rdx);
            self.e.alu_rr(AluOp::And, true, Reg::Rcx, Reg::Rdx);
        } else {
            self.e.alu_ri(AluOp::And, false, Reg::Rax, mask as u32 as i32);
            self.e.alu_ri(AluOp::And, false, Reg::Rcx, mask as u32 as i32);
        }

        self.e.shift_ri(ShiftOp::Shl, sf, Reg::Rcx, k);
        self.e.alu_rr(AluOp::Or, sf, Reg::Rax, Reg::Rcx);
    }

    /// Full bit reversal of RAX: nibble, pair, and single-bit swaps, then a byte swap.
    fn emit_bit_reverse(&mut self, sf: bool) {
        let masks: [(u8, u64); 3] = [
            (4, 0x0f0f_0f0f_0f0f_0f0f),
            (2, 0x3333_3333_3333_3333),
            (1, 0x5555_5555_5555_5555),
        ];

        for (k, mask) in masks {
            let mask = if sf { mask } else { mask & 0xffff_ffff };
            self.emit_byte_swap_step(sf, k, mask);
        }

        self.e.bswap_r(sf, Reg::Rax);
    }

    pub(super) fn emit_mul(&mut self, op: MulOp, sf: bool, rd: u8, rn: u8, rm: u8, ra: u8) {
        match op {
            MulOp::Madd | MulOp::Msub => {
                self.load_gp(Reg::Rax, rn, false);
                self.load_gp(Reg::Rcx, rm, false);
                self.e.imul_rr(sf, Reg::Rax, Reg::Rcx);
                self.load_gp(Reg::Rcx, ra, false);

                if op == MulOp::Msub {
                    self.e.alu_rr(AluOp::Sub, sf, Reg::Rcx, Reg::Rax);
                    self.e.mov_rr(sf, Reg::Rax, Reg::Rcx);
                } else {
                    self.e.alu_rr(AluOp::Add, sf, Reg::Rax, Reg::Rcx);
                }
            }
            MulOp::Smaddl | MulOp::Smsubl | MulOp::Umaddl | MulOp::Umsubl => {
                let signed = matches!(op, MulOp::Smaddl | MulOp::Smsubl);
                let negate = matches!(op, MulOp::Smsubl | MulOp::Umsubl);

                self.load_gp32(Reg::Rax, rn, signed);
                self.load_gp32(Reg::Rcx, rm, signed);
                self.e.imul_rr(true, Reg::Rax, Reg::Rcx);
                self.load_gp(Reg::Rcx, ra, false);

                if negate {
                    self.e.alu_rr(AluOp::Sub, true, Reg::Rcx, Reg::Rax);
                    self.e.mov_rr(true, Reg::Rax, Reg::Rcx);
                } else {
                    self.e.alu_rr(AluOp::Add, true, Reg::Rax, Reg::Rcx);
                }
            }
            MulOp::Smulh | MulOp::Umulh => {
                self.load_gp(Reg::Rax, rn, false);
                self.load_gp(Reg::Rcx, rm, false);

                if op == MulOp::Smulh {
                    self.e.imul_r(true, Reg::Rcx);
                } else {
                    self.e.mul_r(true, Reg::Rcx);
                }

                self.e.mov_rr(true, Reg::Rax, Reg::Rdx);
            }
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    /// Loads the low 32 bits of a register, sign- or zero-extended to 64.
    fn load_gp32(&mut self, dst: Reg, idx: u8, signed: bool) {
        if idx == 31 {
            self.e.mov_ri32(dst, 0);
        } else if signed {
            self.e.movsx32_load(dst, Reg::R15, GuestContext::x_offset(idx));
        } else {
            self.e.mov_load(false, dst, Reg::R15, GuestContext::x_offset(idx));
        }
    }

    pub(super) fn emit_div(&mut self, sf: bool, signed: bool, rd: u8, rn: u8, rm: u8) {
        self.load_gp(Reg::Rcx, rm, false);
        self.load_gp(Reg::Rax, rn, false);

        // Division by zero yields zero on the guest, and the host instruction would fault; the
        // signed INT_MIN / -1 overflow is defined as INT_MIN, which -rn covers for every rn.
        self.e.test_rr(sf, Reg::Rcx, Reg::Rcx);
        let zero = self.e.jcc(Cc::E);

        let mut done_sites = Vec::new();

        if signed {
            self.e.alu_ri(AluOp::Cmp, sf, Reg::Rcx, -1);
            let divide = self.e.jcc(Cc::Ne);
            self.e.neg_r(sf, Reg::Rax);
            done_sites.push(self.e.jmp());

            let here = self.e.offset();
            self.e.patch_rel32(divide, here);
            self.e.cqo(sf);
            self.e.idiv_r(sf, Reg::Rcx);
            done_sites.push(self.e.jmp());
        } else {
            self.e.mov_ri32(Reg::Rdx, 0);
            self.e.div_r(sf, Reg::Rcx);
            done_sites.push(self.e.jmp());
        }

        let here = self.e.offset();
        self.e.patch_rel32(zero, here);
        self.e.mov_ri32(Reg::Rax, 0);

        let end = self.e.offset();

        for site in done_sites {
            self.e.patch_rel32(site, end);
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_crc32c(&mut self, size: u8, rd: u8, rn: u8, rm: u8) {
        self.load_gp(Reg::Rax, rn, false);
        self.load_gp(Reg::Rcx, rm, false);

        match size {
            1 => self.e.crc32_rr8(Reg::Rax, Reg::Rcx),
            2 => self.e.crc32_rr16(Reg::Rax, Reg::Rcx),
            4 => self.e.crc32_rr(false, Reg::Rax, Reg::Rcx),
            _ => self.e.crc32_rr(true, Reg::Rax, Reg::Rcx),
        }

        // The accumulator is architecturally 32-bit.
        self.e.mov_rr(false, Reg::Rax, Reg::Rax);
        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_cond_select(
        &mut self,
        kind: CselKind,
        sf: bool,
        rd: u8,
        rn: u8,
        rm: u8,
        cond: Cond,
    ) {
        // For the conditional data-processing group, 1111 behaves as "always", like 1110.
        let cond = if cond == Cond::Nv { Cond::Al } else { cond };
        let taken = self.emit_branch_cond(cond);

        // Condition false: rm with the kind's modifier applied.
        self.load_gp(Reg::Rax, rm, false);

        match kind {
            CselKind::Csel => {}
            CselKind::Csinc => self.e.alu_ri(AluOp::Add, sf, Reg::Rax, 1),
            CselKind::Csinv => self.e.not_r(sf, Reg::Rax),
            CselKind::Csneg => self.e.neg_r(sf, Reg::Rax),
        }

        let done = self.e.jmp();

        let here = self.e.offset();
        self.e.patch_rel32(taken, here);
        self.load_gp(Reg::Rax, rn, false);

        let end = self.e.offset();
        self.e.patch_rel32(done, end);

        if !sf {
            self.e.mov_rr(false, Reg::Rax, Reg::Rax);
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_cond_compare(
        &mut self,
        sf: bool,
        sub: bool,
        rn: u8,
        imm: bool,
        rm_or_imm: u8,
        cond: Cond,
        nzcv: u8,
    ) {
        let cond = if cond == Cond::Nv { Cond::Al } else { cond };
        let taken = self.emit_branch_cond(cond);

        // Condition false: the flags become the immediate.
        self.e.mov_store_imm32(
            Reg::R15,
            GuestContext::NZCV_OFFSET,
            u32::from(nzcv) << 28,
        );
        let done = self.e.jmp();

        let here = self.e.offset();
        self.e.patch_rel32(taken, here);

        self.load_gp(Reg::Rax, rn, false);

        if imm {
            self.e.mov_ri32(Reg::Rcx, u32::from(rm_or_imm));
        } else {
            self.load_gp(Reg::Rcx, rm_or_imm, false);
        }

        if sub {
            self.e.alu_rr(AluOp::Cmp, sf, Reg::Rax, Reg::Rcx);
        } else {
            self.e.alu_rr(AluOp::Add, sf, Reg::Rax, Reg::Rcx);
            self.e.cmc();
        }

        self.save_nzcv();

        let end = self.e.offset();
        self.e.patch_rel32(done, end);

        // The two paths merge with host EFLAGS in different states; only the stored NZCV is
        // authoritative from here.
        self.flags_live = false;
    }
}
