//! NEON translators. Guest vector registers live in the context record; every handler stages
//! through host XMM scratch registers (XMM0–XMM4), picks the packed SSE mnemonic for the
//! element size, and writes the result back. A 64-bit (`Q = 0`) destination is narrowed with a
//! register `movq`, which zero-extends the upper half as the architecture requires.
//!
//! Unsigned compares have no packed x86 form: the translators flip each element's sign bit and
//! use the signed compare. De-interleaving structure loads and stores (LD2–LD4/ST2–ST4) move
//! elements one at a time with `PINSR`/`PEXTR` memory operands, which needs no lane-table
//! constants.

use super::Translator;
use crate::decode::{VecFloatOp, VecOp};
use crate::guest::GuestContext;
use crate::x86::sse::Xmm;
use crate::x86::{AluOp, Reg};

fn sign_pattern(esize: u8) -> u64 {
    match esize {
        1 => 0x8080_8080_8080_8080,
        2 => 0x8000_8000_8000_8000,
        4 => 0x8000_0000_8000_0000,
        _ => 0x8000_0000_0000_0000,
    }
}

impl Translator<'_, '_> {
    fn vload(&mut self, x: Xmm, vreg: u8) {
        self.e.movdqu_load(x, Reg::R15, GuestContext::v_offset(vreg));
    }

    fn vstore(&mut self, vreg: u8, x: Xmm, q: bool) {
        if !q {
            self.e.movq_xx(x, x);
        }

        self.e.movdqu_store(Reg::R15, GuestContext::v_offset(vreg), x);
    }

    /// Broadcasts `sign_pattern(esize)` into `x`.
    fn emit_sign_mask(&mut self, x: Xmm, esize: u8) {
        self.e.mov_ri64(Reg::Rax, sign_pattern(esize));
        self.e.movq_xr(x, Reg::Rax);
        self.e.punpcklqdq(x, x);
    }

    pub(super) fn emit_vec_rrr(&mut self, op: VecOp, esize: u8, q: bool, rd: u8, rn: u8, rm: u8) {
        match op {
            VecOp::Add => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.padd(esize, Xmm(0), Xmm(1));
            }
            VecOp::Sub => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.psub(esize, Xmm(0), Xmm(1));
            }
            VecOp::And => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.pand(Xmm(0), Xmm(1));
            }
            VecOp::Orr => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.por(Xmm(0), Xmm(1));
            }
            VecOp::Eor => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.pxor(Xmm(0), Xmm(1));
            }
            VecOp::Bic => {
                // PANDN computes !dst & src, so the mask goes in the destination.
                self.vload(Xmm(0), rm);
                self.vload(Xmm(1), rn);
                self.e.pandn(Xmm(0), Xmm(1));
            }
            VecOp::Orn => {
                self.vload(Xmm(0), rm);
                self.vload(Xmm(1), rn);
                self.e.pcmpeq(1, Xmm(2), Xmm(2));
                self.e.pxor(Xmm(0), Xmm(2));
                self.e.por(Xmm(0), Xmm(1));
            }
            VecOp::Bsl => {
                // vd = (vd & vn) | (!vd & vm).
                self.vload(Xmm(0), rd);
                self.vload(Xmm(1), rn);
                self.vload(Xmm(2), rm);
                self.e.movdqa_rr(Xmm(3), Xmm(0));
                self.e.pand(Xmm(3), Xmm(1));
                self.e.pandn(Xmm(0), Xmm(2));
                self.e.por(Xmm(0), Xmm(3));
            }
            VecOp::Bit => {
                // vd = (vm & vn) | (!vm & vd).
                self.vload(Xmm(0), rm);
                self.vload(Xmm(1), rn);
                self.vload(Xmm(2), rd);
                self.e.movdqa_rr(Xmm(3), Xmm(0));
                self.e.pand(Xmm(3), Xmm(1));
                self.e.pandn(Xmm(0), Xmm(2));
                self.e.por(Xmm(0), Xmm(3));
            }
            VecOp::Bif => {
                // vd = (vm & vd) | (!vm & vn).
                self.vload(Xmm(0), rm);
                self.vload(Xmm(1), rd);
                self.vload(Xmm(2), rn);
                self.e.movdqa_rr(Xmm(3), Xmm(0));
                self.e.pand(Xmm(3), Xmm(1));
                self.e.pandn(Xmm(0), Xmm(2));
                self.e.por(Xmm(0), Xmm(3));
            }
            VecOp::Cmeq => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.pcmpeq(esize, Xmm(0), Xmm(1));
            }
            VecOp::Cmgt => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.pcmpgt(esize, Xmm(0), Xmm(1));
            }
            VecOp::Cmge => {
                // a >= b is (a > b) | (a == b).
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.movdqa_rr(Xmm(2), Xmm(0));
                self.e.pcmpgt(esize, Xmm(2), Xmm(1));
                self.e.pcmpeq(esize, Xmm(0), Xmm(1));
                self.e.por(Xmm(0), Xmm(2));
            }
            VecOp::Cmhi => {
                // Bias both sides by the sign bit, then compare signed.
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.emit_sign_mask(Xmm(3), esize);
                self.e.pxor(Xmm(0), Xmm(3));
                self.e.pxor(Xmm(1), Xmm(3));
                self.e.pcmpgt(esize, Xmm(0), Xmm(1));
            }
            VecOp::Cmhs => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.emit_sign_mask(Xmm(3), esize);
                self.e.movdqa_rr(Xmm(2), Xmm(0));
                self.e.movdqa_rr(Xmm(4), Xmm(1));
                self.e.pxor(Xmm(2), Xmm(3));
                self.e.pxor(Xmm(4), Xmm(3));
                self.e.pcmpgt(esize, Xmm(2), Xmm(4));
                self.e.pcmpeq(esize, Xmm(0), Xmm(1));
                self.e.por(Xmm(0), Xmm(2));
            }
            VecOp::Cmtst => {
                // (vn & vm) != 0 per element.
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.pand(Xmm(0), Xmm(1));
                self.e.pxor(Xmm(2), Xmm(2));
                self.e.pcmpeq(esize, Xmm(0), Xmm(2));
                self.e.pcmpeq(1, Xmm(2), Xmm(2));
                self.e.pxor(Xmm(0), Xmm(2));
            }
            VecOp::Mul => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);

                match esize {
                    2 => self.e.pmullw(Xmm(0), Xmm(1)),
                    4 => self.e.pmulld(Xmm(0), Xmm(1)),
                    _ => self.emit_byte_mul(),
                }
            }
        }

        self.vstore(rd, Xmm(0), q);
        self.flags_live = false;
    }

    /// Packed 8-bit low multiply of XMM0 by XMM1 via odd/even 16-bit multiplies.
    fn emit_byte_mul(&mut self) {
        self.e.movdqa_rr(Xmm(2), Xmm(0));
        self.e.movdqa_rr(Xmm(3), Xmm(1));
        self.e.psrl_i(2, Xmm(2), 8);
        self.e.psrl_i(2, Xmm(3), 8);
        self.e.pmullw(Xmm(2), Xmm(3));
        self.e.psll_i(2, Xmm(2), 8);
        self.e.pmullw(Xmm(0), Xmm(1));
        // 0x00ff per word masks the even products back to their bytes.
        self.e.pcmpeq(1, Xmm(3), Xmm(3));
        self.e.psrl_i(2, Xmm(3), 8);
        self.e.pand(Xmm(0), Xmm(3));
        self.e.por(Xmm(0), Xmm(2));
    }

    pub(super) fn emit_vec_float_rrr(
        &mut self,
        op: VecFloatOp,
        double: bool,
        q: bool,
        rd: u8,
        rn: u8,
        rm: u8,
    ) {
        match op {
            VecFloatOp::Fadd | VecFloatOp::Fsub | VecFloatOp::Fmul | VecFloatOp::Fdiv => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);

                match op {
                    VecFloatOp::Fadd => self.e.addp(double, Xmm(0), Xmm(1)),
                    VecFloatOp::Fsub => self.e.subp(double, Xmm(0), Xmm(1)),
                    VecFloatOp::Fmul => self.e.mulp(double, Xmm(0), Xmm(1)),
                    _ => self.e.divp(double, Xmm(0), Xmm(1)),
                }
            }
            VecFloatOp::Fcmeq => {
                self.vload(Xmm(0), rn);
                self.vload(Xmm(1), rm);
                self.e.cmpp(double, Xmm(0), Xmm(1), 0);
            }
            VecFloatOp::Fcmge | VecFloatOp::Fcmgt => {
                // Only LT/LE predicates exist; swap the operands.
                self.vload(Xmm(0), rm);
                self.vload(Xmm(1), rn);
                let predicate = if op == VecFloatOp::Fcmge { 2 } else { 1 };
                self.e.cmpp(double, Xmm(0), Xmm(1), predicate);
            }
        }

        self.vstore(rd, Xmm(0), q);
        self.flags_live = false;
    }

    pub(super) fn emit_vec_multi(
        &mut self,
        load: bool,
        regs: u8,
        interleave: u8,
        esize: u8,
        q: bool,
        rt: u8,
        rn: u8,
        post: Option<u8>,
    ) {
        let reg_bytes: i32 = if q { 16 } else { 8 };

        self.load_gp(Reg::Rax, rn, true);

        if interleave == 1 {
            // LD1/ST1: consecutive registers from consecutive memory.
            for r in 0..regs {
                let vreg = (rt + r) % 32;
                let disp = i32::from(r) * reg_bytes;

                if load {
                    self.emit_load_reg(true, reg_bytes as u8, false, true, vreg, Reg::Rax, disp);
                } else {
                    self.emit_store_reg(true, reg_bytes as u8, vreg, Reg::Rax, disp);
                }
            }
        } else {
            // LDn/STn: element r of structure l lives at (l * n + r) * esize.
            let lanes = reg_bytes as u8 / esize;

            if load {
                for r in 0..regs {
                    self.e.pxor(Xmm(r), Xmm(r));

                    for lane in 0..lanes {
                        let disp = i32::from(lane * interleave + r) * i32::from(esize);
                        self.e.pinsr_mem(esize, Xmm(r), Reg::Rax, disp, lane);
                    }
                }

                for r in 0..regs {
                    let vreg = (rt + r) % 32;
                    self.e
                        .movdqu_store(Reg::R15, GuestContext::v_offset(vreg), Xmm(r));
                }
            } else {
                for r in 0..regs {
                    self.vload(Xmm(r), (rt + r) % 32);
                }

                for r in 0..regs {
                    for lane in 0..lanes {
                        let disp = i32::from(lane * interleave + r) * i32::from(esize);
                        self.e.pextr_mem(esize, Reg::Rax, disp, Xmm(r), lane);
                    }
                }
            }
        }

        if let Some(rm) = post {
            self.load_gp(Reg::Rcx, rn, true);

            if rm == 31 {
                self.add_imm_to(Reg::Rcx, i64::from(reg_bytes) * i64::from(regs));
            } else {
                self.load_gp(Reg::Rdx, rm, false);
                self.e.alu_rr(AluOp::Add, true, Reg::Rcx, Reg::Rdx);
            }

            self.store_gp(rn, Reg::Rcx, true);
        }

        self.flags_live = false;
    }

    pub(super) fn emit_vec_mov_imm(&mut self, q: bool, rd: u8, imm: u64) {
        self.e.mov_ri64(Reg::Rax, imm);
        self.e.movq_xr(Xmm(0), Reg::Rax);

        if q {
            self.e.punpcklqdq(Xmm(0), Xmm(0));
        }

        self.e.movdqu_store(Reg::R15, GuestContext::v_offset(rd), Xmm(0));
        self.flags_live = false;
    }

    /// Broadcasts the element in RAX across XMM0 and retires it to `rd`.
    fn emit_broadcast_rax(&mut self, esize: u8, q: bool, rd: u8) {
        match esize {
            1 => {
                self.e.movd_xr(Xmm(0), Reg::Rax);
                self.e.punpcklbw(Xmm(0), Xmm(0));
                self.e.punpcklwd(Xmm(0), Xmm(0));
                self.e.pshufd(Xmm(0), Xmm(0), 0);
            }
            2 => {
                self.e.movd_xr(Xmm(0), Reg::Rax);
                self.e.punpcklwd(Xmm(0), Xmm(0));
                self.e.pshufd(Xmm(0), Xmm(0), 0);
            }
            4 => {
                self.e.movd_xr(Xmm(0), Reg::Rax);
                self.e.pshufd(Xmm(0), Xmm(0), 0);
            }
            _ => {
                self.e.movq_xr(Xmm(0), Reg::Rax);
                self.e.punpcklqdq(Xmm(0), Xmm(0));
            }
        }

        self.vstore(rd, Xmm(0), q);
    }

    pub(super) fn emit_vec_dup(&mut self, esize: u8, q: bool, rd: u8, rn: u8) {
        self.load_gp(Reg::Rax, rn, false);
        self.emit_broadcast_rax(esize, q, rd);
        self.flags_live = false;
    }

    pub(super) fn emit_vec_dup_elem(&mut self, esize: u8, q: bool, rd: u8, rn: u8, index: u8) {
        self.vload(Xmm(1), rn);
        self.e.pextr_r(esize, Reg::Rax, Xmm(1), index);
        self.emit_broadcast_rax(esize, q, rd);
        self.flags_live = false;
    }

    pub(super) fn emit_vec_ins_general(&mut self, esize: u8, rd: u8, index: u8, rn: u8) {
        self.vload(Xmm(0), rd);
        self.load_gp(Reg::Rax, rn, false);
        self.e.pinsr_r(esize, Xmm(0), Reg::Rax, index);
        self.e.movdqu_store(Reg::R15, GuestContext::v_offset(rd), Xmm(0));
        self.flags_live = false;
    }

    pub(super) fn emit_vec_ins_elem(&mut self, esize: u8, rd: u8, dst: u8, rn: u8, src: u8) {
        self.vload(Xmm(0), rn);
        self.e.pextr_r(esize, Reg::Rax, Xmm(0), src);
        self.vload(Xmm(1), rd);
        self.e.pinsr_r(esize, Xmm(1), Reg::Rax, dst);
        self.e.movdqu_store(Reg::R15, GuestContext::v_offset(rd), Xmm(1));
        self.flags_live = false;
    }

    pub(super) fn emit_vec_mov_to_general(
        &mut self,
        esize: u8,
        signed: bool,
        sf: bool,
        rd: u8,
        rn: u8,
        index: u8,
    ) {
        self.vload(Xmm(0), rn);
        self.e.pextr_r(esize, Reg::Rax, Xmm(0), index);

        if signed {
            match esize {
                1 => self.e.movsx8_rr(sf, Reg::Rax, Reg::Rax),
                2 => self.e.movsx16_rr(sf, Reg::Rax, Reg::Rax),
                4 if sf => self.e.movsx32_rr(Reg::Rax, Reg::Rax),
                _ => {}
            }
        }

        self.store_gp(rd, Reg::Rax, false);
        self.flags_live = false;
    }

    pub(super) fn emit_fmov_general(&mut self, to_vec: bool, double: bool, rd: u8, rn: u8) {
        if to_vec {
            self.load_gp(Reg::Rax, rn, false);

            if double {
                self.e.movq_xr(Xmm(0), Reg::Rax);
            } else {
                self.e.movd_xr(Xmm(0), Reg::Rax);
            }

            self.e.movdqu_store(Reg::R15, GuestContext::v_offset(rd), Xmm(0));
        } else {
            let voff = GuestContext::v_offset(rn);

            self.e.mov_load(double, Reg::Rax, Reg::R15, voff);
            self.store_gp(rd, Reg::Rax, false);
        }

        self.flags_live = false;
    }
}
