//! SSE2/SSSE3/SSE4 encoders for the packed integer and packed float operations the NEON
//! translators map onto. Same conventions as the parent module: one instruction per call,
//! `[base + disp32]` memory operands, no operand validation beyond the register types.

use super::{Emitter, Reg};

/// An XMM register, 0–15.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Xmm(pub u8);

impl Xmm {
    #[inline]
    fn low3(self) -> u8 {
        self.0 & 7
    }

    #[inline]
    fn is_extended(self) -> bool {
        self.0 >= 8
    }
}

/// Mandatory prefix group for the SSE opcode maps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Prefix {
    None,
    P66,
    PF2,
    PF3,
}

impl<'a, 'b> Emitter<'a, 'b> {
    fn sse_start(&mut self, prefix: Prefix, w: bool, reg_ext: bool, rm_ext: bool) {
        match prefix {
            Prefix::None => {}
            Prefix::P66 => self.u8(0x66),
            Prefix::PF2 => self.u8(0xf2),
            Prefix::PF3 => self.u8(0xf3),
        }

        self.rex(w, reg_ext, false, rm_ext, false);
        self.u8(0x0f);
    }

    /// `prefix [REX] 0F op /r` with a register-register ModRM.
    fn sse_rr(&mut self, prefix: Prefix, op: &[u8], dst: Xmm, src: Xmm) {
        self.sse_start(prefix, false, dst.is_extended(), src.is_extended());

        for &byte in op {
            self.u8(byte);
        }

        self.u8(0xc0 | dst.low3() << 3 | src.low3());
    }

    /// `prefix [REX] 0F op /r` with a `[base + disp32]` ModRM.
    fn sse_rm(&mut self, prefix: Prefix, op: &[u8], reg: Xmm, base: Reg, disp: i32) {
        self.sse_start(prefix, false, reg.is_extended(), base.is_extended());

        for &byte in op {
            self.u8(byte);
        }

        self.modrm_mem(reg.0, base, disp);
    }

    // ── Whole-register moves ──

    /// `movdqu dst, [base + disp]`.
    pub fn movdqu_load(&mut self, dst: Xmm, base: Reg, disp: i32) {
        self.sse_rm(Prefix::PF3, &[0x6f], dst, base, disp);
    }

    /// `movdqu [base + disp], src`.
    pub fn movdqu_store(&mut self, base: Reg, disp: i32, src: Xmm) {
        self.sse_rm(Prefix::PF3, &[0x7f], src, base, disp);
    }

    /// `movdqa dst, src`.
    pub fn movdqa_rr(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x6f], dst, src);
    }

    /// `movaps dst, src`.
    pub fn movaps_rr(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::None, &[0x28], dst, src);
    }

    /// `movq dst, src` between XMM registers; zero-extends into the upper half.
    pub fn movq_xx(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::PF3, &[0x7e], dst, src);
    }

    /// `movapd dst, src`.
    pub fn movapd_rr(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x28], dst, src);
    }

    /// `movq dst_xmm, src_gpr` (64-bit general to vector).
    pub fn movq_xr(&mut self, dst: Xmm, src: Reg) {
        self.u8(0x66);
        self.rex(true, dst.is_extended(), false, src.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x6e);
        self.u8(0xc0 | dst.low3() << 3 | (src.index() & 7));
    }

    /// `movq dst_gpr, src_xmm` (vector low half to general).
    pub fn movq_rx(&mut self, dst: Reg, src: Xmm) {
        self.u8(0x66);
        self.rex(true, src.is_extended(), false, dst.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x7e);
        self.u8(0xc0 | src.low3() << 3 | (dst.index() & 7));
    }

    /// `movd dst_xmm, src_gpr32`.
    pub fn movd_xr(&mut self, dst: Xmm, src: Reg) {
        self.u8(0x66);
        self.rex(false, dst.is_extended(), false, src.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x6e);
        self.u8(0xc0 | dst.low3() << 3 | (src.index() & 7));
    }

    /// `movd dst_gpr32, src_xmm`.
    pub fn movd_rx(&mut self, dst: Reg, src: Xmm) {
        self.u8(0x66);
        self.rex(false, src.is_extended(), false, dst.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x7e);
        self.u8(0xc0 | src.low3() << 3 | (dst.index() & 7));
    }

    // ── Packed integer arithmetic ──

    /// `padd{b,w,d,q} dst, src` selected by the element size in bytes.
    pub fn padd(&mut self, esize: u8, dst: Xmm, src: Xmm) {
        let op = match esize {
            1 => 0xfc,
            2 => 0xfd,
            4 => 0xfe,
            8 => 0xd4,
            _ => unreachable!("invalid element size"),
        };

        self.sse_rr(Prefix::P66, &[op], dst, src);
    }

    /// `psub{b,w,d,q} dst, src`.
    pub fn psub(&mut self, esize: u8, dst: Xmm, src: Xmm) {
        let op = match esize {
            1 => 0xf8,
            2 => 0xf9,
            4 => 0xfa,
            8 => 0xfb,
            _ => unreachable!("invalid element size"),
        };

        self.sse_rr(Prefix::P66, &[op], dst, src);
    }

    /// `pand dst, src`.
    pub fn pand(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xdb], dst, src);
    }

    /// `pandn dst, src` (`dst = !dst & src`).
    pub fn pandn(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xdf], dst, src);
    }

    /// `por dst, src`.
    pub fn por(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xeb], dst, src);
    }

    /// `pxor dst, src`.
    pub fn pxor(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xef], dst, src);
    }

    /// `pmullw dst, src` (16-bit low multiply).
    pub fn pmullw(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xd5], dst, src);
    }

    /// `pmulld dst, src` (SSE4.1 32-bit low multiply).
    pub fn pmulld(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x38, 0x40], dst, src);
    }

    /// `pmulhw dst, src` (signed 16-bit high multiply).
    pub fn pmulhw(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xe5], dst, src);
    }

    /// `pmulhuw dst, src` (unsigned 16-bit high multiply).
    pub fn pmulhuw(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0xe4], dst, src);
    }

    // ── Packed integer compares ──

    /// `pcmpeq{b,w,d,q} dst, src`; the qword form is SSE4.1.
    pub fn pcmpeq(&mut self, esize: u8, dst: Xmm, src: Xmm) {
        match esize {
            1 => self.sse_rr(Prefix::P66, &[0x74], dst, src),
            2 => self.sse_rr(Prefix::P66, &[0x75], dst, src),
            4 => self.sse_rr(Prefix::P66, &[0x76], dst, src),
            8 => self.sse_rr(Prefix::P66, &[0x38, 0x29], dst, src),
            _ => unreachable!("invalid element size"),
        }
    }

    /// `pcmpgt{b,w,d,q} dst, src` (signed); the qword form is SSE4.2.
    pub fn pcmpgt(&mut self, esize: u8, dst: Xmm, src: Xmm) {
        match esize {
            1 => self.sse_rr(Prefix::P66, &[0x64], dst, src),
            2 => self.sse_rr(Prefix::P66, &[0x65], dst, src),
            4 => self.sse_rr(Prefix::P66, &[0x66], dst, src),
            8 => self.sse_rr(Prefix::P66, &[0x38, 0x37], dst, src),
            _ => unreachable!("invalid element size"),
        }
    }

    // ── Shuffles and lane moves ──

    /// `pshufd dst, src, order`.
    pub fn pshufd(&mut self, dst: Xmm, src: Xmm, order: u8) {
        self.sse_rr(Prefix::P66, &[0x70], dst, src);
        self.u8(order);
    }

    /// `pshufb dst, src` (SSSE3 byte shuffle).
    pub fn pshufb(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x38, 0x00], dst, src);
    }

    /// `punpcklbw dst, src`.
    pub fn punpcklbw(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x60], dst, src);
    }

    /// `punpckhbw dst, src`.
    pub fn punpckhbw(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x68], dst, src);
    }

    /// `punpcklwd dst, src`.
    pub fn punpcklwd(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x61], dst, src);
    }

    /// `punpcklqdq dst, src`.
    pub fn punpcklqdq(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x6c], dst, src);
    }

    /// `packuswb dst, src`.
    pub fn packuswb(&mut self, dst: Xmm, src: Xmm) {
        self.sse_rr(Prefix::P66, &[0x67], dst, src);
    }

    /// `pinsr{b,w,d,q} dst, [base + disp], lane`.
    pub fn pinsr_mem(&mut self, esize: u8, dst: Xmm, base: Reg, disp: i32, lane: u8) {
        match esize {
            1 => {
                self.u8(0x66);
                self.rex(false, dst.is_extended(), false, base.is_extended(), false);
                self.u8(0x0f);
                self.u8(0x3a);
                self.u8(0x20);
                self.modrm_mem(dst.0, base, disp);
            }
            2 => {
                self.u8(0x66);
                self.rex(false, dst.is_extended(), false, base.is_extended(), false);
                self.u8(0x0f);
                self.u8(0xc4);
                self.modrm_mem(dst.0, base, disp);
            }
            4 | 8 => {
                self.u8(0x66);
                self.rex(esize == 8, dst.is_extended(), false, base.is_extended(), false);
                self.u8(0x0f);
                self.u8(0x3a);
                self.u8(0x22);
                self.modrm_mem(dst.0, base, disp);
            }
            _ => unreachable!("invalid element size"),
        }

        self.u8(lane);
    }

    /// `pextr{b,w,d,q} [base + disp], src, lane` (SSE4.1 memory forms).
    pub fn pextr_mem(&mut self, esize: u8, base: Reg, disp: i32, src: Xmm, lane: u8) {
        let op = match esize {
            1 => 0x14,
            2 => 0x15,
            4 | 8 => 0x16,
            _ => unreachable!("invalid element size"),
        };

        self.u8(0x66);
        self.rex(esize == 8, src.is_extended(), false, base.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x3a);
        self.u8(op);
        self.modrm_mem(src.0, base, disp);
        self.u8(lane);
    }

    /// `pinsr{b,w,d,q} dst, src_gpr, lane` (register forms).
    pub fn pinsr_r(&mut self, esize: u8, dst: Xmm, src: Reg, lane: u8) {
        match esize {
            1 => {
                self.u8(0x66);
                self.rex(false, dst.is_extended(), false, src.is_extended(), src.index() >= 4);
                self.u8(0x0f);
                self.u8(0x3a);
                self.u8(0x20);
                self.u8(0xc0 | dst.low3() << 3 | (src.index() & 7));
            }
            2 => {
                self.u8(0x66);
                self.rex(false, dst.is_extended(), false, src.is_extended(), false);
                self.u8(0x0f);
                self.u8(0xc4);
                self.u8(0xc0 | dst.low3() << 3 | (src.index() & 7));
            }
            4 | 8 => {
                self.u8(0x66);
                self.rex(esize == 8, dst.is_extended(), false, src.is_extended(), false);
                self.u8(0x0f);
                self.u8(0x3a);
                self.u8(0x22);
                self.u8(0xc0 | dst.low3() << 3 | (src.index() & 7));
            }
            _ => unreachable!("invalid element size"),
        }

        self.u8(lane);
    }

    /// `pextr{b,w,d,q} dst_gpr, src, lane` (register forms).
    pub fn pextr_r(&mut self, esize: u8, dst: Reg, src: Xmm, lane: u8) {
        let op = match esize {
            1 => 0x14,
            2 => 0x15,
            4 | 8 => 0x16,
            _ => unreachable!("invalid element size"),
        };

        self.u8(0x66);
        self.rex(esize == 8, src.is_extended(), false, dst.is_extended(), false);
        self.u8(0x0f);
        self.u8(0x3a);
        self.u8(op);
        self.u8(0xc0 | src.low3() << 3 | (dst.index() & 7));
        self.u8(lane);
    }

    // ── Packed shifts by immediate ──

    /// `psll{w,d,q} xmm, imm`.
    pub fn psll_i(&mut self, esize: u8, reg: Xmm, count: u8) {
        self.packed_shift(esize, 6, reg, count);
    }

    /// `psrl{w,d,q} xmm, imm`.
    pub fn psrl_i(&mut self, esize: u8, reg: Xmm, count: u8) {
        self.packed_shift(esize, 2, reg, count);
    }

    /// `psra{w,d} xmm, imm`; there is no packed 64-bit arithmetic shift in SSE.
    pub fn psra_i(&mut self, esize: u8, reg: Xmm, count: u8) {
        debug_assert!(esize != 8, "no psraq in SSE");
        self.packed_shift(esize, 4, reg, count);
    }

    fn packed_shift(&mut self, esize: u8, digit: u8, reg: Xmm, count: u8) {
        let op = match esize {
            2 => 0x71,
            4 => 0x72,
            8 => 0x73,
            _ => unreachable!("invalid element size"),
        };

        self.u8(0x66);
        self.rex(false, false, false, reg.is_extended(), false);
        self.u8(0x0f);
        self.u8(op);
        self.u8(0xc0 | digit << 3 | reg.low3());
        self.u8(count);
    }

    // ── Packed float ──

    /// `addps`/`addpd`.
    pub fn addp(&mut self, wide: bool, dst: Xmm, src: Xmm) {
        self.float_op(wide, 0x58, dst, src);
    }

    /// `subps`/`subpd`.
    pub fn subp(&mut self, wide: bool, dst: Xmm, src: Xmm) {
        self.float_op(wide, 0x5c, dst, src);
    }

    /// `mulps`/`mulpd`.
    pub fn mulp(&mut self, wide: bool, dst: Xmm, src: Xmm) {
        self.float_op(wide, 0x59, dst, src);
    }

    /// `divps`/`divpd`.
    pub fn divp(&mut self, wide: bool, dst: Xmm, src: Xmm) {
        self.float_op(wide, 0x5e, dst, src);
    }

    /// `cmpps`/`cmppd` with an immediate predicate (0 = EQ, 1 = LT, 2 = LE, ...).
    pub fn cmpp(&mut self, wide: bool, dst: Xmm, src: Xmm, predicate: u8) {
        self.float_op(wide, 0xc2, dst, src);
        self.u8(predicate);
    }

    fn float_op(&mut self, wide: bool, op: u8, dst: Xmm, src: Xmm) {
        let prefix = if wide { Prefix::P66 } else { Prefix::None };
        self.sse_rr(prefix, &[op], dst, src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CodeBuffer;

    fn emit(f: impl FnOnce(&mut Emitter<'_, '_>)) -> Vec<u8> {
        let mut buf = CodeBuffer::with_capacity(64);
        let mut e = Emitter::new(&mut buf);
        f(&mut e);
        assert!(!buf.error());
        buf.bytes().to_vec()
    }

    #[test]
    fn packed_integer_encodings() {
        assert_eq!(emit(|e| e.padd(4, Xmm(0), Xmm(1))), [0x66, 0x0f, 0xfe, 0xc1]);
        assert_eq!(emit(|e| e.padd(8, Xmm(2), Xmm(3))), [0x66, 0x0f, 0xd4, 0xd3]);
        assert_eq!(emit(|e| e.psub(1, Xmm(0), Xmm(1))), [0x66, 0x0f, 0xf8, 0xc1]);
        assert_eq!(emit(|e| e.pxor(Xmm(4), Xmm(4))), [0x66, 0x0f, 0xef, 0xe4]);
        assert_eq!(emit(|e| e.pmulld(Xmm(0), Xmm(1))), [0x66, 0x0f, 0x38, 0x40, 0xc1]);
        assert_eq!(emit(|e| e.pcmpeq(8, Xmm(0), Xmm(1))), [0x66, 0x0f, 0x38, 0x29, 0xc1]);
        assert_eq!(emit(|e| e.pcmpgt(4, Xmm(5), Xmm(6))), [0x66, 0x0f, 0x66, 0xee]);
    }

    #[test]
    fn extended_xmm_takes_rex() {
        assert_eq!(emit(|e| e.padd(4, Xmm(9), Xmm(1))), [0x66, 0x44, 0x0f, 0xfe, 0xc9]);
        assert_eq!(
            emit(|e| e.movdqu_load(Xmm(8), Reg::R15, 0x20)),
            [0xf3, 0x45, 0x0f, 0x6f, 0x87, 0x20, 0x00, 0x00, 0x00],
        );
    }

    #[test]
    fn moves_and_shuffles() {
        assert_eq!(
            emit(|e| e.movdqu_store(Reg::Rax, 0, Xmm(2))),
            [0xf3, 0x0f, 0x7f, 0x90, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(emit(|e| e.movq_xr(Xmm(0), Reg::Rax)), [0x66, 0x48, 0x0f, 0x6e, 0xc0]);
        assert_eq!(emit(|e| e.movq_rx(Reg::Rax, Xmm(0))), [0x66, 0x48, 0x0f, 0x7e, 0xc0]);
        assert_eq!(emit(|e| e.pshufd(Xmm(0), Xmm(1), 0x4e)), [0x66, 0x0f, 0x70, 0xc1, 0x4e]);
        assert_eq!(emit(|e| e.pshufb(Xmm(0), Xmm(1))), [0x66, 0x0f, 0x38, 0x00, 0xc1]);
    }

    #[test]
    fn lane_moves() {
        assert_eq!(
            emit(|e| e.pinsr_mem(1, Xmm(1), Reg::Rax, 0, 3)),
            [0x66, 0x0f, 0x3a, 0x20, 0x88, 0x00, 0x00, 0x00, 0x00, 0x03],
        );
        assert_eq!(
            emit(|e| e.pextr_mem(8, Reg::Rax, 0, Xmm(2), 1)),
            [0x66, 0x48, 0x0f, 0x3a, 0x16, 0x90, 0x00, 0x00, 0x00, 0x00, 0x01],
        );
        assert_eq!(emit(|e| e.pextr_r(4, Reg::Rcx, Xmm(3), 2)), [0x66, 0x0f, 0x3a, 0x16, 0xd9, 0x02]);
        assert_eq!(emit(|e| e.pinsr_r(8, Xmm(1), Reg::Rdx, 1)), [0x66, 0x48, 0x0f, 0x3a, 0x22, 0xca, 0x01]);
    }

    #[test]
    fn packed_float_encodings() {
        assert_eq!(emit(|e| e.addp(false, Xmm(0), Xmm(1))), [0x0f, 0x58, 0xc1]);
        assert_eq!(emit(|e| e.addp(true, Xmm(0), Xmm(1))), [0x66, 0x0f, 0x58, 0xc1]);
        assert_eq!(emit(|e| e.mulp(false, Xmm(2), Xmm(3))), [0x0f, 0x59, 0xd3]);
        assert_eq!(emit(|e| e.cmpp(false, Xmm(0), Xmm(1), 2)), [0x0f, 0xc2, 0xc1, 0x02]);
    }

    #[test]
    fn packed_shift_encodings() {
        assert_eq!(emit(|e| e.psll_i(4, Xmm(1), 5)), [0x66, 0x0f, 0x72, 0xf1, 0x05]);
        assert_eq!(emit(|e| e.psrl_i(8, Xmm(2), 1)), [0x66, 0x0f, 0x73, 0xd2, 0x01]);
        assert_eq!(emit(|e| e.psra_i(2, Xmm(3), 7)), [0x66, 0x0f, 0x71, 0xe3, 0x07]);
    }
}
