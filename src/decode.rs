//! AArch64 instruction decoder.
//!
//! [`decode`] is a pure function from a 32-bit instruction word to a tagged [`Inst`] describing
//! the instruction class and its operand fields. Classification follows the top-level encoding
//! groups of the A64 instruction set (bits 28–25), then refines within each group. Anything the
//! translator does not handle decodes to [`Inst::Unknown`]; the translator decides whether that
//! aborts translation or becomes a fault exit.
//!
//! Field extraction follows the ARMv8 base encoding throughout: `rd = bits[4:0]`,
//! `rn = bits[9:5]`, `rm = bits[20:16]`, `rt2`/`ra = bits[14:10]`, `sf = bit[31]`; branch
//! immediates are sign-extended after scaling by 4.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

/// Sign-extends the low `bits` bits of `value`.
#[inline]
pub(crate) fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

#[inline]
fn field(word: u32, lo: u32, hi: u32) -> u32 {
    (word >> lo) & ((1 << (hi - lo + 1)) - 1)
}

/// An AArch64 condition code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
pub enum Cond {
    Eq = 0x0,
    Ne = 0x1,
    Cs = 0x2,
    Cc = 0x3,
    Mi = 0x4,
    Pl = 0x5,
    Vs = 0x6,
    Vc = 0x7,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xa,
    Lt = 0xb,
    Gt = 0xc,
    Le = 0xd,
    Al = 0xe,
    Nv = 0xf,
}

impl Cond {
    fn from_bits(bits: u32) -> Cond {
        Cond::from_u32(bits & 0xf).unwrap()
    }

    /// The inverted condition. AL and NV invert onto each other, matching the encoding rule.
    pub fn invert(self) -> Cond {
        Cond::from_u32(self as u32 ^ 1).unwrap()
    }
}

/// Shift applied to a register operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
pub enum ShiftKind {
    Lsl = 0,
    Lsr = 1,
    Asr = 2,
    Ror = 3,
}

/// Extension applied to a register operand of an extended add/sub or register-offset address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
pub enum Extend {
    Uxtb = 0,
    Uxth = 1,
    Uxtw = 2,
    Uxtx = 3,
    Sxtb = 4,
    Sxth = 5,
    Sxtw = 6,
    Sxtx = 7,
}

/// The second operand of a two-operand data-processing instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operand {
    /// An immediate whose value is already fully formed (shifts and masks applied).
    Imm(u64),
    /// A register with an optional shift.
    Reg { rm: u8, shift: ShiftKind, amount: u8 },
    /// A register with an extension and a left shift of 0–4 (extended add/sub).
    Ext { rm: u8, extend: Extend, shift: u8 },
}

/// Two-operand ALU operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Bic,
    Orr,
    Orn,
    Eor,
    Eon,
    Adc,
    Sbc,
}

/// Move-wide kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MoveKind {
    Movn,
    Movz,
    Movk,
}

/// Bitfield-move kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitfieldKind {
    Sbfm,
    Bfm,
    Ubfm,
}

/// One-source data operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Rbit,
    Rev16,
    Rev32,
    Rev64,
    Clz,
    Cls,
}

/// Multiply family member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MulOp {
    Madd,
    Msub,
    Smaddl,
    Smsubl,
    Umaddl,
    Umsubl,
    Smulh,
    Umulh,
}

/// Conditional-select kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CselKind {
    Csel,
    Csinc,
    Csinv,
    Csneg,
}

/// Addressing mode of a single-register load or store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddrMode {
    /// `[rn + imm]`.
    Offset(i64),
    /// `[rn], imm` — access at `rn`, then writeback `rn + imm`.
    PostIndex(i64),
    /// `[rn + imm]!` — writeback `rn + imm`, access at the new value.
    PreIndex(i64),
    /// `[rn + extend(rm) << shift]`.
    RegOffset { rm: u8, extend: Extend, shift: u8 },
}

/// Addressing mode of a pair load or store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PairMode {
    Offset,
    PostIndex,
    PreIndex,
}

/// Register-branch kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchRegKind {
    Br,
    Blr,
    Ret,
}

/// Barrier kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BarrierKind {
    Dmb,
    Dsb,
    Isb,
}

/// Atomic read-modify-write operation (the LSE group plus SWP).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RmwOp {
    Add,
    Clr,
    Eor,
    Set,
    Smax,
    Smin,
    Umax,
    Umin,
    Swp,
}

/// User-visible system registers the translator understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SysReg {
    Nzcv,
    Fpcr,
    Fpsr,
    TpidrEl0,
    CntvctEl0,
    CntfrqEl0,
    DczidEl0,
    CtrEl0,
    /// Any other encoding; carries the 15-bit (o0:op1:CRn:CRm:op2) id.
    Other(u16),
}

impl SysReg {
    fn from_id(id: u16) -> SysReg {
        // id = o0:op1:CRn:CRm:op2 where o0 is op0 - 2.
        match id {
            0x5a10 => SysReg::Nzcv,
            0x5a20 => SysReg::Fpcr,
            0x5a21 => SysReg::Fpsr,
            0x5e82 => SysReg::TpidrEl0,
            0x5f02 => SysReg::CntvctEl0,
            0x5f00 => SysReg::CntfrqEl0,
            0x5807 => SysReg::DczidEl0,
            0x5801 => SysReg::CtrEl0,
            other => SysReg::Other(other),
        }
    }
}

/// Element-wise vector operation of the three-same group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VecOp {
    Add,
    Sub,
    Mul,
    And,
    Bic,
    Orr,
    Orn,
    Eor,
    Bsl,
    Bit,
    Bif,
    Cmeq,
    Cmgt,
    Cmge,
    Cmhi,
    Cmhs,
    Cmtst,
}

/// Element-wise vector float operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VecFloatOp {
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fcmeq,
    Fcmge,
    Fcmgt,
}

/// A decoded AArch64 instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inst {
    /// Two-operand data processing: add/sub/logical, immediate or (possibly shifted or
    /// extended) register forms, with or without flag setting.
    Alu {
        op: AluOp,
        sf: bool,
        set_flags: bool,
        rd: u8,
        rn: u8,
        operand: Operand,
    },
    /// MOVZ/MOVN/MOVK.
    MoveWide {
        kind: MoveKind,
        sf: bool,
        rd: u8,
        imm16: u16,
        /// One of 0, 16, 32, 48.
        shift: u8,
    },
    /// ADR and ADRP; `imm` is the final byte offset (page-scaled for ADRP).
    Adr { rd: u8, imm: i64, page: bool },
    /// SBFM/BFM/UBFM; the translator resolves the aliases.
    Bitfield {
        kind: BitfieldKind,
        sf: bool,
        rd: u8,
        rn: u8,
        immr: u8,
        imms: u8,
    },
    /// EXTR (and thereby ROR immediate).
    Extract { sf: bool, rd: u8, rn: u8, rm: u8, lsb: u8 },
    /// LSLV/LSRV/ASRV/RORV.
    VarShift { op: ShiftKind, sf: bool, rd: u8, rn: u8, rm: u8 },
    /// RBIT/REV16/REV32/REV/CLZ/CLS.
    Unary { op: UnaryOp, sf: bool, rd: u8, rn: u8 },
    /// The multiply-accumulate family.
    Mul { op: MulOp, sf: bool, rd: u8, rn: u8, rm: u8, ra: u8 },
    /// UDIV/SDIV.
    Div { sf: bool, signed: bool, rd: u8, rn: u8, rm: u8 },
    /// The Castagnoli CRC32C group; `size` is the source width in bytes.
    Crc32c { size: u8, rd: u8, rn: u8, rm: u8 },
    /// CSEL/CSINC/CSINV/CSNEG.
    CondSelect {
        kind: CselKind,
        sf: bool,
        rd: u8,
        rn: u8,
        rm: u8,
        cond: Cond,
    },
    /// CCMP/CCMN; `operand` is a register index or a 5-bit immediate.
    CondCompare {
        sf: bool,
        /// True for CCMP (subtract), false for CCMN (add).
        sub: bool,
        rn: u8,
        imm: bool,
        rm_or_imm: u8,
        cond: Cond,
        nzcv: u8,
    },
    /// Single-register load/store (integer or vector).
    Mem {
        load: bool,
        /// Access size in bytes (1, 2, 4, 8 or 16 for vector).
        size: u8,
        /// Sign-extending load.
        signed: bool,
        /// 64-bit destination for signed loads.
        sf: bool,
        /// The register file: general when false, vector when true.
        vector: bool,
        rt: u8,
        rn: u8,
        addr: AddrMode,
    },
    /// Pair load/store.
    MemPair {
        load: bool,
        size: u8,
        /// LDPSW.
        signed: bool,
        vector: bool,
        rt: u8,
        rt2: u8,
        rn: u8,
        mode: PairMode,
        imm: i64,
    },
    /// PC-relative load (LDR literal); `offset` is relative to the instruction address.
    LoadLiteral {
        rt: u8,
        offset: i64,
        size: u8,
        signed: bool,
        vector: bool,
    },
    /// B and BL.
    Branch { link: bool, offset: i64 },
    /// BR/BLR/RET.
    BranchReg { kind: BranchRegKind, rn: u8 },
    /// B.cond.
    BranchCond { cond: Cond, offset: i64 },
    /// CBZ/CBNZ.
    CmpBranch { sf: bool, nonzero: bool, rt: u8, offset: i64 },
    /// TBZ/TBNZ.
    TestBranch { nonzero: bool, rt: u8, bit: u8, offset: i64 },
    /// SVC #imm.
    Svc { imm: u16 },
    /// BRK #imm.
    Brk { imm: u16 },
    /// NOP and every other allocated hint, plus CLREX.
    Nop,
    /// DMB/DSB/ISB.
    Barrier { kind: BarrierKind },
    /// MRS (read = true) and MSR (register form).
    SysRegMove { read: bool, rt: u8, reg: SysReg },
    /// LDXR/LDAXR.
    LoadEx { size: u8, acquire: bool, rt: u8, rn: u8 },
    /// STXR/STLXR; `rs` receives the status.
    StoreEx { size: u8, release: bool, rs: u8, rt: u8, rn: u8 },
    /// LDAR.
    LoadAcquire { size: u8, rt: u8, rn: u8 },
    /// STLR.
    StoreRelease { size: u8, rt: u8, rn: u8 },
    /// The LSE read-modify-write group (LDADD, LDSET, ... and SWP).
    AtomicRmw {
        op: RmwOp,
        size: u8,
        acquire: bool,
        release: bool,
        rs: u8,
        rt: u8,
        rn: u8,
    },
    /// CAS.
    Cas {
        size: u8,
        acquire: bool,
        release: bool,
        rs: u8,
        rt: u8,
        rn: u8,
    },
    /// Element-wise vector operation of the three-same group.
    VecRrr {
        op: VecOp,
        esize: u8,
        q: bool,
        rd: u8,
        rn: u8,
        rm: u8,
    },
    /// Element-wise vector float operation.
    VecFloatRrr {
        op: VecFloatOp,
        /// 64-bit elements when true.
        double: bool,
        q: bool,
        rd: u8,
        rn: u8,
        rm: u8,
    },
    /// LD1–LD4/ST1–ST4 (multiple structures).
    VecMulti {
        load: bool,
        /// Total registers transferred.
        regs: u8,
        /// Structure interleave factor: 1 for LD1/ST1, 2–4 for LDn/STn.
        interleave: u8,
        esize: u8,
        q: bool,
        rt: u8,
        rn: u8,
        /// Post-index register, with 31 meaning the aggregate-size immediate.
        post: Option<u8>,
    },
    /// MOVI/MVNI with the immediate already expanded to a 64-bit lane pattern.
    VecMovImm { q: bool, rd: u8, imm: u64 },
    /// DUP Vd.T, Rn (general register source).
    VecDup { esize: u8, q: bool, rd: u8, rn: u8 },
    /// DUP Vd.T, Vn.T[index] (element source).
    VecDupElem { esize: u8, q: bool, rd: u8, rn: u8, index: u8 },
    /// INS Vd.T[index], Rn.
    VecInsGeneral { esize: u8, rd: u8, index: u8, rn: u8 },
    /// INS Vd.T[dst], Vn.T[src].
    VecInsElem { esize: u8, rd: u8, dst: u8, rn: u8, src: u8 },
    /// UMOV/SMOV Rd, Vn.T[index].
    VecMovToGeneral {
        esize: u8,
        signed: bool,
        sf: bool,
        rd: u8,
        rn: u8,
        index: u8,
    },
    /// FMOV between a general register and the low half of a vector register.
    FmovGeneral { to_vec: bool, double: bool, rd: u8, rn: u8 },
    /// Unrecognized encoding; carries the raw word.
    Unknown { word: u32 },
}

/// Decodes one instruction word.
pub fn decode(word: u32) -> Inst {
    match field(word, 25, 28) {
        0b1000 | 0b1001 => decode_dp_imm(word),
        0b1010 | 0b1011 => decode_branch_sys(word),
        0b0100 | 0b0110 | 0b1100 | 0b1110 => decode_ldst(word),
        0b0101 | 0b1101 => decode_dp_reg(word),
        0b0111 | 0b1111 => decode_simd(word),
        _ => Inst::Unknown { word },
    }
}

/// Expands an N:immr:imms logical immediate into the 32- or 64-bit mask it denotes, or `None`
/// for a reserved pattern.
pub(crate) fn decode_bit_mask(sf: bool, n: bool, immr: u8, imms: u8) -> Option<u64> {
    let imms = u32::from(imms) & 0x3f;
    let immr = u32::from(immr) & 0x3f;

    if !sf && n {
        return None;
    }

    let combined = (u32::from(n) << 6) | (!imms & 0x3f);

    if combined == 0 {
        return None;
    }

    let len = 31 - combined.leading_zeros();

    if len < 1 {
        return None;
    }

    let esize = 1u32 << len;
    let levels = esize - 1;
    let s = imms & levels;
    let r = immr & levels;

    if s == levels {
        return None;
    }

    let welem = (1u64 << (s + 1)) - 1;
    let emask = if esize == 64 { u64::MAX } else { (1u64 << esize) - 1 };
    let pattern = if r == 0 {
        welem
    } else {
        ((welem >> r) | (welem << (esize - r))) & emask
    };

    let mut mask = 0;
    let mut i = 0;

    while i < 64 {
        mask |= pattern << i;
        i += esize;
    }

    Some(if sf { mask } else { mask & 0xffff_ffff })
}

fn decode_dp_imm(word: u32) -> Inst {
    let sf = word >> 31 != 0;
    let rd = field(word, 0, 4) as u8;
    let rn = field(word, 5, 9) as u8;

    match field(word, 23, 25) {
        0b000 | 0b001 => {
            // ADR/ADRP: immhi:immlo, page-scaled for ADRP.
            let page = word >> 31 != 0;
            let imm = (u64::from(field(word, 5, 23)) << 2) | u64::from(field(word, 29, 30));
            let imm = sign_extend(imm, 21);
            let imm = if page { imm << 12 } else { imm };

            Inst::Adr { rd, imm, page }
        }
        0b010 => {
            // Add/subtract (immediate).
            let op = if field(word, 30, 30) != 0 { AluOp::Sub } else { AluOp::Add };
            let set_flags = field(word, 29, 29) != 0;
            let imm12 = u64::from(field(word, 10, 21));
            let imm = if field(word, 22, 22) != 0 { imm12 << 12 } else { imm12 };

            Inst::Alu { op, sf, set_flags, rd, rn, operand: Operand::Imm(imm) }
        }
        0b100 => {
            // Logical (immediate).
            let n = field(word, 22, 22) != 0;
            let immr = field(word, 16, 21) as u8;
            let imms = field(word, 10, 15) as u8;

            let imm = match decode_bit_mask(sf, n, immr, imms) {
                Some(imm) => imm,
                None => return Inst::Unknown { word },
            };

            let (op, set_flags) = match field(word, 29, 30) {
                0b00 => (AluOp::And, false),
                0b01 => (AluOp::Orr, false),
                0b10 => (AluOp::Eor, false),
                _ => (AluOp::And, true),
            };

            Inst::Alu { op, sf, set_flags, rd, rn, operand: Operand::Imm(imm) }
        }
        0b101 => {
            // Move wide (immediate).
            let kind = match field(word, 29, 30) {
                0b00 => MoveKind::Movn,
                0b10 => MoveKind::Movz,
                0b11 => MoveKind::Movk,
                _ => return Inst::Unknown { word },
            };

            let hw = field(word, 21, 22);

            if !sf && hw > 1 {
                return Inst::Unknown { word };
            }

            Inst::MoveWide {
                kind,
                sf,
                rd,
                imm16: field(word, 5, 20) as u16,
                shift: (hw * 16) as u8,
            }
        }
        0b110 => {
            // Bitfield.
            let kind = match field(word, 29, 30) {
                0b00 => BitfieldKind::Sbfm,
                0b01 => BitfieldKind::Bfm,
                0b10 => BitfieldKind::Ubfm,
                _ => return Inst::Unknown { word },
            };

            let n = field(word, 22, 22) != 0;

            if n != sf {
                return Inst::Unknown { word };
            }

            Inst::Bitfield {
                kind,
                sf,
                rd,
                rn,
                immr: field(word, 16, 21) as u8,
                imms: field(word, 10, 15) as u8,
            }
        }
        0b111 => {
            // Extract.
            if field(word, 29, 30) != 0 || field(word, 21, 21) != 0 {
                return Inst::Unknown { word };
            }

            let imms = field(word, 10, 15) as u8;

            if !sf && imms >= 32 {
                return Inst::Unknown { word };
            }

            Inst::Extract {
                sf,
                rd,
                rn,
                rm: field(word, 16, 20) as u8,
                lsb: imms,
            }
        }
        _ => Inst::Unknown { word },
    }
}

fn decode_branch_sys(word: u32) -> Inst {
    if word & 0x7c00_0000 == 0x1400_0000 {
        let link = word >> 31 != 0;
        let offset = sign_extend(u64::from(field(word, 0, 25)), 26) << 2;

        return Inst::Branch { link, offset };
    }

    if word & 0x7e00_0000 == 0x3400_0000 {
        let sf = word >> 31 != 0;
        let nonzero = field(word, 24, 24) != 0;
        let offset = sign_extend(u64::from(field(word, 5, 23)), 19) << 2;

        return Inst::CmpBranch { sf, nonzero, rt: field(word, 0, 4) as u8, offset };
    }

    if word & 0x7e00_0000 == 0x3600_0000 {
        let nonzero = field(word, 24, 24) != 0;
        let bit = (field(word, 31, 31) << 5 | field(word, 19, 23)) as u8;
        let offset = sign_extend(u64::from(field(word, 5, 18)), 14) << 2;

        return Inst::TestBranch { nonzero, rt: field(word, 0, 4) as u8, bit, offset };
    }

    if word & 0xff00_0010 == 0x5400_0000 {
        let cond = Cond::from_bits(field(word, 0, 3));
        let offset = sign_extend(u64::from(field(word, 5, 23)), 19) << 2;

        return Inst::BranchCond { cond, offset };
    }

    if word & 0xffe0_001f == 0xd400_0001 {
        return Inst::Svc { imm: field(word, 5, 20) as u16 };
    }

    if word & 0xffe0_001f == 0xd420_0000 {
        return Inst::Brk { imm: field(word, 5, 20) as u16 };
    }

    // Allocated hints (NOP, YIELD, WFE, ...) and CLREX have no effect here.
    if word & 0xffff_f01f == 0xd503_201f || word & 0xffff_f0ff == 0xd503_305f {
        return Inst::Nop;
    }

    if word & 0xffff_f0ff == 0xd503_309f {
        return Inst::Barrier { kind: BarrierKind::Dsb };
    }

    if word & 0xffff_f0ff == 0xd503_30bf {
        return Inst::Barrier { kind: BarrierKind::Dmb };
    }

    if word & 0xffff_f0ff == 0xd503_30df {
        return Inst::Barrier { kind: BarrierKind::Isb };
    }

    if word >> 20 == 0xd53 || word >> 20 == 0xd51 {
        return Inst::SysRegMove {
            read: word >> 20 == 0xd53,
            rt: field(word, 0, 4) as u8,
            reg: SysReg::from_id(field(word, 5, 19) as u16),
        };
    }

    if word & 0xffff_fc1f == 0xd61f_0000 {
        return Inst::BranchReg { kind: BranchRegKind::Br, rn: field(word, 5, 9) as u8 };
    }

    if word & 0xffff_fc1f == 0xd63f_0000 {
        return Inst::BranchReg { kind: BranchRegKind::Blr, rn: field(word, 5, 9) as u8 };
    }

    if word & 0xffff_fc1f == 0xd65f_0000 {
        return Inst::BranchReg { kind: BranchRegKind::Ret, rn: field(word, 5, 9) as u8 };
    }

    Inst::Unknown { word }
}

fn decode_dp_reg(word: u32) -> Inst {
    let sf = word >> 31 != 0;
    let rd = field(word, 0, 4) as u8;
    let rn = field(word, 5, 9) as u8;
    let rm = field(word, 16, 20) as u8;

    if field(word, 24, 28) == 0b01010 {
        // Logical (shifted register).
        let shift = ShiftKind::from_u32(field(word, 22, 23)).unwrap();
        let amount = field(word, 10, 15) as u8;

        if !sf && amount >= 32 {
            return Inst::Unknown { word };
        }

        let negate = field(word, 21, 21) != 0;
        let (op, set_flags) = match (field(word, 29, 30), negate) {
            (0b00, false) => (AluOp::And, false),
            (0b00, true) => (AluOp::Bic, false),
            (0b01, false) => (AluOp::Orr, false),
            (0b01, true) => (AluOp::Orn, false),
            (0b10, false) => (AluOp::Eor, false),
            (0b10, true) => (AluOp::Eon, false),
            (0b11, false) => (AluOp::And, true),
            (0b11, true) => (AluOp::Bic, true),
            _ => unreachable!(),
        };

        return Inst::Alu {
            op,
            sf,
            set_flags,
            rd,
            rn,
            operand: Operand::Reg { rm, shift, amount },
        };
    }

    if field(word, 24, 28) == 0b01011 {
        let op = if field(word, 30, 30) != 0 { AluOp::Sub } else { AluOp::Add };
        let set_flags = field(word, 29, 29) != 0;

        if field(word, 21, 21) != 0 {
            // Add/subtract (extended register).
            if field(word, 22, 23) != 0 {
                return Inst::Unknown { word };
            }

            let extend = Extend::from_u32(field(word, 13, 15)).unwrap();
            let shift = field(word, 10, 12) as u8;

            if shift > 4 {
                return Inst::Unknown { word };
            }

            return Inst::Alu {
                op,
                sf,
                set_flags,
                rd,
                rn,
                operand: Operand::Ext { rm, extend, shift },
            };
        }

        // Add/subtract (shifted register). ROR is reserved here.
        let shift = match field(word, 22, 23) {
            0b00 => ShiftKind::Lsl,
            0b01 => ShiftKind::Lsr,
            0b10 => ShiftKind::Asr,
            _ => return Inst::Unknown { word },
        };

        let amount = field(word, 10, 15) as u8;

        if !sf && amount >= 32 {
            return Inst::Unknown { word };
        }

        return Inst::Alu {
            op,
            sf,
            set_flags,
            rd,
            rn,
            operand: Operand::Reg { rm, shift, amount },
        };
    }

    if field(word, 24, 28) == 0b11010 {
        match field(word, 21, 23) {
            0b000 => {
                // Add/subtract with carry.
                if field(word, 10, 15) != 0 {
                    return Inst::Unknown { word };
                }

                let op = if field(word, 30, 30) != 0 { AluOp::Sbc } else { AluOp::Adc };
                let set_flags = field(word, 29, 29) != 0;

                return Inst::Alu {
                    op,
                    sf,
                    set_flags,
                    rd,
                    rn,
                    operand: Operand::Reg { rm, shift: ShiftKind::Lsl, amount: 0 },
                };
            }
            0b010 => {
                // Conditional compare (register or immediate).
                if field(word, 29, 29) == 0 || field(word, 10, 10) != 0 || field(word, 4, 4) != 0 {
                    return Inst::Unknown { word };
                }

                return Inst::CondCompare {
                    sf,
                    sub: field(word, 30, 30) != 0,
                    rn,
                    imm: field(word, 11, 11) != 0,
                    rm_or_imm: rm,
                    cond: Cond::from_bits(field(word, 12, 15)),
                    nzcv: field(word, 0, 3) as u8,
                };
            }
            0b100 => {
                // Conditional select.
                let kind = match (field(word, 30, 30), field(word, 10, 11)) {
                    (0, 0b00) => CselKind::Csel,
                    (0, 0b01) => CselKind::Csinc,
                    (1, 0b00) => CselKind::Csinv,
                    (1, 0b01) => CselKind::Csneg,
                    _ => return Inst::Unknown { word },
                };

                return Inst::CondSelect {
                    kind,
                    sf,
                    rd,
                    rn,
                    rm,
                    cond: Cond::from_bits(field(word, 12, 15)),
                };
            }
            0b110 => {
                if field(word, 30, 30) != 0 {
                    // Data-processing (1 source).
                    if field(word, 16, 20) != 0 {
                        return Inst::Unknown { word };
                    }

                    // For sf=0, opcode 000010 is the full-width reverse; the translator reads
                    // Rev32 with sf=0 as a whole-register byte swap.
                    let op = match (field(word, 10, 15), sf) {
                        (0b000000, _) => UnaryOp::Rbit,
                        (0b000001, _) => UnaryOp::Rev16,
                        (0b000010, _) => UnaryOp::Rev32,
                        (0b000011, true) => UnaryOp::Rev64,
                        (0b000100, _) => UnaryOp::Clz,
                        (0b000101, _) => UnaryOp::Cls,
                        _ => return Inst::Unknown { word },
                    };

                    return Inst::Unary { op, sf, rd, rn };
                }

                // Data-processing (2 source).
                return match field(word, 10, 15) {
                    0b000010 => Inst::Div { sf, signed: false, rd, rn, rm },
                    0b000011 => Inst::Div { sf, signed: true, rd, rn, rm },
                    0b001000 => Inst::VarShift { op: ShiftKind::Lsl, sf, rd, rn, rm },
                    0b001001 => Inst::VarShift { op: ShiftKind::Lsr, sf, rd, rn, rm },
                    0b001010 => Inst::VarShift { op: ShiftKind::Asr, sf, rd, rn, rm },
                    0b001011 => Inst::VarShift { op: ShiftKind::Ror, sf, rd, rn, rm },
                    0b010100 => Inst::Crc32c { size: 1, rd, rn, rm },
                    0b010101 => Inst::Crc32c { size: 2, rd, rn, rm },
                    0b010110 => Inst::Crc32c { size: 4, rd, rn, rm },
                    0b010111 if sf => Inst::Crc32c { size: 8, rd, rn, rm },
                    _ => Inst::Unknown { word },
                };
            }
            _ => return Inst::Unknown { word },
        }
    }

    if field(word, 24, 28) == 0b11011 {
        // Data-processing (3 source).
        let ra = field(word, 10, 14) as u8;
        let o0 = field(word, 15, 15) != 0;

        let op = match (field(word, 21, 23), o0) {
            (0b000, false) => MulOp::Madd,
            (0b000, true) => MulOp::Msub,
            (0b001, false) if sf => MulOp::Smaddl,
            (0b001, true) if sf => MulOp::Smsubl,
            (0b010, false) if sf && ra == 31 => MulOp::Smulh,
            (0b101, false) if sf => MulOp::Umaddl,
            (0b101, true) if sf => MulOp::Umsubl,
            (0b110, false) if sf && ra == 31 => MulOp::Umulh,
            _ => return Inst::Unknown { word },
        };

        return Inst::Mul { op, sf, rd, rn, rm, ra };
    }

    Inst::Unknown { word }
}

fn decode_ldst(word: u32) -> Inst {
    let rt = field(word, 0, 4) as u8;
    let rn = field(word, 5, 9) as u8;

    // Load/store exclusive, ordered, and compare-and-swap.
    if word & 0x3f00_0000 == 0x0800_0000 {
        let size = 1u8 << field(word, 30, 31);
        let o2 = field(word, 23, 23) != 0;
        let load = field(word, 22, 22) != 0;
        let o1 = field(word, 21, 21) != 0;
        let rs = field(word, 16, 20) as u8;
        let o0 = field(word, 15, 15) != 0;
        let rt2 = field(word, 10, 14) as u8;

        return match (o2, o1) {
            (false, false) if rt2 == 31 => {
                if load {
                    Inst::LoadEx { size, acquire: o0, rt, rn }
                } else {
                    Inst::StoreEx { size, release: o0, rs, rt, rn }
                }
            }
            (true, false) if rs == 31 && rt2 == 31 && o0 => {
                if load {
                    Inst::LoadAcquire { size, rt, rn }
                } else {
                    Inst::StoreRelease { size, rt, rn }
                }
            }
            (true, true) if rt2 == 31 => Inst::Cas {
                size,
                acquire: load,
                release: o0,
                rs,
                rt,
                rn,
            },
            _ => Inst::Unknown { word },
        };
    }

    // AdvSIMD load/store multiple structures.
    if word & 0xbf9f_0000 == 0x0c00_0000 || word & 0xbfa0_0000 == 0x0c80_0000 {
        let q = field(word, 30, 30) != 0;
        let load = field(word, 22, 22) != 0;
        let post = field(word, 23, 23) != 0;
        let rm = field(word, 16, 20) as u8;
        let esize = 1u8 << field(word, 10, 11);

        let (regs, interleave) = match field(word, 12, 15) {
            0b0000 => (4, 4),
            0b0010 => (4, 1),
            0b0100 => (3, 3),
            0b0110 => (3, 1),
            0b0111 => (1, 1),
            0b1000 => (2, 2),
            0b1010 => (2, 1),
            _ => return Inst::Unknown { word },
        };

        if interleave > 1 && esize == 8 && !q {
            // 1D interleaved forms are reserved.
            return Inst::Unknown { word };
        }

        return Inst::VecMulti {
            load,
            regs,
            interleave,
            esize,
            q,
            rt,
            rn,
            post: if post { Some(rm) } else { None },
        };
    }

    // Load register (literal).
    if word & 0x3b00_0000 == 0x1800_0000 {
        let opc = field(word, 30, 31);
        let vector = field(word, 26, 26) != 0;
        let offset = sign_extend(u64::from(field(word, 5, 23)), 19) << 2;

        let (size, signed) = if vector {
            match opc {
                0b00 => (4, false),
                0b01 => (8, false),
                0b10 => (16, false),
                _ => return Inst::Unknown { word },
            }
        } else {
            match opc {
                0b00 => (4, false),
                0b01 => (8, false),
                0b10 => (4, true),
                // PRFM (literal) has no architectural effect here.
                _ => return Inst::Nop,
            }
        };

        return Inst::LoadLiteral { rt, offset, size, signed, vector };
    }

    // Load/store pair.
    if word & 0x3a00_0000 == 0x2800_0000 {
        let opc = field(word, 30, 31);
        let vector = field(word, 26, 26) != 0;
        let load = field(word, 22, 22) != 0;

        let mode = match field(word, 23, 24) {
            0b00 | 0b10 => PairMode::Offset,
            0b01 => PairMode::PostIndex,
            _ => PairMode::PreIndex,
        };

        let (size, signed) = if vector {
            match opc {
                0b00 => (4, false),
                0b01 => (8, false),
                0b10 => (16, false),
                _ => return Inst::Unknown { word },
            }
        } else {
            match opc {
                0b00 => (4, false),
                0b01 if load => (4, true),
                0b10 => (8, false),
                _ => return Inst::Unknown { word },
            }
        };

        let imm = sign_extend(u64::from(field(word, 15, 21)), 7) * i64::from(size);

        return Inst::MemPair {
            load,
            size,
            signed,
            vector,
            rt,
            rt2: field(word, 10, 14) as u8,
            rn,
            mode,
            imm,
        };
    }

    // Atomic memory operations (LSE).
    if word & 0x3f20_0c00 == 0x3820_0000 {
        let size = 1u8 << field(word, 30, 31);
        let acquire = field(word, 23, 23) != 0;
        let release = field(word, 22, 22) != 0;
        let rs = field(word, 16, 20) as u8;
        let o3 = field(word, 15, 15) != 0;

        let op = match (o3, field(word, 12, 14)) {
            (false, 0b000) => RmwOp::Add,
            (false, 0b001) => RmwOp::Clr,
            (false, 0b010) => RmwOp::Eor,
            (false, 0b011) => RmwOp::Set,
            (false, 0b100) => RmwOp::Smax,
            (false, 0b101) => RmwOp::Smin,
            (false, 0b110) => RmwOp::Umax,
            (false, 0b111) => RmwOp::Umin,
            (true, 0b000) => RmwOp::Swp,
            _ => return Inst::Unknown { word },
        };

        return Inst::AtomicRmw { op, size, acquire, release, rs, rt, rn };
    }

    let vector = field(word, 26, 26) != 0;

    // Load/store register (unsigned immediate).
    if word & 0x3b00_0000 == 0x3900_0000 {
        let (load, size, signed, sf) = match mem_opc(word, vector) {
            Some(fields) => fields,
            None => return decode_prfm(word),
        };

        let imm = u64::from(field(word, 10, 21)) * u64::from(size);

        return Inst::Mem {
            load,
            size,
            signed,
            sf,
            vector,
            rt,
            rn,
            addr: AddrMode::Offset(imm as i64),
        };
    }

    // Load/store register (imm9 and register-offset forms).
    if word & 0x3b20_0000 == 0x3800_0000 {
        let (load, size, signed, sf) = match mem_opc(word, vector) {
            Some(fields) => fields,
            None => return decode_prfm(word),
        };

        let imm = sign_extend(u64::from(field(word, 12, 20)), 9);

        let addr = match field(word, 10, 11) {
            0b01 => AddrMode::PostIndex(imm),
            0b11 => AddrMode::PreIndex(imm),
            // Unscaled and unprivileged offsets access the same location.
            _ => AddrMode::Offset(imm),
        };

        return Inst::Mem { load, size, signed, sf, vector, rt, rn, addr };
    }

    if word & 0x3b20_0c00 == 0x3820_0800 {
        let (load, size, signed, sf) = match mem_opc(word, vector) {
            Some(fields) => fields,
            None => return decode_prfm(word),
        };

        let extend = match Extend::from_u32(field(word, 13, 15)) {
            Some(e @ (Extend::Uxtw | Extend::Uxtx | Extend::Sxtw | Extend::Sxtx)) => e,
            _ => return Inst::Unknown { word },
        };

        let shift = if field(word, 12, 12) != 0 { size.trailing_zeros() as u8 } else { 0 };

        return Inst::Mem {
            load,
            size,
            signed,
            sf,
            vector,
            rt,
            rn,
            addr: AddrMode::RegOffset { rm: field(word, 16, 20) as u8, extend, shift },
        };
    }

    Inst::Unknown { word }
}

/// Resolves the size/opc fields of a single-register load/store into
/// `(load, size, signed, sf)`, or `None` for prefetch encodings.
fn mem_opc(word: u32, vector: bool) -> Option<(bool, u8, bool, bool)> {
    let size_bits = field(word, 30, 31);
    let opc = field(word, 22, 23);

    if vector {
        // The opc high bit extends the size; size 00 with opc 1x is the 128-bit form, and
        // every other opc-extended size is unallocated.
        if opc >> 1 != 0 && size_bits != 0 {
            return None;
        }

        let scale = (opc >> 1) * 4 + size_bits;

        return Some((opc & 1 != 0, 1u8 << scale, false, false));
    }

    let size = 1u8 << size_bits;

    match opc {
        0b00 => Some((false, size, false, false)),
        0b01 => Some((true, size, false, false)),
        0b10 if size_bits == 0b11 => None,
        0b10 => Some((true, size, true, true)),
        _ if size_bits >= 0b10 => None,
        _ => Some((true, size, true, false)),
    }
}

fn decode_prfm(word: u32) -> Inst {
    // PRFM is a hint; everything else that lands here is unallocated.
    if field(word, 30, 31) == 0b11 && field(word, 22, 23) == 0b10 && field(word, 26, 26) == 0 {
        Inst::Nop
    } else {
        Inst::Unknown { word }
    }
}

fn decode_simd(word: u32) -> Inst {
    let rd = field(word, 0, 4) as u8;
    let rn = field(word, 5, 9) as u8;
    let rm = field(word, 16, 20) as u8;
    let q = field(word, 30, 30) != 0;

    // Floating-point/general moves (FMOV Xd, Dn and friends).
    if word & 0x7f20_fc00 == 0x1e20_0000 {
        let sf = word >> 31 != 0;
        let ftype = field(word, 22, 23);
        let rmode = field(word, 19, 20);
        let opcode = field(word, 16, 18);

        if rmode == 0b00 && (opcode == 0b110 || opcode == 0b111) {
            let double = ftype == 0b01;

            // The register width must match the element width.
            if (ftype == 0b00 && !sf) || (ftype == 0b01 && sf) {
                return Inst::FmovGeneral { to_vec: opcode == 0b111, double, rd, rn };
            }
        }

        return Inst::Unknown { word };
    }

    // AdvSIMD modified immediate.
    if word & 0x9ff8_0c00 == 0x0f00_0400 {
        let op = field(word, 29, 29) != 0;
        let cmode = field(word, 12, 15) as u8;
        let imm8 = (field(word, 16, 18) << 5 | field(word, 5, 9)) as u8;

        return match expand_simd_imm(op, cmode, imm8) {
            Some(imm) => Inst::VecMovImm { q, rd, imm },
            None => Inst::Unknown { word },
        };
    }

    // AdvSIMD copy (DUP/INS/UMOV/SMOV).
    if word & 0x9fe0_8400 == 0x0e00_0400 {
        let op = field(word, 29, 29) != 0;
        let imm5 = field(word, 16, 20);
        let imm4 = field(word, 11, 14);

        let esize = match imm5.trailing_zeros() {
            0 => 1u8,
            1 => 2,
            2 => 4,
            3 => 8,
            _ => return Inst::Unknown { word },
        };

        let index = (imm5 >> (esize.trailing_zeros() + 1)) as u8;

        if op {
            // INS (element); imm4 holds the source index scaled by the element size.
            if !q {
                return Inst::Unknown { word };
            }

            let src = (imm4 >> esize.trailing_zeros()) as u8;

            return Inst::VecInsElem { esize, rd, dst: index, rn, src };
        }

        return match imm4 {
            0b0000 => Inst::VecDupElem { esize, q, rd, rn, index },
            0b0001 => {
                if esize == 8 && !q {
                    return Inst::Unknown { word };
                }

                Inst::VecDup { esize, q, rd, rn }
            }
            0b0011 if q => Inst::VecInsGeneral { esize, rd, index, rn },
            0b0101 => Inst::VecMovToGeneral { esize, signed: true, sf: q, rd, rn, index },
            0b0111 => {
                // UMOV is only allocated as Wd for sizes below doubleword and Xd for doubleword.
                if (esize == 8) != q {
                    return Inst::Unknown { word };
                }

                Inst::VecMovToGeneral { esize, signed: false, sf: q, rd, rn, index }
            }
            _ => Inst::Unknown { word },
        };
    }

    // AdvSIMD three same.
    if word & 0x9f20_0400 == 0x0e20_0400 {
        let u = field(word, 29, 29) != 0;
        let size = field(word, 22, 23);
        let esize = 1u8 << size;
        let opcode = field(word, 11, 15);

        // The logical group reuses the size field as an opcode extension.
        if opcode == 0b00011 {
            let op = match (u, size) {
                (false, 0b00) => VecOp::And,
                (false, 0b01) => VecOp::Bic,
                (false, 0b10) => VecOp::Orr,
                (false, 0b11) => VecOp::Orn,
                (true, 0b00) => VecOp::Eor,
                (true, 0b01) => VecOp::Bsl,
                (true, 0b10) => VecOp::Bit,
                (true, 0b11) => VecOp::Bif,
                _ => unreachable!(),
            };

            return Inst::VecRrr { op, esize: 1, q, rd, rn, rm };
        }

        // Vector float shares the three-same space with sz in bit 22.
        if opcode >= 0b11000 {
            let double = field(word, 22, 22) != 0;

            let op = match (u, field(word, 23, 23), opcode) {
                (false, 0, 0b11010) => VecFloatOp::Fadd,
                (false, 1, 0b11010) => VecFloatOp::Fsub,
                (true, 0, 0b11011) => VecFloatOp::Fmul,
                (true, 0, 0b11111) => VecFloatOp::Fdiv,
                (false, 0, 0b11100) => VecFloatOp::Fcmeq,
                (true, 0, 0b11100) => VecFloatOp::Fcmge,
                (true, 1, 0b11100) => VecFloatOp::Fcmgt,
                _ => return Inst::Unknown { word },
            };

            if double && !q {
                return Inst::Unknown { word };
            }

            return Inst::VecFloatRrr { op, double, q, rd, rn, rm };
        }

        // 1D integer vectors are only allocated for add/sub.
        if esize == 8 && !q && opcode != 0b10000 {
            return Inst::Unknown { word };
        }

        let op = match (u, opcode) {
            (false, 0b00110) => VecOp::Cmgt,
            (false, 0b00111) => VecOp::Cmge,
            (true, 0b00110) => VecOp::Cmhi,
            (true, 0b00111) => VecOp::Cmhs,
            (false, 0b10000) => VecOp::Add,
            (true, 0b10000) => VecOp::Sub,
            (false, 0b10001) => VecOp::Cmtst,
            (true, 0b10001) => VecOp::Cmeq,
            (false, 0b10011) if esize != 8 => VecOp::Mul,
            _ => return Inst::Unknown { word },
        };

        return Inst::VecRrr { op, esize, q, rd, rn, rm };
    }

    Inst::Unknown { word }
}

/// Expands the AdvSIMD modified immediate for the MOVI/MVNI move forms into a 64-bit lane
/// pattern. The ORR/BIC immediate forms and the float immediates return `None`.
fn expand_simd_imm(op: bool, cmode: u8, imm8: u8) -> Option<u64> {
    let imm = u64::from(imm8);

    let expanded = match cmode {
        // 32-bit: imm8 shifted into one of the four byte positions.
        0b0000 | 0b0010 | 0b0100 | 0b0110 => {
            let word = imm << (u64::from(cmode >> 1) * 8);
            word | word << 32
        }
        // 16-bit: imm8 shifted into one of the two byte positions.
        0b1000 | 0b1010 => {
            let half = imm << (u64::from(cmode >> 1 & 1) * 8);
            half | half << 16 | half << 32 | half << 48
        }
        // 32-bit "ones" forms: imm8:ones.
        0b1100 => {
            let word = imm << 8 | 0xff;
            word | word << 32
        }
        0b1101 => {
            let word = imm << 16 | 0xffff;
            word | word << 32
        }
        0b1110 if !op => {
            // 8-bit replicate.
            let byte = imm;
            let half = byte | byte << 8;
            let word = half | half << 16;
            word | word << 32
        }
        0b1110 if op => {
            // 64-bit: each immediate bit expands to a full byte.
            let mut value = 0u64;

            for bit in 0..8 {
                if imm8 >> bit & 1 != 0 {
                    value |= 0xffu64 << (bit * 8);
                }
            }

            return Some(value);
        }
        _ => return None,
    };

    Some(if op { !expanded } else { expanded })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_wide() {
        // MOVZ X0, #42.
        assert_eq!(
            decode(0xd280_0540),
            Inst::MoveWide { kind: MoveKind::Movz, sf: true, rd: 0, imm16: 42, shift: 0 },
        );
        // MOVK X3, #0xffff, LSL #16.
        assert_eq!(
            decode(0xf2bf_ffe3),
            Inst::MoveWide { kind: MoveKind::Movk, sf: true, rd: 3, imm16: 0xffff, shift: 16 },
        );
        // MOVN W1, #0.
        assert_eq!(
            decode(0x1280_0001),
            Inst::MoveWide { kind: MoveKind::Movn, sf: false, rd: 1, imm16: 0, shift: 0 },
        );
    }

    #[test]
    fn add_sub() {
        // ADD X1, X1, #1.
        assert_eq!(
            decode(0x9100_0421),
            Inst::Alu {
                op: AluOp::Add,
                sf: true,
                set_flags: false,
                rd: 1,
                rn: 1,
                operand: Operand::Imm(1),
            },
        );
        // ADD X0, X1, X2.
        assert_eq!(
            decode(0x8b02_0020),
            Inst::Alu {
                op: AluOp::Add,
                sf: true,
                set_flags: false,
                rd: 0,
                rn: 1,
                operand: Operand::Reg { rm: 2, shift: ShiftKind::Lsl, amount: 0 },
            },
        );
        // ADDS X2, X0, X1.
        assert_eq!(
            decode(0xab01_0002),
            Inst::Alu {
                op: AluOp::Add,
                sf: true,
                set_flags: true,
                rd: 2,
                rn: 0,
                operand: Operand::Reg { rm: 1, shift: ShiftKind::Lsl, amount: 0 },
            },
        );
        // CMP X1, X2 (SUBS XZR).
        assert_eq!(
            decode(0xeb02_003f),
            Inst::Alu {
                op: AluOp::Sub,
                sf: true,
                set_flags: true,
                rd: 31,
                rn: 1,
                operand: Operand::Reg { rm: 2, shift: ShiftKind::Lsl, amount: 0 },
            },
        );
        // SUB X0, X1, #0x10, LSL #12.
        assert_eq!(
            decode(0xd140_4020),
            Inst::Alu {
                op: AluOp::Sub,
                sf: true,
                set_flags: false,
                rd: 0,
                rn: 1,
                operand: Operand::Imm(0x10 << 12),
            },
        );
    }

    #[test]
    fn logical_immediates() {
        // ORR X0, X1, #1 — N=1 immr=0 imms=0.
        assert_eq!(
            decode(0xb240_0020),
            Inst::Alu {
                op: AluOp::Orr,
                sf: true,
                set_flags: false,
                rd: 0,
                rn: 1,
                operand: Operand::Imm(1),
            },
        );
        // AND X0, X1, #0xff.
        assert_eq!(
            decode(0x9240_1c20),
            Inst::Alu {
                op: AluOp::And,
                sf: true,
                set_flags: false,
                rd: 0,
                rn: 1,
                operand: Operand::Imm(0xff),
            },
        );
    }

    #[test]
    fn bit_mask_patterns() {
        // 64-bit element, single bit.
        assert_eq!(decode_bit_mask(true, true, 0, 0), Some(1));
        // 0xff = 8 ones.
        assert_eq!(decode_bit_mask(true, true, 0, 7), Some(0xff));
        // Rotated: two ones rotated right by one → 0x8000000000000001.
        assert_eq!(decode_bit_mask(true, true, 1, 1), Some(0x8000_0000_0000_0001));
        // 2-bit element 0b01 replicated (N=0, imms=111100).
        assert_eq!(decode_bit_mask(true, false, 0, 0b111100), Some(0x5555_5555_5555_5555));
        // 32-bit width truncates the replication.
        assert_eq!(decode_bit_mask(false, false, 0, 0b111100), Some(0x5555_5555));
        // All-ones is reserved.
        assert_eq!(decode_bit_mask(true, true, 0, 63), None);
        // N=1 in 32-bit mode is reserved.
        assert_eq!(decode_bit_mask(false, true, 0, 0), None);
    }

    #[test]
    fn branches() {
        // B +0x10.
        assert_eq!(decode(0x1400_0004), Inst::Branch { link: false, offset: 16 });
        // BL +4.
        assert_eq!(decode(0x9400_0001), Inst::Branch { link: true, offset: 4 });
        // B -4.
        assert_eq!(decode(0x17ff_ffff), Inst::Branch { link: false, offset: -4 });
        // B.EQ +8.
        assert_eq!(decode(0x5400_0040), Inst::BranchCond { cond: Cond::Eq, offset: 8 });
        // CBZ X0, +8.
        assert_eq!(
            decode(0xb400_0040),
            Inst::CmpBranch { sf: true, nonzero: false, rt: 0, offset: 8 },
        );
        // TBNZ X3, #33, +8: b5=1, b40=1.
        assert_eq!(
            decode(0xb708_0043),
            Inst::TestBranch { nonzero: true, rt: 3, bit: 33, offset: 8 },
        );
        // RET.
        assert_eq!(decode(0xd65f_03c0), Inst::BranchReg { kind: BranchRegKind::Ret, rn: 30 });
        // BR X1.
        assert_eq!(decode(0xd61f_0020), Inst::BranchReg { kind: BranchRegKind::Br, rn: 1 });
        // BLR X2.
        assert_eq!(decode(0xd63f_0040), Inst::BranchReg { kind: BranchRegKind::Blr, rn: 2 });
    }

    #[test]
    fn system() {
        assert_eq!(decode(0xd503_201f), Inst::Nop);
        assert_eq!(decode(0xd400_0001), Inst::Svc { imm: 0 });
        assert_eq!(decode(0xd420_07e0), Inst::Brk { imm: 0x3f });
        assert_eq!(decode(0xd503_3bbf), Inst::Barrier { kind: BarrierKind::Dmb });
        assert_eq!(decode(0xd503_3f9f), Inst::Barrier { kind: BarrierKind::Dsb });
        assert_eq!(decode(0xd503_3fdf), Inst::Barrier { kind: BarrierKind::Isb });
        // MRS X0, NZCV.
        assert_eq!(
            decode(0xd53b_4200),
            Inst::SysRegMove { read: true, rt: 0, reg: SysReg::Nzcv },
        );
        // MSR FPCR, X2.
        assert_eq!(
            decode(0xd51b_4402),
            Inst::SysRegMove { read: false, rt: 2, reg: SysReg::Fpcr },
        );
        // MRS X1, TPIDR_EL0.
        assert_eq!(
            decode(0xd53b_d041),
            Inst::SysRegMove { read: true, rt: 1, reg: SysReg::TpidrEl0 },
        );
    }

    #[test]
    fn loads_and_stores() {
        // LDR X0, [X1, #8].
        assert_eq!(
            decode(0xf940_0420),
            Inst::Mem {
                load: true,
                size: 8,
                signed: false,
                sf: false,
                vector: false,
                rt: 0,
                rn: 1,
                addr: AddrMode::Offset(8),
            },
        );
        // STR W2, [X3].
        assert_eq!(
            decode(0xb900_0062),
            Inst::Mem {
                load: false,
                size: 4,
                signed: false,
                sf: false,
                vector: false,
                rt: 2,
                rn: 3,
                addr: AddrMode::Offset(0),
            },
        );
        // LDRB W0, [X1], #1 (post-index).
        assert_eq!(
            decode(0x3840_1420),
            Inst::Mem {
                load: true,
                size: 1,
                signed: false,
                sf: false,
                vector: false,
                rt: 0,
                rn: 1,
                addr: AddrMode::PostIndex(1),
            },
        );
        // LDRSW X0, [X1, #-4]! (pre-index).
        assert_eq!(
            decode(0xb89f_cc20),
            Inst::Mem {
                load: true,
                size: 4,
                signed: true,
                sf: true,
                vector: false,
                rt: 0,
                rn: 1,
                addr: AddrMode::PreIndex(-4),
            },
        );
        // LDR X0, [X1, X2] (register offset, LSL #0).
        assert_eq!(
            decode(0xf862_6820),
            Inst::Mem {
                load: true,
                size: 8,
                signed: false,
                sf: false,
                vector: false,
                rt: 0,
                rn: 1,
                addr: AddrMode::RegOffset { rm: 2, extend: Extend::Uxtx, shift: 0 },
            },
        );
        // STP X29, X30, [SP, #-16]!.
        assert_eq!(
            decode(0xa9bf_7bfd),
            Inst::MemPair {
                load: false,
                size: 8,
                signed: false,
                vector: false,
                rt: 29,
                rt2: 30,
                rn: 31,
                mode: PairMode::PreIndex,
                imm: -16,
            },
        );
        // LDR Q0, [X1] (vector, 128-bit).
        assert_eq!(
            decode(0x3dc0_0020),
            Inst::Mem {
                load: true,
                size: 16,
                signed: false,
                sf: false,
                vector: true,
                rt: 0,
                rn: 1,
                addr: AddrMode::Offset(0),
            },
        );
        // LDR X5, +8 (literal).
        assert_eq!(
            decode(0x5800_0045),
            Inst::LoadLiteral { rt: 5, offset: 8, size: 8, signed: false, vector: false },
        );
    }

    #[test]
    fn exclusives_and_atomics() {
        // LDXR X0, [X1].
        assert_eq!(decode(0xc85f_7c20), Inst::LoadEx { size: 8, acquire: false, rt: 0, rn: 1 });
        // LDAXR X0, [X1].
        assert_eq!(decode(0xc85f_fc20), Inst::LoadEx { size: 8, acquire: true, rt: 0, rn: 1 });
        // STXR W2, X0, [X1].
        assert_eq!(
            decode(0xc802_7c20),
            Inst::StoreEx { size: 8, release: false, rs: 2, rt: 0, rn: 1 },
        );
        // STLXR W2, X0, [X1].
        assert_eq!(
            decode(0xc802_fc20),
            Inst::StoreEx { size: 8, release: true, rs: 2, rt: 0, rn: 1 },
        );
        // LDAR X0, [X1].
        assert_eq!(decode(0xc8df_fc20), Inst::LoadAcquire { size: 8, rt: 0, rn: 1 });
        // STLR X0, [X1].
        assert_eq!(decode(0xc89f_fc20), Inst::StoreRelease { size: 8, rt: 0, rn: 1 });
        // LDADDAL X0, X2, [X1].
        assert_eq!(
            decode(0xf8e0_0022),
            Inst::AtomicRmw {
                op: RmwOp::Add,
                size: 8,
                acquire: true,
                release: true,
                rs: 0,
                rt: 2,
                rn: 1,
            },
        );
        // SWPAL X0, X2, [X1].
        assert_eq!(
            decode(0xf8e0_8022),
            Inst::AtomicRmw {
                op: RmwOp::Swp,
                size: 8,
                acquire: true,
                release: true,
                rs: 0,
                rt: 2,
                rn: 1,
            },
        );
        // CASAL X2, X3, [X0].
        assert_eq!(
            decode(0xc8e2_fc03),
            Inst::Cas { size: 8, acquire: true, release: true, rs: 2, rt: 3, rn: 0 },
        );
    }

    #[test]
    fn data_processing_register() {
        // UDIV X0, X1, X2.
        assert_eq!(decode(0x9ac2_0820), Inst::Div { sf: true, signed: false, rd: 0, rn: 1, rm: 2 });
        // SDIV X0, X1, X2.
        assert_eq!(decode(0x9ac2_0c20), Inst::Div { sf: true, signed: true, rd: 0, rn: 1, rm: 2 });
        // MUL X0, X1, X2 (MADD with XZR).
        assert_eq!(
            decode(0x9b02_7c20),
            Inst::Mul { op: MulOp::Madd, sf: true, rd: 0, rn: 1, rm: 2, ra: 31 },
        );
        // CLZ X0, X1.
        assert_eq!(decode(0xdac0_1020), Inst::Unary { op: UnaryOp::Clz, sf: true, rd: 0, rn: 1 });
        // RBIT X0, X1.
        assert_eq!(decode(0xdac0_0020), Inst::Unary { op: UnaryOp::Rbit, sf: true, rd: 0, rn: 1 });
        // LSLV X0, X1, X2.
        assert_eq!(
            decode(0x9ac2_2020),
            Inst::VarShift { op: ShiftKind::Lsl, sf: true, rd: 0, rn: 1, rm: 2 },
        );
        // CSEL X0, X1, X2, EQ.
        assert_eq!(
            decode(0x9a82_0020),
            Inst::CondSelect { kind: CselKind::Csel, sf: true, rd: 0, rn: 1, rm: 2, cond: Cond::Eq },
        );
        // CSINC X0, X1, X2, NE.
        assert_eq!(
            decode(0x9a82_1420),
            Inst::CondSelect { kind: CselKind::Csinc, sf: true, rd: 0, rn: 1, rm: 2, cond: Cond::Ne },
        );
        // CCMP X1, X2, #0, EQ.
        assert_eq!(
            decode(0xfa42_0020),
            Inst::CondCompare {
                sf: true,
                sub: true,
                rn: 1,
                imm: false,
                rm_or_imm: 2,
                cond: Cond::Eq,
                nzcv: 0,
            },
        );
        // UBFM (LSR X0, X1, #4): immr=4, imms=63.
        assert_eq!(
            decode(0xd344_fc20),
            Inst::Bitfield { kind: BitfieldKind::Ubfm, sf: true, rd: 0, rn: 1, immr: 4, imms: 63 },
        );
        // EXTR X0, X1, X1, #8 (ROR #8).
        assert_eq!(
            decode(0x93c1_2020),
            Inst::Extract { sf: true, rd: 0, rn: 1, rm: 1, lsb: 8 },
        );
    }

    #[test]
    fn pc_relative() {
        // ADR X0, +0x10.
        assert_eq!(decode(0x1000_0080), Inst::Adr { rd: 0, imm: 0x10, page: false });
        // ADRP X1, +0x1000 (one page up).
        assert_eq!(decode(0xb000_0001), Inst::Adr { rd: 1, imm: 0x1000, page: true });
    }

    #[test]
    fn simd_three_same() {
        // ADD V2.4S, V0.4S, V1.4S.
        assert_eq!(
            decode(0x4ea1_8402),
            Inst::VecRrr { op: VecOp::Add, esize: 4, q: true, rd: 2, rn: 0, rm: 1 },
        );
        // SUB V0.8B, V1.8B, V2.8B.
        assert_eq!(
            decode(0x2e22_8420),
            Inst::VecRrr { op: VecOp::Sub, esize: 1, q: false, rd: 0, rn: 1, rm: 2 },
        );
        // AND V0.16B, V1.16B, V2.16B.
        assert_eq!(
            decode(0x4e22_1c20),
            Inst::VecRrr { op: VecOp::And, esize: 1, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // EOR V0.16B, V1.16B, V2.16B.
        assert_eq!(
            decode(0x6e22_1c20),
            Inst::VecRrr { op: VecOp::Eor, esize: 1, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // CMEQ V0.4S, V1.4S, V2.4S.
        assert_eq!(
            decode(0x6ea2_8c20),
            Inst::VecRrr { op: VecOp::Cmeq, esize: 4, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // CMGT V0.4S, V1.4S, V2.4S.
        assert_eq!(
            decode(0x4ea2_3420),
            Inst::VecRrr { op: VecOp::Cmgt, esize: 4, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // CMHI V0.16B, V1.16B, V2.16B.
        assert_eq!(
            decode(0x6e22_3420),
            Inst::VecRrr { op: VecOp::Cmhi, esize: 1, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // FADD V0.4S, V1.4S, V2.4S.
        assert_eq!(
            decode(0x4e22_d420),
            Inst::VecFloatRrr { op: VecFloatOp::Fadd, double: false, q: true, rd: 0, rn: 1, rm: 2 },
        );
        // FMUL V0.2D, V1.2D, V2.2D.
        assert_eq!(
            decode(0x6e62_dc20),
            Inst::VecFloatRrr { op: VecFloatOp::Fmul, double: true, q: true, rd: 0, rn: 1, rm: 2 },
        );
    }

    #[test]
    fn simd_moves() {
        // MOVI V0.16B, #0.
        assert_eq!(decode(0x4f00_e400), Inst::VecMovImm { q: true, rd: 0, imm: 0 });
        // MOVI V1.4S, #1.
        assert_eq!(
            decode(0x4f00_0421),
            Inst::VecMovImm { q: true, rd: 1, imm: 0x0000_0001_0000_0001 },
        );
        // DUP V0.4S, W1.
        assert_eq!(decode(0x4e04_0c20), Inst::VecDup { esize: 4, q: true, rd: 0, rn: 1 });
        // UMOV W0, V1.S[1].
        assert_eq!(
            decode(0x0e0c_3c20),
            Inst::VecMovToGeneral { esize: 4, signed: false, sf: false, rd: 0, rn: 1, index: 1 },
        );
        // FMOV D0, X1.
        assert_eq!(
            decode(0x9e67_0020),
            Inst::FmovGeneral { to_vec: true, double: true, rd: 0, rn: 1 },
        );
        // FMOV X0, D1.
        assert_eq!(
            decode(0x9e66_0020),
            Inst::FmovGeneral { to_vec: false, double: true, rd: 0, rn: 1 },
        );
    }

    #[test]
    fn simd_multi_struct() {
        // LD1 {V0.4S}, [X1].
        assert_eq!(
            decode(0x4c40_7820),
            Inst::VecMulti {
                load: true,
                regs: 1,
                interleave: 1,
                esize: 4,
                q: true,
                rt: 0,
                rn: 1,
                post: None,
            },
        );
        // ST1 {V0.16B, V1.16B}, [X2], #32.
        assert_eq!(
            decode(0x4c9f_a040),
            Inst::VecMulti {
                load: false,
                regs: 2,
                interleave: 1,
                esize: 1,
                q: true,
                rt: 0,
                rn: 2,
                post: Some(31),
            },
        );
        // LD2 {V0.4S, V1.4S}, [X1].
        assert_eq!(
            decode(0x4c40_8820),
            Inst::VecMulti {
                load: true,
                regs: 2,
                interleave: 2,
                esize: 4,
                q: true,
                rt: 0,
                rn: 1,
                post: None,
            },
        );
    }

    #[test]
    fn unknown_words() {
        assert_eq!(decode(0x0000_0000), Inst::Unknown { word: 0 });
        assert_eq!(decode(0xffff_ffff), Inst::Unknown { word: 0xffff_ffff });
    }
}
