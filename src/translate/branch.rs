//! Control-transfer and system translators: branches, compare-and-branch, test-and-branch,
//! supervisor calls, barriers, and system-register moves. All of these except `B.NV`, the
//! barriers and the register moves terminate the basic block.

use super::Translator;
use crate::decode::{BarrierKind, BranchRegKind, Cond, SysReg};
use crate::error::Error;
use crate::guest::{BlockExit, GuestContext};
use crate::x86::{AluOp, Cc, Reg, ShiftOp};

/// CNTFRQ_EL0 as reported to the guest; the virtual counter itself is backed by the host TSC.
const CNT_FREQ_HZ: u32 = 62_500_000;

/// DCZID_EL0: DC ZVA permitted, 64-byte zero block.
const DCZID: u32 = 0x4;

/// CTR_EL0: 64-byte instruction and data cache lines, VIPT.
const CTR: u32 = 0x8444_c004;

impl Translator<'_, '_> {
    pub(super) fn emit_branch(&mut self, link: bool, offset: i64) {
        let target = self.pc.wrapping_add(offset as u64);

        if link {
            self.e.mov_ri64(Reg::Rax, self.pc.wrapping_add(4));
            self.store_gp(30, Reg::Rax, false);
        }

        self.emit_exit(target, Some(0));
    }

    pub(super) fn emit_branch_reg(&mut self, kind: BranchRegKind, rn: u8) {
        // Read the target before a BLR clobbers the link register.
        self.load_gp(Reg::Rax, rn, false);

        if kind == BranchRegKind::Blr {
            self.e.mov_ri64(Reg::Rcx, self.pc.wrapping_add(4));
            self.store_gp(30, Reg::Rcx, false);
        }

        self.e.mov_store(true, Reg::R15, GuestContext::PC_OFFSET, Reg::Rax);
        self.emit_exit_dynamic();
    }

    /// Returns true when the block ends. `B.NV` is reserved; per the translation table it
    /// becomes a nop and the block continues.
    pub(super) fn emit_cond_branch(&mut self, cond: Cond, offset: i64) -> bool {
        if cond == Cond::Nv {
            self.e.nop();
            return false;
        }

        let target = self.pc.wrapping_add(offset as u64);

        if cond == Cond::Al {
            self.emit_exit(target, Some(0));
            return true;
        }

        let taken = self.emit_branch_cond(cond);

        self.emit_exit(self.pc.wrapping_add(4), Some(1));

        let here = self.e.offset();
        self.e.patch_rel32(taken, here);
        self.emit_exit(target, Some(0));

        true
    }

    pub(super) fn emit_cmp_branch(&mut self, sf: bool, nonzero: bool, rt: u8, offset: i64) {
        self.load_gp(Reg::Rax, rt, false);
        self.e.test_rr(sf, Reg::Rax, Reg::Rax);

        let taken = self.e.jcc(if nonzero { Cc::Ne } else { Cc::E });

        self.emit_exit(self.pc.wrapping_add(4), Some(1));

        let here = self.e.offset();
        self.e.patch_rel32(taken, here);
        self.emit_exit(self.pc.wrapping_add(offset as u64), Some(0));
    }

    pub(super) fn emit_test_branch(&mut self, nonzero: bool, rt: u8, bit: u8, offset: i64) {
        self.load_gp(Reg::Rax, rt, false);
        self.e.bt_ri(true, Reg::Rax, bit);

        let taken = self.e.jcc(if nonzero { Cc::B } else { Cc::Ae });

        self.emit_exit(self.pc.wrapping_add(4), Some(1));

        let here = self.e.offset();
        self.e.patch_rel32(taken, here);
        self.emit_exit(self.pc.wrapping_add(offset as u64), Some(0));
    }

    /// `SVC` calls through the dispatcher's bridge entry, then ends the block so an exit
    /// request raised by the handler is honored before any further guest instruction runs.
    pub(super) fn emit_svc(&mut self, imm: u16) {
        log::trace!("svc #{imm} at {:#x}", self.pc);

        let next = self.pc.wrapping_add(4);

        self.e.mov_ri64(Reg::Rax, next);
        self.e.mov_store(true, Reg::R15, GuestContext::PC_OFFSET, Reg::Rax);

        self.e.mov_rr(true, Reg::Rdi, Reg::R15);
        self.e.mov_ri64(Reg::Rax, crate::dispatch::syscall_entry as usize as u64);
        self.e.call_r(Reg::Rax);

        self.flags_live = false;
        self.emit_exit(next, Some(0));
    }

    pub(super) fn emit_barrier(&mut self, kind: BarrierKind) {
        match kind {
            BarrierKind::Dmb | BarrierKind::Dsb => self.e.mfence(),
            BarrierKind::Isb => {
                self.e.lfence();
                // CPUID is the serializing instruction; it clobbers RBX, which the block ABI
                // must preserve.
                self.e.push_r(Reg::Rbx);
                self.e.cpuid();
                self.e.pop_r(Reg::Rbx);
            }
        }
    }

    /// MRS/MSR for the user-visible system registers. Anything else follows the
    /// unknown-instruction policy.
    pub(super) fn emit_sysreg_move(
        &mut self,
        read: bool,
        rt: u8,
        reg: SysReg,
        word: u32,
    ) -> Result<bool, Error> {
        match (reg, read) {
            (SysReg::Nzcv, true) => {
                self.e.mov_load(false, Reg::Rax, Reg::R15, GuestContext::NZCV_OFFSET);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::Nzcv, false) => {
                self.load_gp(Reg::Rax, rt, false);
                self.e.alu_ri(AluOp::And, false, Reg::Rax, 0xf000_0000u32 as i32);
                self.e.mov_store(false, Reg::R15, GuestContext::NZCV_OFFSET, Reg::Rax);
                self.flags_live = false;
            }
            (SysReg::Fpcr, true) => {
                self.e.mov_load(false, Reg::Rax, Reg::R15, GuestContext::FPCR_OFFSET);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::Fpcr, false) => {
                self.load_gp(Reg::Rax, rt, false);
                self.e.mov_store(false, Reg::R15, GuestContext::FPCR_OFFSET, Reg::Rax);
            }
            (SysReg::Fpsr, true) => {
                self.e.mov_load(false, Reg::Rax, Reg::R15, GuestContext::FPSR_OFFSET);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::Fpsr, false) => {
                self.load_gp(Reg::Rax, rt, false);
                self.e.mov_store(false, Reg::R15, GuestContext::FPSR_OFFSET, Reg::Rax);
            }
            (SysReg::TpidrEl0, true) => {
                self.e.mov_load(true, Reg::Rax, Reg::R15, GuestContext::TPIDR_OFFSET);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::TpidrEl0, false) => {
                self.load_gp(Reg::Rax, rt, false);
                self.e.mov_store(true, Reg::R15, GuestContext::TPIDR_OFFSET, Reg::Rax);
            }
            (SysReg::CntvctEl0, true) => {
                self.e.rdtsc();
                self.e.shift_ri(ShiftOp::Shl, true, Reg::Rdx, 32);
                self.e.alu_rr(AluOp::Or, true, Reg::Rax, Reg::Rdx);
                self.store_gp(rt, Reg::Rax, false);
                self.flags_live = false;
            }
            (SysReg::CntfrqEl0, true) => {
                self.e.mov_ri32(Reg::Rax, CNT_FREQ_HZ);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::DczidEl0, true) => {
                self.e.mov_ri32(Reg::Rax, DCZID);
                self.store_gp(rt, Reg::Rax, false);
            }
            (SysReg::CtrEl0, true) => {
                self.e.mov_ri32(Reg::Rax, CTR);
                self.store_gp(rt, Reg::Rax, false);
            }
            _ => {
                return match self.config.unknown_policy {
                    super::UnknownPolicy::Trap => {
                        self.emit_fault_exit(BlockExit::Unknown, u64::from(word));
                        Ok(true)
                    }
                    super::UnknownPolicy::Abort => {
                        Err(Error::DecodeUnknown { word, pc: self.pc })
                    }
                };
            }
        }

        Ok(false)
    }
}
