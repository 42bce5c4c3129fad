//! Brute-force greedy local register allocation.
//!
//! Allocation is performed block by block; every allocatable register is
//! logically free on block entry. A temp keeps its register while bound; a
//! new operand takes the first register that is free or holds a dead value;
//! under full pressure a uniformly random victim is spilled. The random
//! choice avoids consecutively spilling the first register and is driven by
//! an injected seedable source so allocation is reproducible in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataflow::{BasicBlock, Cfg, Loc, TempSet};
use crate::error::{Error, Result};
use crate::frame::CallingConv;
use crate::instr::{NativeInstr, Op, Operand, Reg, SubroutineInfo, Temp};
use crate::regalloc::{Bindings, RegAlloc, RegFile, SubroutineEmitter};

pub struct BruteRegAlloc<R: Rng = StdRng> {
    regs: RegFile,
    caller_saved: Vec<Reg>,
    bindings: Bindings,
    rng: R,
}

impl BruteRegAlloc<StdRng> {
    pub fn new(allocatable: Vec<Reg>, caller_saved: Vec<Reg>) -> Self {
        Self::with_rng(allocatable, caller_saved, StdRng::from_entropy())
    }

    pub fn with_seed(allocatable: Vec<Reg>, caller_saved: Vec<Reg>, seed: u64) -> Self {
        Self::with_rng(allocatable, caller_saved, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BruteRegAlloc<R> {
    pub fn with_rng(allocatable: Vec<Reg>, caller_saved: Vec<Reg>, rng: R) -> Self {
        BruteRegAlloc {
            regs: RegFile::new(allocatable),
            caller_saved,
            bindings: Bindings::new(),
            rng,
        }
    }

    /// Registers ever assigned during the last allocated function.
    pub fn used_regs(&self) -> Vec<Reg> {
        self.regs.used_regs()
    }

    fn local_alloc<C: CallingConv>(
        &mut self,
        bb: &BasicBlock,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<()> {
        self.bindings.clear();
        self.regs.reset();

        let mut caller_need_save: Vec<(Reg, Temp)> = Vec::new();

        for loc in bb.seq_locs() {
            match loc.instr.op {
                Op::CallerSave => {
                    // The marker immediately precedes the call, so the
                    // argument area of this call site is complete.
                    emitter.conv().finish_param();
                    for &reg in &self.caller_saved {
                        if let Some(temp) = self.regs.occupant_of(reg) {
                            if loc.live_out.contains(&temp) {
                                caller_need_save.push((reg, temp));
                                emitter.emit_store_to_stack(reg, temp);
                            }
                        }
                    }
                }
                Op::CallerRestore => {
                    for (reg, temp) in caller_need_save.drain(..) {
                        emitter.emit_load_from_stack(reg, temp)?;
                    }
                }
                Op::Param => self.alloc_for_param(loc, emitter)?,
                Op::Binary | Op::Unary | Op::Memory | Op::Call => {
                    self.alloc_for_loc(loc, emitter)?;
                }
                Op::Jump | Op::CondJump | Op::Ret | Op::Label => {
                    return Err(Error::UnsupportedInstr(loc.instr.op));
                }
            }
        }

        // Registers do not persist across blocks: every live-out temp still
        // register-resident must be materialized on the stack.
        for &temp in &bb.live_out {
            if let Some(&reg) = self.bindings.get(&temp) {
                emitter.emit_store_to_stack(reg, temp);
            }
        }

        if let Some(loc) = bb.terminator() {
            self.alloc_for_loc(loc, emitter)?;
        }

        Ok(())
    }

    fn alloc_for_param<C: CallingConv>(
        &mut self,
        loc: &Loc,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<()> {
        let operand = loc
            .instr
            .srcs
            .first()
            .copied()
            .ok_or(Error::UnsupportedInstr(Op::Param))?;
        let temp = match operand {
            Operand::Temp(temp) => temp,
            // Outgoing arguments are always virtual in this IR.
            Operand::Reg(_) => return Err(Error::UnsupportedInstr(Op::Param)),
        };

        let reg = self.alloc_reg_for(temp, true, &loc.live_in, emitter)?;
        let offset = emitter.conv().add_param(temp);
        emitter.emit_param(reg, offset);
        Ok(())
    }

    /// Allocate registers for every read and then written operand of one
    /// instruction, in program order, and emit its native form. Pinned
    /// operands pass through untouched.
    fn alloc_for_loc<C: CallingConv>(
        &mut self,
        loc: &Loc,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<()> {
        let instr = &loc.instr;

        let mut src_regs = Vec::with_capacity(instr.srcs.len());
        for &operand in &instr.srcs {
            src_regs.push(self.operand_reg(operand, true, &loc.live_in, emitter)?);
        }

        let mut dst_regs = Vec::with_capacity(instr.dsts.len());
        for &operand in &instr.dsts {
            dst_regs.push(self.operand_reg(operand, false, &loc.live_in, emitter)?);
        }

        emitter.emit_native(instr.to_native(dst_regs, src_regs));
        Ok(())
    }

    fn operand_reg<C: CallingConv>(
        &mut self,
        operand: Operand,
        is_read: bool,
        live: &TempSet,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<Reg> {
        match operand {
            Operand::Reg(reg) => Ok(reg),
            Operand::Temp(temp) => self.alloc_reg_for(temp, is_read, live, emitter),
        }
    }

    fn alloc_reg_for<C: CallingConv>(
        &mut self,
        temp: Temp,
        is_read: bool,
        live: &TempSet,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<Reg> {
        // Best case: the value of `temp` is already in a register.
        if let Some(&reg) = self.bindings.get(&temp) {
            return Ok(reg);
        }

        // First attempt: a register that is unoccupied, or whose occupant is
        // no longer alive at this program point.
        for idx in 0..self.regs.len() {
            let occupant = self.regs.occupant(idx);
            if occupant.map_or(true, |held| !live.contains(&held)) {
                let reg = self.regs.reg(idx);
                if is_read {
                    // The register's physical contents are stale; fetch the
                    // latest value of `temp` from its stack slot.
                    emitter.emit_load_from_stack(reg, temp)?;
                }
                if let Some(held) = occupant {
                    self.unbind(held);
                }
                self.bind(temp, reg);
                return Ok(reg);
            }
        }

        // Last attempt: everything holds a live value, spill a random victim.
        let idx = self.rng.gen_range(0..self.regs.len());
        let reg = self.regs.reg(idx);
        if let Some(victim) = self.regs.occupant(idx) {
            emitter.emit_store_to_stack(reg, victim);
            self.unbind(victim);
        }
        self.bind(temp, reg);
        if is_read {
            emitter.emit_load_from_stack(reg, temp)?;
        }
        Ok(reg)
    }

    fn bind(&mut self, temp: Temp, reg: Reg) {
        self.bindings.insert(temp, reg);
        self.regs.bind(reg, temp);
    }

    fn unbind(&mut self, temp: Temp) {
        if let Some(reg) = self.bindings.remove(&temp) {
            self.regs.unbind(reg);
        }
    }
}

impl<R: Rng> RegAlloc for BruteRegAlloc<R> {
    fn alloc<C: CallingConv>(
        &mut self,
        cfg: &Cfg,
        conv: &mut C,
        info: SubroutineInfo,
    ) -> Result<(Vec<NativeInstr>, SubroutineInfo)> {
        self.regs.clear_used();
        let mut emitter = SubroutineEmitter::new(conv, info);

        for bb in cfg.iter() {
            if let Some(label) = &bb.label {
                emitter.emit_label(label.clone());
            }
            self.local_alloc(bb, &mut emitter)?;
        }

        Ok(emitter.finish())
    }
}
